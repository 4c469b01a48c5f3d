//! 多渠道通知分发
//!
//! 校验邮件、短信、推送请求，渲染可选模板，委托给渠道提供方发送并返回统一的响应。
//! 目前只内置模拟提供方，真实网关通过实现 `provider` 模块中的 trait 接入。

pub mod dispatcher;
pub mod models;
pub mod pricing;
pub mod provider;
pub mod repository;
pub mod service;
pub mod template;
pub mod test_utils;
pub mod validation;

pub use dispatcher::NotificationDispatcher;
pub use notify_shared::error::{ErrorCode, NotificationError, Result};
pub use service::{EmailService, PushService, SmsService};
