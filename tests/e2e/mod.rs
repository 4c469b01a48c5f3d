//! 通知分发端到端测试
//!
//! 以公开 API 组合渠道服务、模拟提供方与分发器，覆盖：
//! - 短信发送全流程与计费
//! - 批量发送的部分失败
//! - 提供方不健康与取消
//! - 通用分发器路由

pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
