//! 共享库
//!
//! 包含通知分发各组件共用的配置、错误处理、结构化日志、重试退避与可观测性基础设施。

pub mod config;
pub mod error;
pub mod logger;
pub mod observability;
pub mod retry;
