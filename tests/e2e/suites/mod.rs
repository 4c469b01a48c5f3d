//! 测试套件模块

pub mod bulk;
pub mod dispatcher;
pub mod resilience;
pub mod sms_flow;
