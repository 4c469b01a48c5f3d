//! 结构化日志能力
//!
//! 服务层只依赖 `Logger` trait：四个级别的日志方法，加上通过 `with_field` /
//! `with_fields` 派生出携带固定字段的新 logger。默认实现 `TracingLogger`
//! 把消息和绑定字段转发给 tracing。格式化消息由调用方 `format!` 后传入。

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

/// 结构化日志接口
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    /// 派生一个附带单个字段的 logger
    fn with_field(&self, key: &str, value: String) -> Arc<dyn Logger>;

    /// 派生一个附带多个字段的 logger
    fn with_fields(&self, fields: Vec<(&str, String)>) -> Arc<dyn Logger>;
}

/// 基于 tracing 的 logger 实现
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    component: &'static str,
    fields: Vec<(String, String)>,
}

impl TracingLogger {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            fields: Vec::new(),
        }
    }

    /// 便于注入到服务中的共享实例
    pub fn shared(component: &'static str) -> Arc<dyn Logger> {
        Arc::new(Self::new(component))
    }

    fn rendered_fields(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{k}={v}");
        }
        out
    }
}

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        debug!(component = self.component, fields = %self.rendered_fields(), "{}", message);
    }

    fn info(&self, message: &str) {
        info!(component = self.component, fields = %self.rendered_fields(), "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(component = self.component, fields = %self.rendered_fields(), "{}", message);
    }

    fn error(&self, message: &str) {
        error!(component = self.component, fields = %self.rendered_fields(), "{}", message);
    }

    fn with_field(&self, key: &str, value: String) -> Arc<dyn Logger> {
        self.with_fields(vec![(key, value)])
    }

    fn with_fields(&self, fields: Vec<(&str, String)>) -> Arc<dyn Logger> {
        let mut derived = self.clone();
        derived
            .fields
            .extend(fields.into_iter().map(|(k, v)| (k.to_string(), v)));
        Arc::new(derived)
    }
}
