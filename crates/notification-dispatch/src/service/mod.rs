//! 渠道服务
//!
//! 每个服务负责一个渠道的完整发送流程：请求校验 → 提供方健康检查 → 构建内部通知 →
//! 渲染模板 → 委托提供方发送。批量发送按顺序展开，单项失败转换为 `Failed` 响应。

pub mod email;
pub mod push;
pub mod sms;

use notify_shared::config::ChannelConfig;
use notify_shared::error::{ErrorCode, NotificationError, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::models::NotificationType;
use crate::provider::NotificationProvider;
use crate::validation;

pub use email::{BulkEmailRecipient, BulkEmailRequest, EmailRequest, EmailService, RenderedEmailTemplate};
pub use push::{BulkPushFailure, BulkPushReport, PushService};
pub use sms::{BulkSmsRecipient, BulkSmsRequest, RenderedSmsTemplate, SmsCostEstimate, SmsRequest, SmsService};

/// 日志中消息内容的最大字符数
const LOG_PREVIEW_CHARS: usize = 50;

/// 提供方状态
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub healthy: bool,
    pub error: Option<String>,
}

impl ProviderStatus {
    /// 执行一次健康检查并汇总结果
    pub async fn probe<P>(provider: &P, cancel: &CancellationToken) -> Self
    where
        P: NotificationProvider + ?Sized,
    {
        let error = provider.is_healthy(cancel).await.err().map(|e| e.to_string());
        Self {
            name: provider.config().name,
            notification_type: provider.notification_type(),
            healthy: error.is_none(),
            error,
        }
    }
}

/// 只有 "mock" 提供方可以由配置解析
pub(crate) fn ensure_mock_provider(config: &ChannelConfig, channel: &str) -> Result<()> {
    if config.provider == "mock" {
        Ok(())
    } else {
        Err(NotificationError::new(
            ErrorCode::ProviderNotFound,
            format!("unsupported {channel} provider: {}", config.provider),
        ))
    }
}

pub(crate) fn templates_unsupported() -> NotificationError {
    NotificationError::new(
        ErrorCode::ProviderNotFound,
        "template rendering not supported by this provider",
    )
}

pub(crate) fn log_preview(message: &str) -> String {
    validation::truncate_string(message, LOG_PREVIEW_CHARS)
}
