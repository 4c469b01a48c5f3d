//! 统一错误处理模块
//!
//! 所有渠道、服务与提供方共享同一个结构化错误 `NotificationError`：
//! 错误码 + 消息 + 可选详情 + 元数据 + 可选底层原因。
//! 错误码决定 HTTP 状态提示与是否可重试。

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// 错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // ==================== 通用 ====================
    Internal,
    InvalidRequest,
    NotFound,
    Unauthorized,
    RateLimited,
    Timeout,

    // ==================== 提供方 ====================
    ProviderNotFound,
    ProviderUnavailable,
    ProviderConfig,
    ProviderAuth,

    // ==================== 通知 ====================
    InvalidRecipient,
    InvalidNotification,
    NotificationFailed,
    DeliveryFailed,
    TemplateNotFound,

    // ==================== 校验 ====================
    ValidationFailed,
    InvalidEmail,
    InvalidPhone,
    InvalidToken,
}

impl ErrorCode {
    /// 对外暴露的错误码字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "INTERNAL_ERROR",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::ProviderNotFound => "PROVIDER_NOT_FOUND",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::ProviderConfig => "PROVIDER_CONFIG_ERROR",
            Self::ProviderAuth => "PROVIDER_AUTH_ERROR",
            Self::InvalidRecipient => "INVALID_RECIPIENT",
            Self::InvalidNotification => "INVALID_NOTIFICATION",
            Self::NotificationFailed => "NOTIFICATION_FAILED",
            Self::DeliveryFailed => "DELIVERY_FAILED",
            Self::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::InvalidPhone => "INVALID_PHONE",
            Self::InvalidToken => "INVALID_TOKEN",
        }
    }

    /// 对应的 HTTP 状态码提示
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationFailed
            | Self::InvalidRequest
            | Self::InvalidEmail
            | Self::InvalidPhone
            | Self::InvalidToken
            | Self::InvalidRecipient
            | Self::InvalidNotification => 400,
            Self::Unauthorized | Self::ProviderAuth => 401,
            Self::NotFound | Self::ProviderNotFound | Self::TemplateNotFound => 404,
            Self::Timeout => 408,
            Self::RateLimited => 429,
            Self::ProviderUnavailable | Self::NotificationFailed | Self::DeliveryFailed => 503,
            Self::Internal | Self::ProviderConfig => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 系统错误类型
#[derive(Debug, Error)]
#[error("{}", render(.code, .message, .details))]
pub struct NotificationError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
    pub metadata: HashMap<String, String>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

fn render(code: &ErrorCode, message: &str, details: &Option<String>) -> String {
    match details {
        Some(details) => format!("{code}: {message} - {details}"),
        None => format!("{code}: {message}"),
    }
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, NotificationError>;

impl NotificationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            metadata: HashMap::new(),
            cause: None,
        }
    }

    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        let mut err = Self::new(code, message);
        err.details = Some(details.into());
        err
    }

    /// 字段校验失败，字段名记录在 metadata["field"]
    pub fn validation(field: &str, message: impl AsRef<str>) -> Self {
        Self::new(
            ErrorCode::ValidationFailed,
            format!("Validation failed for field '{field}': {}", message.as_ref()),
        )
        .with_metadata("field", field)
    }

    /// 提供方错误，提供方名称记录在 details 与 metadata["provider"]
    pub fn provider(provider: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::with_details(code, message, format!("Provider: {provider}"))
            .with_metadata("provider", provider)
    }

    pub fn internal(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::new(ErrorCode::Internal, message).with_cause(cause)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Duration) -> Self {
        Self::new(ErrorCode::RateLimited, message)
            .with_metadata("retry_after", retry_after.as_secs().to_string())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 获取错误码
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// 校验失败时出错的字段名
    pub fn field(&self) -> Option<&str> {
        self.metadata.get("field").map(String::as_str)
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Timeout
                | ErrorCode::ProviderUnavailable
                | ErrorCode::RateLimited
                | ErrorCode::DeliveryFailed
        )
    }
}
