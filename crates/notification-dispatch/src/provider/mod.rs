//! 通知提供方抽象
//!
//! `NotificationProvider` 是所有渠道共享的能力集合；`EmailProvider` / `SmsProvider` /
//! `PushProvider` 在其上扩展渠道专属操作。模板目录、设备注册表、投递报告属于可选能力，
//! 通过返回 `Option<&dyn ...>` 的访问方法暴露，未实现的提供方使用默认的 `None`。

pub mod delivery;
pub mod email;
pub mod push;
pub mod sms;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify_shared::error::Result;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{
    DeliveryStatus, EmailNotification, Notification, NotificationResponse, NotificationType,
    Platform, PushNotification, SmsNotification,
};
use crate::pricing::CountryInfo;
use crate::template::{EmailTemplate, PushTemplate, SmsTemplate, Template, TemplateCatalog};

pub use delivery::{DeliveryOracle, FixedDelivery, RandomDelivery};
pub use email::{MockEmailProvider, SentEmail};
pub use push::{DeviceInfo, MockPushProvider, SentPush};
pub use sms::{MockSmsProvider, SentSms};

// ---------------------------------------------------------------------------
// 提供方配置摘要
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

/// 提供方对外公布的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub enabled: bool,
    pub priority: u32,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub rate_limit: RateLimitConfig,
    pub settings: HashMap<String, String>,
}

/// 推送平台配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub platform: String,
    pub max_payload_size: usize,
    pub max_title_length: usize,
    pub max_body_length: usize,
    pub supports_badge: bool,
    pub supports_sound: bool,
    pub supports_image: bool,
    pub supports_actions: bool,
    pub default_sound: Option<String>,
    pub settings: HashMap<String, String>,
}

impl PlatformConfig {
    /// 未知平台的兜底配置：只给出 4096 字节的负载上限
    pub fn fallback(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            max_payload_size: 4096,
            ..Default::default()
        }
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// 可选能力
// ---------------------------------------------------------------------------

/// 模板目录能力
pub trait TemplateSource<T: Template>: Send + Sync {
    fn get_template(&self, id: &str) -> Result<T>;
    fn list_templates(&self) -> Vec<T>;
    fn add_template(&self, template: T) -> T;
    fn render_template(&self, id: &str, data: &HashMap<String, String>) -> Result<T>;
}

impl<T: Template> TemplateSource<T> for TemplateCatalog<T> {
    fn get_template(&self, id: &str) -> Result<T> {
        self.get(id)
    }

    fn list_templates(&self) -> Vec<T> {
        self.list()
    }

    fn add_template(&self, template: T) -> T {
        self.add(template)
    }

    fn render_template(&self, id: &str, data: &HashMap<String, String>) -> Result<T> {
        self.render(id, data)
    }
}

/// 设备注册时附带的客户端信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub app_version: Option<String>,
    pub os_version: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl DeviceRegistration {
    /// 从元数据中提取 app_version / os_version
    pub fn from_metadata(metadata: HashMap<String, String>) -> Self {
        Self {
            app_version: metadata.get("app_version").cloned(),
            os_version: metadata.get("os_version").cloned(),
            metadata,
        }
    }
}

/// 推送设备注册表能力
pub trait DeviceRegistry: Send + Sync {
    fn register_device(
        &self,
        token: &str,
        platform: Platform,
        registration: DeviceRegistration,
    ) -> Result<()>;

    fn unregister_device(&self, token: &str) -> Result<()>;

    fn device_info(&self, token: &str) -> Result<push::DeviceInfo>;
}

/// 投递报告能力
pub trait DeliveryReports: Send + Sync {
    fn delivery_report(&self, notification_id: Uuid) -> Result<DeliveryStatus>;
}

// ---------------------------------------------------------------------------
// 提供方 trait
// ---------------------------------------------------------------------------

/// 所有提供方共享的能力
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// 发送通用通知头部，提供方负责转换为渠道载荷
    async fn send(
        &self,
        cancel: &CancellationToken,
        notification: &Notification,
    ) -> Result<NotificationResponse>;

    fn notification_type(&self) -> NotificationType;

    async fn is_healthy(&self, cancel: &CancellationToken) -> Result<()>;

    fn config(&self) -> ProviderConfig;
}

#[async_trait]
pub trait EmailProvider: NotificationProvider {
    async fn send_email(
        &self,
        cancel: &CancellationToken,
        email: &EmailNotification,
    ) -> Result<NotificationResponse>;

    fn validate_email_address(&self, email: &str) -> Result<()>;

    fn templates(&self) -> Option<&dyn TemplateSource<EmailTemplate>> {
        None
    }
}

#[async_trait]
pub trait SmsProvider: NotificationProvider {
    async fn send_sms(
        &self,
        cancel: &CancellationToken,
        sms: &SmsNotification,
    ) -> Result<NotificationResponse>;

    fn validate_phone_number(&self, phone_number: &str, country_code: Option<&str>) -> Result<()>;

    /// 单段价格；未指定国家时返回默认价格，不支持的国家返回 NotFound
    fn sms_cost(&self, country_code: Option<&str>) -> Result<f64>;

    /// 对外公布的支持国家及价格
    fn supported_countries(&self) -> Vec<CountryInfo> {
        Vec::new()
    }

    fn templates(&self) -> Option<&dyn TemplateSource<SmsTemplate>> {
        None
    }
}

#[async_trait]
pub trait PushProvider: NotificationProvider {
    async fn send_push(
        &self,
        cancel: &CancellationToken,
        push: &PushNotification,
    ) -> Result<NotificationResponse>;

    fn validate_device_token(&self, token: &str, platform: Platform) -> Result<()>;

    fn platform_config(&self, platform: Platform) -> PlatformConfig;

    fn supported_platforms(&self) -> Vec<Platform> {
        Platform::ALL.to_vec()
    }

    fn templates(&self) -> Option<&dyn TemplateSource<PushTemplate>> {
        None
    }

    fn device_registry(&self) -> Option<&dyn DeviceRegistry> {
        None
    }

    fn delivery_reports(&self) -> Option<&dyn DeliveryReports> {
        None
    }
}

/// 发送审计记录的投递状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentStatus {
    Sent,
    Delivered,
}

impl SentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
        }
    }
}

/// 模拟投递结果：投递成功时返回状态与投递时间
pub(crate) fn simulate_delivery(
    oracle: &dyn DeliveryOracle,
    success_percent: u32,
    delay_range_ms: (u64, u64),
    provider_data: &mut HashMap<String, String>,
) -> (SentStatus, Option<DateTime<Utc>>, Option<std::time::Duration>) {
    match oracle.delivery_delay(success_percent, delay_range_ms) {
        Some(delay) => {
            let delivered_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            provider_data.insert("delivery_time".to_string(), delivered_at.to_rfc3339());
            (SentStatus::Delivered, Some(delivered_at), Some(delay))
        }
        None => (SentStatus::Sent, None, None),
    }
}
