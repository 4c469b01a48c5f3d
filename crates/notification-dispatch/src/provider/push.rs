//! 模拟推送提供方
//!
//! 在发送前按平台配置格式化（截断标题/正文、补默认声音与图标、清除不支持的角标），
//! 再校验令牌与内容长度。同时维护设备注册表，并基于发送审计日志提供投递报告。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use notify_shared::config::ChannelConfig;
use notify_shared::error::{ErrorCode, NotificationError, Result};
use notify_shared::observability::metrics;
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::delivery::{DeliveryOracle, RandomDelivery, simulate_latency};
use super::{
    DeliveryReports, DeviceRegistration, DeviceRegistry, NotificationProvider, PlatformConfig,
    ProviderConfig, PushProvider, RateLimitConfig, SentStatus, TemplateSource, simulate_delivery,
};
use crate::models::{
    DeliveryStatus, Notification, NotificationResponse, NotificationStatus, NotificationType,
    Platform, PushNotification, PushPayload,
};
use crate::template::{PushTemplate, TemplateCatalog, default_push_templates};
use crate::validation;

const PROVIDER_NAME: &str = "mock-push";
const HEALTH_CHECK_LATENCY: Duration = Duration::from_millis(100);
const DELIVERY_SUCCESS_PERCENT: u32 = 85;
const DELIVERY_DELAY_MS: (u64, u64) = (500, 2500);
const ANDROID_DEFAULT_ICON: &str = "ic_notification";
const WEB_DEFAULT_ICON: &str = "/icon-192x192.png";

/// 已发送推送的审计记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentPush {
    pub id: Uuid,
    pub device_token: String,
    pub platform: Platform,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub badge: u32,
    pub sound: Option<String>,
    pub data: HashMap<String, String>,
    pub image_url: Option<String>,
    pub click_action: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub status: SentStatus,
    pub provider_data: HashMap<String, String>,
}

/// 已注册设备
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub token: String,
    pub platform: Platform,
    pub app_version: Option<String>,
    pub os_version: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub active: bool,
    pub metadata: HashMap<String, String>,
}

/// 平台处理延迟
fn platform_delay(platform: Platform) -> Duration {
    match platform {
        Platform::Ios => Duration::from_millis(200),
        Platform::Android => Duration::from_millis(250),
        Platform::Web => Duration::from_millis(300),
    }
}

/// 各平台默认配置
pub fn default_platform_configs() -> HashMap<Platform, PlatformConfig> {
    let settings = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    };

    HashMap::from([
        (
            Platform::Ios,
            PlatformConfig {
                platform: "ios".to_string(),
                max_payload_size: 4096,
                max_title_length: 50,
                max_body_length: 200,
                supports_badge: true,
                supports_sound: true,
                supports_image: true,
                supports_actions: true,
                default_sound: Some("default".to_string()),
                settings: settings(&[("service", "apns"), ("environment", "development")]),
            },
        ),
        (
            Platform::Android,
            PlatformConfig {
                platform: "android".to_string(),
                max_payload_size: 4000,
                max_title_length: 65,
                max_body_length: 240,
                supports_badge: false,
                supports_sound: true,
                supports_image: true,
                supports_actions: true,
                default_sound: Some("default".to_string()),
                settings: settings(&[("service", "fcm"), ("priority", "high")]),
            },
        ),
        (
            Platform::Web,
            PlatformConfig {
                platform: "web".to_string(),
                max_payload_size: 3072,
                max_title_length: 50,
                max_body_length: 120,
                supports_badge: true,
                supports_sound: false,
                supports_image: true,
                supports_actions: true,
                default_sound: None,
                settings: settings(&[("service", "web-push"), ("ttl", "2419200")]),
            },
        ),
    ])
}

/// 模拟推送提供方
pub struct MockPushProvider {
    config: ChannelConfig,
    templates: TemplateCatalog<PushTemplate>,
    sent: RwLock<Vec<SentPush>>,
    healthy: AtomicBool,
    devices: DashMap<String, DeviceInfo>,
    platforms: HashMap<Platform, PlatformConfig>,
    delivery: Arc<dyn DeliveryOracle>,
}

impl MockPushProvider {
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_delivery_oracle(config, Arc::new(RandomDelivery))
    }

    pub fn with_delivery_oracle(config: ChannelConfig, delivery: Arc<dyn DeliveryOracle>) -> Self {
        Self {
            config,
            templates: TemplateCatalog::new(default_push_templates()),
            sent: RwLock::new(Vec::new()),
            healthy: AtomicBool::new(true),
            devices: DashMap::new(),
            platforms: default_platform_configs(),
            delivery,
        }
    }

    pub fn sent_pushes(&self) -> Vec<SentPush> {
        self.sent.read().clone()
    }

    pub fn clear_sent_pushes(&self) {
        self.sent.write().clear();
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn ensure_healthy(&self, message: &str) -> Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NotificationError::provider(
                PROVIDER_NAME,
                ErrorCode::ProviderUnavailable,
                message,
            ))
        }
    }

    /// 通用头部转推送：平台取 metadata["platform"]（默认 android），
    /// 令牌取 metadata["device_token"]（默认收件人）
    fn to_push_notification(&self, notification: &Notification) -> Result<PushNotification> {
        if notification.notification_type != NotificationType::Push {
            return Err(NotificationError::validation(
                "type",
                "notification type must be push",
            ));
        }

        let platform = match notification.metadata_value("platform") {
            Some(raw) => raw.parse::<Platform>()?,
            None => Platform::Android,
        };
        let token = notification
            .metadata_value("device_token")
            .unwrap_or(&notification.recipient);

        let mut payload = PushPayload::new(token, platform);
        payload.title = notification.subject_str().to_string();
        payload.message = notification.body.clone();
        payload.sound = Some("default".to_string());
        Ok(PushNotification::new(notification.clone(), payload))
    }

    /// 按平台规则格式化载荷
    fn format_for_platform(&self, payload: &PushPayload) -> PushPayload {
        let Some(config) = self.platforms.get(&payload.platform) else {
            return payload.clone();
        };

        let mut formatted = payload.clone();
        formatted.title = validation::truncate_string(&formatted.title, config.max_title_length);
        formatted.message = validation::truncate_string(&formatted.message, config.max_body_length);

        if formatted.sound.as_deref().is_none_or(str::is_empty) && config.supports_sound {
            formatted.sound = config.default_sound.clone();
        }
        if !config.supports_badge {
            formatted.badge = 0;
        }

        let default_icon = match formatted.platform {
            Platform::Android => Some(ANDROID_DEFAULT_ICON),
            Platform::Web => Some(WEB_DEFAULT_ICON),
            Platform::Ios => None,
        };
        if let Some(icon) = default_icon
            && formatted.icon.as_deref().is_none_or(str::is_empty)
        {
            formatted.icon = Some(icon.to_string());
        }
        formatted
    }

    fn validate(&self, payload: &PushPayload) -> Result<()> {
        self.validate_device_token(&payload.device_token, payload.platform)?;

        if !self.supported_platforms().contains(&payload.platform) {
            return Err(NotificationError::validation(
                "platform",
                format!("unsupported platform: {}", payload.platform),
            ));
        }
        if payload.title.is_empty() && payload.message.is_empty() {
            return Err(NotificationError::validation(
                "content",
                "push notification must have either title or message",
            ));
        }

        if let Some(config) = self.platforms.get(&payload.platform) {
            if payload.title.chars().count() > config.max_title_length {
                return Err(NotificationError::validation(
                    "title",
                    format!("title too long (max {} characters)", config.max_title_length),
                ));
            }
            if payload.message.chars().count() > config.max_body_length {
                return Err(NotificationError::validation(
                    "message",
                    format!("message too long (max {} characters)", config.max_body_length),
                ));
            }
        }
        Ok(())
    }

    fn touch_device(&self, token: &str) {
        if let Some(mut device) = self.devices.get_mut(token) {
            device.last_seen = Utc::now();
            device.active = true;
        }
    }
}

#[async_trait]
impl NotificationProvider for MockPushProvider {
    async fn send(
        &self,
        cancel: &CancellationToken,
        notification: &Notification,
    ) -> Result<NotificationResponse> {
        self.ensure_healthy("provider is unhealthy")?;
        let push = self.to_push_notification(notification)?;
        self.send_push(cancel, &push).await
    }

    fn notification_type(&self) -> NotificationType {
        NotificationType::Push
    }

    async fn is_healthy(&self, cancel: &CancellationToken) -> Result<()> {
        let result = match self.ensure_healthy("provider is marked as unhealthy") {
            Ok(()) => simulate_latency(cancel, HEALTH_CHECK_LATENCY, "health check timed out").await,
            Err(e) => Err(e),
        };
        metrics::record_health_check("push", result.is_ok());
        result
    }

    fn config(&self) -> ProviderConfig {
        let platforms: Vec<&str> = self
            .supported_platforms()
            .iter()
            .map(Platform::as_str)
            .collect();

        ProviderConfig {
            name: "Mock Push Provider".to_string(),
            notification_type: NotificationType::Push,
            enabled: self.config.enabled,
            priority: 3,
            max_retries: 3,
            timeout_seconds: 45,
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_minute: 1000,
                burst_size: 50,
            },
            settings: HashMap::from([
                ("provider_type".to_string(), "mock".to_string()),
                ("version".to_string(), "1.0.0".to_string()),
                (
                    "features".to_string(),
                    "templates,validation,platform_specific,device_management".to_string(),
                ),
                ("supported_platforms".to_string(), platforms.join(",")),
            ]),
        }
    }
}

#[async_trait]
impl PushProvider for MockPushProvider {
    async fn send_push(
        &self,
        cancel: &CancellationToken,
        push: &PushNotification,
    ) -> Result<NotificationResponse> {
        self.ensure_healthy("provider is unhealthy")?;
        let start = Instant::now();

        let formatted = self.format_for_platform(&push.payload);
        if let Err(e) = self.validate(&formatted) {
            metrics::record_send("push", "rejected", start.elapsed().as_secs_f64());
            return Err(e);
        }

        let delay = platform_delay(formatted.platform);
        if let Err(e) = simulate_latency(cancel, delay, "push notification sending timed out").await {
            warn!(notification_id = %push.id(), "推送发送被取消");
            metrics::record_send("push", "timeout", start.elapsed().as_secs_f64());
            return Err(e);
        }

        let message_id = format!("push-{}", push.id());
        let mut provider_data = HashMap::from([
            ("provider".to_string(), PROVIDER_NAME.to_string()),
            ("message_id".to_string(), message_id.clone()),
            ("platform".to_string(), formatted.platform.to_string()),
            ("queue_time".to_string(), format!("{}ms", delay.as_millis())),
            ("retry_count".to_string(), "0".to_string()),
        ]);
        let (status, delivered_at, delivery_delay) = simulate_delivery(
            self.delivery.as_ref(),
            DELIVERY_SUCCESS_PERCENT,
            DELIVERY_DELAY_MS,
            &mut provider_data,
        );
        if let Some(delivery_delay) = delivery_delay {
            provider_data.insert(
                "delivery_delay".to_string(),
                format!("{}ms", delivery_delay.as_millis()),
            );
        }

        self.sent.write().push(SentPush {
            id: push.id(),
            device_token: formatted.device_token.clone(),
            platform: formatted.platform,
            title: formatted.title.clone(),
            body: formatted.message.clone(),
            icon: formatted.icon.clone(),
            badge: formatted.badge,
            sound: formatted.sound.clone(),
            data: formatted.data.clone(),
            image_url: formatted.image_url.clone(),
            click_action: formatted.click_action.clone(),
            sent_at: Utc::now(),
            delivered_at,
            status,
            provider_data,
        });
        self.touch_device(&formatted.device_token);

        info!(
            notification_id = %push.id(),
            message_id = %message_id,
            platform = %formatted.platform,
            status = status.as_str(),
            "模拟推送已发送"
        );
        metrics::record_send("push", "sent", start.elapsed().as_secs_f64());

        Ok(NotificationResponse::sent(
            push.id(),
            format!("Push notification sent to {} device", formatted.platform),
            message_id,
        ))
    }

    /// 提供方令牌规则：web 令牌要求 50-500 个字符
    fn validate_device_token(&self, token: &str, platform: Platform) -> Result<()> {
        if token.is_empty() {
            return Err(NotificationError::validation(
                "device_token",
                "device token is required",
            ));
        }
        match platform {
            Platform::Ios => validation::validate_ios_token(token),
            Platform::Android => validation::validate_android_token(token),
            Platform::Web => {
                if !(50..=500).contains(&token.len()) {
                    return Err(NotificationError::validation(
                        "device_token",
                        "Web push token must be 50-500 characters",
                    ));
                }
                Ok(())
            }
        }
    }

    fn platform_config(&self, platform: Platform) -> PlatformConfig {
        self.platforms
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| PlatformConfig::fallback(platform.as_str()))
    }

    fn templates(&self) -> Option<&dyn TemplateSource<PushTemplate>> {
        Some(&self.templates)
    }

    fn device_registry(&self) -> Option<&dyn DeviceRegistry> {
        Some(self)
    }

    fn delivery_reports(&self) -> Option<&dyn DeliveryReports> {
        Some(self)
    }
}

impl DeviceRegistry for MockPushProvider {
    fn register_device(
        &self,
        token: &str,
        platform: Platform,
        registration: DeviceRegistration,
    ) -> Result<()> {
        self.validate_device_token(token, platform)?;

        let now = Utc::now();
        self.devices.insert(
            token.to_string(),
            DeviceInfo {
                token: token.to_string(),
                platform,
                app_version: registration.app_version,
                os_version: registration.os_version,
                registered_at: now,
                last_seen: now,
                active: true,
                metadata: registration.metadata,
            },
        );
        debug!(platform = %platform, devices = self.devices.len(), "设备已注册");
        Ok(())
    }

    fn unregister_device(&self, token: &str) -> Result<()> {
        self.devices
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| NotificationError::not_found("device token not found"))
    }

    fn device_info(&self, token: &str) -> Result<DeviceInfo> {
        self.devices
            .get(token)
            .map(|device| device.value().clone())
            .ok_or_else(|| NotificationError::not_found("device token not found"))
    }
}

impl DeliveryReports for MockPushProvider {
    fn delivery_report(&self, notification_id: Uuid) -> Result<DeliveryStatus> {
        let sent = self.sent.read();
        let record = sent
            .iter()
            .rev()
            .find(|p| p.id == notification_id)
            .ok_or_else(|| {
                NotificationError::not_found(format!(
                    "delivery report not found: {notification_id}"
                ))
            })?;

        let (status, details, updated_at) = match (record.status, record.delivered_at) {
            (SentStatus::Delivered, Some(at)) => (
                NotificationStatus::Delivered,
                "Delivered to device",
                at,
            ),
            _ => (NotificationStatus::Sent, "Accepted by push gateway", record.sent_at),
        };

        Ok(DeliveryStatus {
            notification_id,
            status,
            details: Some(details.to_string()),
            updated_at,
            provider_data: record.provider_data.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FixedDelivery;

    fn ios_token() -> String {
        "a1".repeat(32)
    }

    fn provider() -> MockPushProvider {
        MockPushProvider::with_delivery_oracle(
            ChannelConfig::default(),
            Arc::new(FixedDelivery::delivered_after(Duration::from_millis(800))),
        )
    }

    fn push(token: &str, platform: Platform, title: &str, message: &str) -> PushNotification {
        let mut payload = PushPayload::new(token, platform);
        payload.title = title.to_string();
        payload.message = message.to_string();
        PushNotification::new(
            Notification::new(NotificationType::Push, token, message),
            payload,
        )
    }

    #[test]
    fn test_format_truncates_per_platform() {
        let provider = provider();
        let long_title = "t".repeat(130);

        let ios = provider.format_for_platform(&push(&ios_token(), Platform::Ios, &long_title, "m").payload);
        assert_eq!(ios.title.chars().count(), 50);
        assert!(ios.title.ends_with("..."));
        assert_eq!(ios.sound.as_deref(), Some("default"));

        let android_token = "x".repeat(150);
        let mut android = push(&android_token, Platform::Android, &long_title, "m").payload;
        android.badge = 7;
        let android = provider.format_for_platform(&android);
        assert_eq!(android.title.chars().count(), 65);
        assert_eq!(android.badge, 0);
        assert_eq!(android.icon.as_deref(), Some(ANDROID_DEFAULT_ICON));

        let web = provider.format_for_platform(&push(&"w".repeat(60), Platform::Web, "t", "m").payload);
        assert_eq!(web.icon.as_deref(), Some(WEB_DEFAULT_ICON));
        assert!(web.sound.is_none());
    }

    #[test]
    fn test_provider_token_rules() {
        let provider = provider();
        assert!(provider.validate_device_token(&ios_token(), Platform::Ios).is_ok());
        assert!(provider.validate_device_token(&"a".repeat(63), Platform::Ios).is_err());
        assert!(provider.validate_device_token(&"x".repeat(140), Platform::Android).is_ok());
        assert!(provider.validate_device_token(&"x".repeat(256), Platform::Android).is_err());
        assert!(provider.validate_device_token(&"w".repeat(49), Platform::Web).is_err());
        assert!(provider.validate_device_token(&"w".repeat(50), Platform::Web).is_ok());
        assert!(provider.validate_device_token(&"w".repeat(501), Platform::Web).is_err());
        assert_eq!(
            provider.validate_device_token("", Platform::Web).unwrap_err().field(),
            Some("device_token")
        );
    }

    #[tokio::test]
    async fn test_send_push_records_and_reports() {
        let provider = provider();
        let cancel = CancellationToken::new();
        let notification = push(&ios_token(), Platform::Ios, "Hello", "World");

        let response = provider.send_push(&cancel, &notification).await.unwrap();
        assert_eq!(response.message, "Push notification sent to ios device");
        assert_eq!(
            response.provider_id.as_deref(),
            Some(format!("push-{}", notification.id()).as_str())
        );

        let sent = provider.sent_pushes();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].provider_data["queue_time"], "200ms");
        assert_eq!(sent[0].provider_data["delivery_delay"], "800ms");

        let report = provider.delivery_report(notification.id()).unwrap();
        assert_eq!(report.status, NotificationStatus::Delivered);

        let missing = provider.delivery_report(Uuid::now_v7()).unwrap_err();
        assert_eq!(missing.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let provider = provider();
        let cancel = CancellationToken::new();
        let err = provider
            .send_push(&cancel, &push(&ios_token(), Platform::Ios, "", ""))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("content"));
        assert!(provider.sent_pushes().is_empty());
    }

    #[tokio::test]
    async fn test_device_registry_lifecycle() {
        let provider = provider();
        let token = ios_token();
        let registration = DeviceRegistration::from_metadata(HashMap::from([(
            "os_version".to_string(),
            "17.2".to_string(),
        )]));

        provider
            .register_device(&token, Platform::Ios, registration)
            .unwrap();
        let before = provider.device_info(&token).unwrap();
        assert_eq!(before.os_version.as_deref(), Some("17.2"));

        let cancel = CancellationToken::new();
        provider
            .send_push(&cancel, &push(&token, Platform::Ios, "Hi", "There"))
            .await
            .unwrap();
        assert!(provider.device_info(&token).unwrap().last_seen >= before.last_seen);

        provider.unregister_device(&token).unwrap();
        assert_eq!(
            provider.unregister_device(&token).unwrap_err().code(),
            ErrorCode::NotFound
        );
        assert!(provider.device_info(&token).is_err());

        assert!(
            provider
                .register_device("short", Platform::Ios, DeviceRegistration::default())
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_generic_send_reads_metadata() {
        let provider = MockPushProvider::with_delivery_oracle(
            ChannelConfig::default(),
            Arc::new(FixedDelivery::undelivered()),
        );
        let cancel = CancellationToken::new();

        let mut header =
            Notification::new(NotificationType::Push, "ignored", "Body").with_subject("Title");
        header.metadata.insert("platform".to_string(), "ios".to_string());
        header.metadata.insert("device_token".to_string(), ios_token());
        provider.send(&cancel, &header).await.unwrap();

        let sent = provider.sent_pushes();
        assert_eq!(sent[0].platform, Platform::Ios);
        assert_eq!(sent[0].device_token, ios_token());
        assert_eq!(sent[0].status, SentStatus::Sent);
        assert!(!sent[0].provider_data.contains_key("delivery_delay"));
    }

    #[test]
    fn test_platform_config_table() {
        let provider = provider();
        let web = provider.platform_config(Platform::Web);
        assert_eq!(web.max_payload_size, 3072);
        assert!(!web.supports_sound);
        assert_eq!(web.setting("ttl"), Some("2419200"));
        assert_eq!(provider.config().settings["supported_platforms"], "ios,android,web");
    }
}
