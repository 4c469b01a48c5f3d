//! 模拟短信提供方

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify_shared::config::ChannelConfig;
use notify_shared::error::{ErrorCode, NotificationError, Result};
use notify_shared::observability::metrics;
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::delivery::{DeliveryOracle, RandomDelivery, simulate_latency};
use super::{
    NotificationProvider, ProviderConfig, RateLimitConfig, SentStatus, SmsProvider,
    TemplateSource, simulate_delivery,
};
use crate::models::{Notification, NotificationResponse, NotificationType, SmsNotification, SmsPayload};
use crate::pricing::{self, CountryInfo};
use crate::template::{SmsTemplate, TemplateCatalog, default_sms_templates};
use crate::validation;

const PROVIDER_NAME: &str = "mock-sms";
const SEND_LATENCY: Duration = Duration::from_millis(150);
const HEALTH_CHECK_LATENCY: Duration = Duration::from_millis(75);
/// 投递成功率（百分比）与投递延迟区间（毫秒）
const DELIVERY_SUCCESS_PERCENT: u32 = 90;
const DELIVERY_DELAY_MS: (u64, u64) = (100, 600);

/// 已发送短信的审计记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentSms {
    pub id: Uuid,
    pub phone_number: String,
    pub country_code: Option<String>,
    pub message: String,
    pub unicode: bool,
    pub sent_at: DateTime<Utc>,
    pub status: SentStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cost: f64,
    pub segments: u32,
    pub provider_data: HashMap<String, String>,
}

/// 模拟短信提供方
pub struct MockSmsProvider {
    config: ChannelConfig,
    templates: TemplateCatalog<SmsTemplate>,
    sent: RwLock<Vec<SentSms>>,
    healthy: AtomicBool,
    costs: HashMap<String, f64>,
    delivery: Arc<dyn DeliveryOracle>,
}

impl MockSmsProvider {
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_delivery_oracle(config, Arc::new(RandomDelivery))
    }

    /// 指定投递结果来源
    pub fn with_delivery_oracle(config: ChannelConfig, delivery: Arc<dyn DeliveryOracle>) -> Self {
        let costs = pricing::COUNTRY_COSTS
            .iter()
            .map(|(code, cost)| (code.to_string(), *cost))
            .collect();

        Self {
            config,
            templates: TemplateCatalog::new(default_sms_templates()),
            sent: RwLock::new(Vec::new()),
            healthy: AtomicBool::new(true),
            costs,
            delivery,
        }
    }

    pub fn sent_sms(&self) -> Vec<SentSms> {
        self.sent.read().clone()
    }

    pub fn clear_sent_sms(&self) {
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

    /// 发送时计费，表外国家按默认价格
    fn segment_cost(&self, country_code: Option<&str>) -> f64 {
        country_code
            .and_then(|code| self.costs.get(&code.to_ascii_uppercase()))
            .copied()
            .unwrap_or(pricing::DEFAULT_SEGMENT_COST)
    }

    fn to_sms_notification(&self, notification: &Notification) -> Result<SmsNotification> {
        if notification.notification_type != NotificationType::Sms {
            return Err(NotificationError::validation(
                "type",
                "notification type must be SMS",
            ));
        }

        let payload = SmsPayload {
            phone_number: notification.recipient.clone(),
            country_code: notification.metadata_value("country_code").map(str::to_string),
            message: notification.body.clone(),
            unicode: pricing::requires_unicode(&notification.body),
        };
        Ok(SmsNotification::new(notification.clone(), payload))
    }

    fn validate(&self, sms: &SmsNotification) -> Result<()> {
        let payload = &sms.payload;
        self.validate_phone_number(&payload.phone_number, payload.country_code.as_deref())?;

        if payload.message.is_empty() {
            return Err(NotificationError::validation(
                "message",
                "SMS message is required",
            ));
        }
        let max_length = pricing::max_message_length(payload.unicode);
        if payload.message.chars().count() > max_length {
            return Err(NotificationError::validation(
                "message",
                format!("message too long (max {max_length} characters for 10 segments)"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationProvider for MockSmsProvider {
    async fn send(
        &self,
        cancel: &CancellationToken,
        notification: &Notification,
    ) -> Result<NotificationResponse> {
        self.ensure_healthy("provider is unhealthy")?;
        let sms = self.to_sms_notification(notification)?;
        self.send_sms(cancel, &sms).await
    }

    fn notification_type(&self) -> NotificationType {
        NotificationType::Sms
    }

    async fn is_healthy(&self, cancel: &CancellationToken) -> Result<()> {
        let result = match self.ensure_healthy("provider is marked as unhealthy") {
            Ok(()) => simulate_latency(cancel, HEALTH_CHECK_LATENCY, "health check timed out").await,
            Err(e) => Err(e),
        };
        metrics::record_health_check("sms", result.is_ok());
        result
    }

    fn config(&self) -> ProviderConfig {
        ProviderConfig {
            name: "Mock SMS Provider".to_string(),
            notification_type: NotificationType::Sms,
            enabled: self.config.enabled,
            priority: 2,
            max_retries: 3,
            timeout_seconds: 30,
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_minute: 60,
                burst_size: 5,
            },
            settings: HashMap::from([
                ("provider_type".to_string(), "mock".to_string()),
                ("version".to_string(), "1.0.0".to_string()),
                (
                    "features".to_string(),
                    "templates,validation,cost_calculation,delivery_tracking".to_string(),
                ),
                (
                    "supported_countries".to_string(),
                    validation::VALIDATION_COUNTRIES.join(","),
                ),
            ]),
        }
    }
}

#[async_trait]
impl SmsProvider for MockSmsProvider {
    async fn send_sms(
        &self,
        cancel: &CancellationToken,
        sms: &SmsNotification,
    ) -> Result<NotificationResponse> {
        self.ensure_healthy("provider is unhealthy")?;
        let start = Instant::now();

        if let Err(e) = self.validate(sms) {
            metrics::record_send("sms", "rejected", start.elapsed().as_secs_f64());
            return Err(e);
        }

        if let Err(e) = simulate_latency(cancel, SEND_LATENCY, "SMS sending timed out").await {
            warn!(notification_id = %sms.id(), "短信发送被取消");
            metrics::record_send("sms", "timeout", start.elapsed().as_secs_f64());
            return Err(e);
        }

        let payload = &sms.payload;
        let country_code = payload.country_code.as_deref().filter(|c| !c.is_empty());
        let segments = pricing::calculate_segments(&payload.message, payload.unicode);
        let cost = f64::from(segments) * self.segment_cost(country_code);
        let message_id = format!("sms-{}", sms.id());

        let mut provider_data = HashMap::from([
            ("provider".to_string(), PROVIDER_NAME.to_string()),
            ("message_id".to_string(), message_id.clone()),
            ("queue_time".to_string(), "150ms".to_string()),
            ("retry_count".to_string(), "0".to_string()),
            (
                "country_code".to_string(),
                country_code.unwrap_or_default().to_string(),
            ),
        ]);
        let (status, delivered_at, _) = simulate_delivery(
            self.delivery.as_ref(),
            DELIVERY_SUCCESS_PERCENT,
            DELIVERY_DELAY_MS,
            &mut provider_data,
        );

        self.sent.write().push(SentSms {
            id: sms.id(),
            phone_number: payload.phone_number.clone(),
            country_code: country_code.map(str::to_string),
            message: payload.message.clone(),
            unicode: payload.unicode,
            sent_at: Utc::now(),
            status,
            delivered_at,
            cost,
            segments,
            provider_data,
        });

        info!(
            notification_id = %sms.id(),
            message_id = %message_id,
            segments,
            cost,
            status = status.as_str(),
            "模拟短信已发送"
        );
        metrics::record_sms_segments(country_code.unwrap_or("unknown"), segments);
        metrics::record_send("sms", "sent", start.elapsed().as_secs_f64());

        Ok(NotificationResponse::sent(
            sms.id(),
            format!(
                "SMS sent to {} ({} segments, ${:.4})",
                payload.phone_number, segments, cost
            ),
            message_id,
        ))
    }

    fn validate_phone_number(&self, phone_number: &str, country_code: Option<&str>) -> Result<()> {
        validation::validate_phone_number(phone_number, country_code)
    }

    fn sms_cost(&self, country_code: Option<&str>) -> Result<f64> {
        let Some(code) = country_code.filter(|c| !c.is_empty()) else {
            return Ok(pricing::DEFAULT_SEGMENT_COST);
        };
        let upper = code.to_ascii_uppercase();
        self.costs.get(&upper).copied().ok_or_else(|| {
            NotificationError::not_found(format!("country code not supported: {upper}"))
        })
    }

    fn supported_countries(&self) -> Vec<CountryInfo> {
        pricing::supported_countries()
    }

    fn templates(&self) -> Option<&dyn TemplateSource<SmsTemplate>> {
        Some(&self.templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FixedDelivery;

    fn provider() -> MockSmsProvider {
        MockSmsProvider::with_delivery_oracle(
            ChannelConfig::default(),
            Arc::new(FixedDelivery::delivered_after(Duration::from_millis(200))),
        )
    }

    fn sms(phone: &str, country: Option<&str>, message: &str) -> SmsNotification {
        SmsNotification::new(
            Notification::new(NotificationType::Sms, phone, message),
            SmsPayload {
                phone_number: phone.to_string(),
                country_code: country.map(str::to_string),
                message: message.to_string(),
                unicode: false,
            },
        )
    }

    #[tokio::test]
    async fn test_send_sms_computes_segments_and_cost() {
        let provider = provider();
        let cancel = CancellationToken::new();

        let response = provider
            .send_sms(&cancel, &sms("1234567890", Some("US"), "Hello world"))
            .await
            .unwrap();
        assert!(response.is_sent());
        assert!(
            response
                .message
                .contains("SMS sent to 1234567890 (1 segments, $0.0075)")
        );
        assert!(response.provider_id.unwrap().starts_with("sms-"));

        let sent = provider.sent_sms();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].segments, 1);
        assert!((sent[0].cost - 0.0075).abs() < f64::EPSILON);
        assert_eq!(sent[0].status, SentStatus::Delivered);
        assert!(sent[0].delivered_at.is_some());
        assert_eq!(sent[0].provider_data["country_code"], "US");
    }

    #[tokio::test]
    async fn test_multi_segment_default_cost() {
        let provider = MockSmsProvider::with_delivery_oracle(
            ChannelConfig::default(),
            Arc::new(FixedDelivery::undelivered()),
        );
        let cancel = CancellationToken::new();

        provider
            .send_sms(&cancel, &sms("1234567890", None, &"a".repeat(200)))
            .await
            .unwrap();

        let sent = provider.sent_sms();
        assert_eq!(sent[0].segments, 2);
        assert!((sent[0].cost - 0.02).abs() < 1e-9);
        assert_eq!(sent[0].status, SentStatus::Sent);
        assert!(sent[0].delivered_at.is_none());
    }

    #[tokio::test]
    async fn test_message_length_bound() {
        let provider = provider();
        let cancel = CancellationToken::new();

        let err = provider
            .send_sms(&cancel, &sms("1234567890", None, &"a".repeat(1601)))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("message"));
        assert!(err.to_string().contains("max 1600 characters"));

        let err = provider
            .send_sms(&cancel, &sms("1234567890", None, ""))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("message"));
    }

    #[tokio::test]
    async fn test_generic_send_detects_unicode_and_country() {
        let provider = provider();
        let cancel = CancellationToken::new();

        let mut header = Notification::new(NotificationType::Sms, "1234567890", "Grüße aus Köln");
        header
            .metadata
            .insert("country_code".to_string(), "US".to_string());
        provider.send(&cancel, &header).await.unwrap();

        let sent = provider.sent_sms();
        assert!(sent[0].unicode);
        assert_eq!(sent[0].country_code.as_deref(), Some("US"));
    }

    #[tokio::test]
    async fn test_cancelled_send_leaves_no_record() {
        let provider = provider();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provider
            .send_sms(&cancel, &sms("1234567890", Some("US"), "Hello"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(provider.sent_sms().is_empty());
    }

    #[test]
    fn test_sms_cost_lookup() {
        let provider = provider();
        assert_eq!(provider.sms_cost(None).unwrap(), 0.01);
        assert_eq!(provider.sms_cost(Some("jp")).unwrap(), 0.0120);
        let err = provider.sms_cost(Some("zz")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.to_string().contains("ZZ"));

        // 发送计费不报错，表外国家按默认价格
        assert_eq!(provider.segment_cost(Some("in")), 0.0050);
        assert_eq!(provider.segment_cost(Some("ZZ")), pricing::DEFAULT_SEGMENT_COST);
        assert_eq!(provider.segment_cost(None), pricing::DEFAULT_SEGMENT_COST);
    }

    #[test]
    fn test_config_and_templates() {
        let provider = provider();
        let config = provider.config();
        assert_eq!(config.priority, 2);
        assert_eq!(
            config.settings["supported_countries"],
            "US,UK,CA,AU,DE,FR,IN,BR"
        );
        assert_eq!(provider.supported_countries().len(), 8);

        let added = provider.templates().unwrap().add_template(SmsTemplate {
            message: "Code {{code}}".to_string(),
            ..Default::default()
        });
        assert_eq!(added.max_length, 160);
    }
}
