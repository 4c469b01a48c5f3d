//! 推送服务
//!
//! 推送请求使用通用的 `NotificationRequest` 加 `PushData`。发送前服务层先做预处理：
//! 估算负载大小并与平台上限比较，再按平台规则截断与补全字段，最后交给提供方校验令牌并发送。

use std::collections::HashMap;
use std::sync::Arc;

use notify_shared::config::ChannelConfig;
use notify_shared::error::{ErrorCode, NotificationError, Result};
use notify_shared::logger::Logger;
use notify_shared::observability::metrics;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ProviderStatus, ensure_mock_provider, templates_unsupported};
use crate::models::{
    DeliveryStatus, NotificationRequest, NotificationResponse, NotificationStatus,
    NotificationType, Platform, PushData, PushNotification, PushPayload,
};
use crate::provider::{DeviceRegistration, MockPushProvider, PlatformConfig, PushProvider};
use crate::template::PushTemplate;
use crate::validation;

/// 负载估算时附加的固定开销（字节）
const PAYLOAD_OVERHEAD: usize = 200;
const ANDROID_ICON: &str = "ic_notification";
const WEB_ICON: &str = "/icon-192x192.png";
const DEFAULT_SOUND: &str = "default";

/// 批量推送中的单项失败
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkPushFailure {
    pub index: usize,
    pub error: String,
}

/// 批量推送结果
///
/// `responses` 与请求一一对应，失败项为合成的 `Failed` 响应；`failures` 记录失败项的序号与错误。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkPushReport {
    pub responses: Vec<NotificationResponse>,
    pub failures: Vec<BulkPushFailure>,
}

impl BulkPushReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn sent_count(&self) -> usize {
        self.responses.iter().filter(|r| r.is_sent()).count()
    }

    /// 有失败项时汇总为一个错误
    pub fn aggregate_error(&self) -> Option<NotificationError> {
        if self.failures.is_empty() {
            return None;
        }
        let details = self
            .failures
            .iter()
            .map(|f| format!("notification {}: {}", f.index, f.error))
            .collect::<Vec<_>>()
            .join("; ");
        Some(NotificationError::with_details(
            ErrorCode::NotificationFailed,
            format!("bulk push operation had errors ({} failed)", self.failures.len()),
            details,
        ))
    }
}

pub struct PushService {
    provider: Arc<dyn PushProvider>,
    logger: Arc<dyn Logger>,
}

impl PushService {
    pub fn new(config: ChannelConfig, logger: Arc<dyn Logger>) -> Result<Self> {
        ensure_mock_provider(&config, "push")?;
        let provider = Arc::new(MockPushProvider::new(config));
        Ok(Self::with_provider(provider, logger))
    }

    pub fn with_provider(provider: Arc<dyn PushProvider>, logger: Arc<dyn Logger>) -> Self {
        Self {
            provider,
            logger: logger.with_field("service", "push".to_string()),
        }
    }

    pub async fn send_push(
        &self,
        cancel: &CancellationToken,
        request: &NotificationRequest,
    ) -> Result<NotificationResponse> {
        let push_data = match self.validate_request(request) {
            Ok(data) => data,
            Err(e) => {
                self.logger
                    .error(&format!("Push notification validation failed: {e}"));
                return Err(e);
            }
        };

        let logger = self.logger.with_fields(vec![
            ("platform", push_data.platform.clone()),
            ("device_token", token_prefix(&push_data.device_token)),
        ]);
        logger.info("Sending push notification");

        if let Err(e) = self.provider.is_healthy(cancel).await {
            logger.error(&format!("Push provider health check failed: {e}"));
            return Err(e);
        }

        let mut push = match self.build_notification(request, push_data) {
            Ok(push) => push,
            Err(e) => {
                logger.error(&format!("Failed to build push notification: {e}"));
                return Err(e);
            }
        };

        if let Err(e) = self.preprocess(&mut push) {
            logger.error(&format!("Push notification preprocessing failed: {e}"));
            return Err(e);
        }

        self.provider
            .validate_device_token(&push.payload.device_token, push.payload.platform)?;

        match self.provider.send_push(cancel, &push).await {
            Ok(response) => {
                logger.info(&format!(
                    "Push notification sent successfully with ID: {}",
                    response.id
                ));
                Ok(response)
            }
            Err(e) => {
                logger.error(&format!("Push notification sending failed: {e}"));
                Err(e)
            }
        }
    }

    /// 顺序发送；失败项既出现在 `responses` 中，也记录在 `failures` 里
    ///
    /// 单项失败不会使返回值变为 `Err`，调用方需检查 [`BulkPushReport::aggregate_error`]。
    pub async fn send_bulk_push(
        &self,
        cancel: &CancellationToken,
        requests: &[NotificationRequest],
    ) -> Result<BulkPushReport> {
        if requests.is_empty() {
            return Err(NotificationError::validation(
                "requests",
                "at least one notification request is required",
            ));
        }
        self.logger.info(&format!(
            "Sending bulk push notifications: {} requests",
            requests.len()
        ));

        let mut report = BulkPushReport::default();
        for (index, request) in requests.iter().enumerate() {
            let response = match self.send_push(cancel, request).await {
                Ok(response) => response,
                Err(e) => {
                    self.logger
                        .error(&format!("Failed to send push notification {index}: {e}"));
                    report.failures.push(BulkPushFailure {
                        index,
                        error: e.to_string(),
                    });
                    NotificationResponse::failed(&e)
                }
            };
            metrics::record_bulk_item("push", response.is_sent());
            report.responses.push(response);
        }

        self.logger.info(&format!(
            "Bulk push completed: {} sent, {} failed",
            report.sent_count(),
            report.failures.len()
        ));
        Ok(report)
    }

    pub fn register_device(
        &self,
        token: &str,
        platform: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let platform = platform.parse::<Platform>()?;
        let registry = self.provider.device_registry().ok_or_else(registry_unsupported)?;

        registry.register_device(token, platform, DeviceRegistration::from_metadata(metadata))?;
        self.logger.info(&format!(
            "Device registered: {}... ({platform})",
            token_prefix(token)
        ));
        Ok(())
    }

    pub fn unregister_device(&self, token: &str) -> Result<()> {
        let registry = self.provider.device_registry().ok_or_else(registry_unsupported)?;

        registry.unregister_device(token)?;
        self.logger
            .info(&format!("Device unregistered: {}...", token_prefix(token)));
        Ok(())
    }

    pub fn platform_config(&self, platform: &str) -> Result<PlatformConfig> {
        let platform = platform.parse::<Platform>()?;
        Ok(self.provider.platform_config(platform))
    }

    pub fn supported_platforms(&self) -> Vec<Platform> {
        self.provider.supported_platforms()
    }

    /// 提供方不支持投递报告时退化为 `Sent`
    pub fn delivery_report(&self, notification_id: Uuid) -> Result<DeliveryStatus> {
        match self.provider.delivery_reports() {
            Some(reports) => reports.delivery_report(notification_id),
            None => Ok(DeliveryStatus {
                notification_id,
                status: NotificationStatus::Sent,
                details: Some("Provider does not support delivery reports".to_string()),
                updated_at: chrono::Utc::now(),
                provider_data: HashMap::new(),
            }),
        }
    }

    pub async fn health_check(&self, cancel: &CancellationToken) -> Result<()> {
        self.provider.is_healthy(cancel).await.map_err(|e| {
            NotificationError::new(
                ErrorCode::ProviderUnavailable,
                format!("push provider unhealthy: {e}"),
            )
        })
    }

    pub fn list_templates(&self) -> Vec<PushTemplate> {
        self.provider
            .templates()
            .map(|t| t.list_templates())
            .unwrap_or_default()
    }

    pub fn add_template(&self, template: PushTemplate) -> Result<PushTemplate> {
        let templates = self.provider.templates().ok_or_else(templates_unsupported)?;
        Ok(templates.add_template(template))
    }

    pub fn render_template(
        &self,
        template_id: &str,
        data: &HashMap<String, String>,
    ) -> Result<PushTemplate> {
        let templates = self.provider.templates().ok_or_else(templates_unsupported)?;
        templates.render_template(template_id, data)
    }

    pub fn validate_device_token(&self, token: &str, platform: &str) -> Result<()> {
        let platform = platform.parse::<Platform>()?;
        self.provider.validate_device_token(token, platform)
    }

    pub async fn provider_status(&self, cancel: &CancellationToken) -> ProviderStatus {
        ProviderStatus::probe(self.provider.as_ref(), cancel).await
    }

    fn validate_request<'a>(&self, request: &'a NotificationRequest) -> Result<&'a PushData> {
        if request.notification_type != NotificationType::Push {
            return Err(NotificationError::validation(
                "type",
                "notification type must be push",
            ));
        }
        if request.body.is_empty() {
            return Err(NotificationError::validation(
                "body",
                "notification body is required",
            ));
        }
        let Some(data) = request.push_data() else {
            return Err(NotificationError::validation(
                "push_data",
                "push data is required for push notifications",
            ));
        };
        if data.device_token.is_empty() {
            return Err(NotificationError::validation(
                "device_token",
                "device token is required",
            ));
        }
        if data.platform.is_empty() {
            return Err(NotificationError::validation("platform", "platform is required"));
        }

        let supported = self.provider.supported_platforms();
        let is_supported = data
            .platform
            .parse::<Platform>()
            .is_ok_and(|p| supported.contains(&p));
        if !is_supported {
            let names = supported
                .iter()
                .map(Platform::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(NotificationError::validation(
                "platform",
                format!("unsupported platform: {}. Supported: {names}", data.platform),
            ));
        }
        Ok(data)
    }

    fn build_notification(
        &self,
        request: &NotificationRequest,
        push_data: &PushData,
    ) -> Result<PushNotification> {
        let platform = push_data.platform.parse::<Platform>()?;
        let mut header = validation::notification_from_request(request);

        let mut payload = PushPayload::new(&push_data.device_token, platform);
        payload.title = push_data
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| request.subject.clone())
            .unwrap_or_default();
        payload.message = request.body.clone();
        payload.icon = push_data.icon.clone();
        payload.badge = push_data.badge;
        payload.sound = push_data
            .sound
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| Some(DEFAULT_SOUND.to_string()));
        payload.data = push_data.data.clone();
        // 同名键以请求 metadata 为准
        payload
            .data
            .extend(request.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        payload.image_url = push_data.image_url.clone();
        payload.click_action = push_data.click_action.clone();

        if let Some(template_id) = push_data.template_id.as_deref().filter(|id| !id.is_empty()) {
            let rendered = self.render_template(template_id, &push_data.template_data)?;
            if !rendered.applies_to(platform.as_str()) {
                return Err(NotificationError::validation(
                    "template_id",
                    format!("template {template_id} does not apply to platform {platform}"),
                ));
            }
            payload.title = rendered.title;
            payload.message = rendered.body;
            if rendered.icon.is_some() {
                payload.icon = rendered.icon;
            }
            if rendered.sound.is_some() {
                payload.sound = rendered.sound;
            }
            header.subject = Some(payload.title.clone());
            header.body = payload.message.clone();
        }

        Ok(PushNotification::new(header, payload))
    }

    /// 负载大小检查与平台规则
    fn preprocess(&self, push: &mut PushNotification) -> Result<()> {
        let payload = &mut push.payload;
        let config = self.provider.platform_config(payload.platform);

        let size = estimate_payload_size(payload);
        if size > config.max_payload_size {
            return Err(NotificationError::validation(
                "payload",
                format!(
                    "payload too large for platform {} (max: {} bytes)",
                    payload.platform, config.max_payload_size
                ),
            ));
        }

        if config.max_title_length > 0 {
            payload.title = validation::truncate_string(&payload.title, config.max_title_length);
        }
        if config.max_body_length > 0 {
            payload.message = validation::truncate_string(&payload.message, config.max_body_length);
        }

        match payload.platform {
            Platform::Ios => {
                if payload.sound.as_deref().is_none_or(str::is_empty) {
                    payload.sound = Some(DEFAULT_SOUND.to_string());
                }
            }
            Platform::Android => {
                if payload.icon.as_deref().is_none_or(str::is_empty) {
                    payload.icon = Some(ANDROID_ICON.to_string());
                }
                payload.badge = 0;
            }
            Platform::Web => {
                if payload.icon.as_deref().is_none_or(str::is_empty) {
                    payload.icon = Some(WEB_ICON.to_string());
                }
                payload.sound = None;
            }
        }
        Ok(())
    }
}

/// 估算序列化后的负载字节数
fn estimate_payload_size(payload: &PushPayload) -> usize {
    let optional = [
        &payload.icon,
        &payload.sound,
        &payload.image_url,
        &payload.click_action,
    ]
    .into_iter()
    .flatten()
    .map(String::len)
    .sum::<usize>();

    let data = payload
        .data
        .iter()
        .map(|(k, v)| k.len() + v.len())
        .sum::<usize>();

    payload.title.len() + payload.message.len() + optional + data + PAYLOAD_OVERHEAD
}

fn registry_unsupported() -> NotificationError {
    NotificationError::new(
        ErrorCode::ProviderNotFound,
        "device registration not supported by this provider",
    )
}

fn token_prefix(token: &str) -> String {
    token.chars().take(8).collect()
}
