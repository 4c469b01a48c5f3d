//! 模拟邮件提供方

use std::collections::HashMap;
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

use super::delivery::simulate_latency;
use super::{
    EmailProvider, NotificationProvider, ProviderConfig, RateLimitConfig, SentStatus,
    TemplateSource,
};
use crate::models::{
    EmailNotification, EmailPayload, Notification, NotificationResponse, NotificationType,
};
use crate::template::{EmailTemplate, TemplateCatalog, default_email_templates};
use crate::validation;

const PROVIDER_NAME: &str = "mock-email";
pub const DEFAULT_SENDER: &str = "noreply@notification-service.local";
const SEND_LATENCY: Duration = Duration::from_millis(100);
const HEALTH_CHECK_LATENCY: Duration = Duration::from_millis(50);

/// 已发送邮件的审计记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentEmail {
    pub id: Uuid,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub from: String,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub headers: HashMap<String, String>,
    pub attachment_count: usize,
    pub sent_at: DateTime<Utc>,
    pub status: SentStatus,
    pub provider_data: HashMap<String, String>,
}

/// 模拟邮件提供方
///
/// 不做真实投递：校验、等待 100ms 后记录审计日志并返回 `Sent`。
pub struct MockEmailProvider {
    config: ChannelConfig,
    templates: TemplateCatalog<EmailTemplate>,
    sent: RwLock<Vec<SentEmail>>,
    healthy: AtomicBool,
}

impl MockEmailProvider {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            templates: TemplateCatalog::new(default_email_templates()),
            sent: RwLock::new(Vec::new()),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn sent_emails(&self) -> Vec<SentEmail> {
        self.sent.read().clone()
    }

    pub fn clear_sent_emails(&self) {
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

    fn default_sender(&self) -> String {
        self.config
            .setting("default_sender")
            .unwrap_or(DEFAULT_SENDER)
            .to_string()
    }

    fn to_email_notification(&self, notification: &Notification) -> Result<EmailNotification> {
        if notification.notification_type != NotificationType::Email {
            return Err(NotificationError::validation(
                "type",
                "notification type must be email",
            ));
        }

        let payload = EmailPayload {
            to: vec![notification.recipient.clone()],
            from: Some(self.default_sender()),
            html_body: Some(notification.body.clone()),
            text_body: Some(notification.body.clone()),
            ..Default::default()
        };
        Ok(EmailNotification::new(notification.clone(), payload))
    }

    fn validate(&self, email: &EmailNotification) -> Result<()> {
        let payload = &email.payload;

        if payload.to.is_empty() {
            return Err(NotificationError::validation(
                "to",
                "at least one recipient is required",
            ));
        }
        for (field, addresses) in [("to", &payload.to), ("cc", &payload.cc), ("bcc", &payload.bcc)]
        {
            for address in addresses {
                if self.validate_email_address(address).is_err() {
                    return Err(NotificationError::validation(
                        field,
                        format!("invalid email address: {address}"),
                    ));
                }
            }
        }

        if let Some(from) = payload.from.as_deref().filter(|s| !s.is_empty())
            && self.validate_email_address(from).is_err()
        {
            return Err(NotificationError::validation(
                "from",
                "invalid sender email address",
            ));
        }
        if let Some(reply_to) = payload.reply_to.as_deref().filter(|s| !s.is_empty())
            && self.validate_email_address(reply_to).is_err()
        {
            return Err(NotificationError::validation(
                "reply_to",
                "invalid reply-to email address",
            ));
        }

        if email.header.subject_str().is_empty() {
            return Err(NotificationError::validation(
                "subject",
                "email subject is required",
            ));
        }
        let has_html = payload.html_body.as_deref().is_some_and(|b| !b.is_empty());
        let has_text = payload.text_body.as_deref().is_some_and(|b| !b.is_empty());
        if !has_html && !has_text {
            return Err(NotificationError::validation(
                "body",
                "email must have either HTML or text body",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationProvider for MockEmailProvider {
    async fn send(
        &self,
        cancel: &CancellationToken,
        notification: &Notification,
    ) -> Result<NotificationResponse> {
        self.ensure_healthy("provider is unhealthy")?;
        let email = self.to_email_notification(notification)?;
        self.send_email(cancel, &email).await
    }

    fn notification_type(&self) -> NotificationType {
        NotificationType::Email
    }

    async fn is_healthy(&self, cancel: &CancellationToken) -> Result<()> {
        let result = match self.ensure_healthy("provider is marked as unhealthy") {
            Ok(()) => simulate_latency(cancel, HEALTH_CHECK_LATENCY, "health check timed out").await,
            Err(e) => Err(e),
        };
        metrics::record_health_check("email", result.is_ok());
        result
    }

    fn config(&self) -> ProviderConfig {
        ProviderConfig {
            name: "Mock Email Provider".to_string(),
            notification_type: NotificationType::Email,
            enabled: self.config.enabled,
            priority: 1,
            max_retries: 3,
            timeout_seconds: 30,
            rate_limit: RateLimitConfig {
                enabled: true,
                requests_per_minute: 100,
                burst_size: 10,
            },
            settings: HashMap::from([
                ("provider_type".to_string(), "mock".to_string()),
                ("version".to_string(), "1.0.0".to_string()),
                (
                    "features".to_string(),
                    "templates,validation,tracking".to_string(),
                ),
            ]),
        }
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send_email(
        &self,
        cancel: &CancellationToken,
        email: &EmailNotification,
    ) -> Result<NotificationResponse> {
        self.ensure_healthy("provider is unhealthy")?;
        let start = Instant::now();

        if let Err(e) = self.validate(email) {
            metrics::record_send("email", "rejected", start.elapsed().as_secs_f64());
            return Err(e);
        }

        if let Err(e) = simulate_latency(cancel, SEND_LATENCY, "email sending timed out").await {
            warn!(notification_id = %email.id(), "邮件发送被取消");
            metrics::record_send("email", "timeout", start.elapsed().as_secs_f64());
            return Err(e);
        }

        let payload = &email.payload;
        let message_id = format!("mock-{}", email.id());
        let record = SentEmail {
            id: email.id(),
            to: payload.to.clone(),
            cc: payload.cc.clone(),
            bcc: payload.bcc.clone(),
            from: payload.from.clone().unwrap_or_default(),
            subject: email.header.subject_str().to_string(),
            html_body: payload.html_body.clone(),
            text_body: payload.text_body.clone(),
            headers: payload.headers.clone(),
            attachment_count: payload.attachments.len(),
            sent_at: Utc::now(),
            status: SentStatus::Sent,
            provider_data: HashMap::from([
                ("provider".to_string(), PROVIDER_NAME.to_string()),
                ("message_id".to_string(), message_id.clone()),
                ("queue_time".to_string(), "100ms".to_string()),
                ("retry_count".to_string(), "0".to_string()),
            ]),
        };
        self.sent.write().push(record);

        info!(
            notification_id = %email.id(),
            message_id = %message_id,
            recipients = payload.to.len(),
            "模拟邮件已发送"
        );
        metrics::record_send("email", "sent", start.elapsed().as_secs_f64());

        Ok(NotificationResponse::sent(
            email.id(),
            format!("Email successfully sent to {} recipients", payload.to.len()),
            message_id,
        ))
    }

    fn validate_email_address(&self, email: &str) -> Result<()> {
        validation::validate_email_address(email)
    }

    fn templates(&self) -> Option<&dyn TemplateSource<EmailTemplate>> {
        Some(&self.templates)
    }
}
