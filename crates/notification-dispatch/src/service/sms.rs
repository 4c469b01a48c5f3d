//! 短信服务

use std::collections::HashMap;
use std::sync::Arc;

use notify_shared::config::ChannelConfig;
use notify_shared::error::{NotificationError, Result};
use notify_shared::logger::Logger;
use notify_shared::observability::metrics;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{ProviderStatus, ensure_mock_provider, log_preview, templates_unsupported};
use crate::models::{
    Notification, NotificationResponse, NotificationType, Priority, SmsNotification, SmsPayload,
};
use crate::pricing::{self, CountryInfo};
use crate::provider::{MockSmsProvider, SmsProvider};
use crate::template::{SmsTemplate, merge_template_data};

const SMS_SUBJECT: &str = "SMS Notification";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsRequest {
    pub phone_number: String,
    pub country_code: Option<String>,
    pub message: String,
    pub unicode: bool,
    pub template_id: Option<String>,
    pub template_data: HashMap<String, String>,
    pub priority: Priority,
    pub metadata: HashMap<String, String>,
}

impl SmsRequest {
    pub fn new(phone_number: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_country(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = Some(country_code.into());
        self
    }

    pub fn with_template(
        mut self,
        template_id: impl Into<String>,
        template_data: HashMap<String, String>,
    ) -> Self {
        self.template_id = Some(template_id.into());
        self.template_data = template_data;
        self
    }

    fn template_id(&self) -> Option<&str> {
        self.template_id.as_deref().filter(|id| !id.is_empty())
    }

    fn country_code(&self) -> Option<&str> {
        self.country_code.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkSmsRecipient {
    pub phone_number: String,
    pub country_code: Option<String>,
    pub data: HashMap<String, String>,
}

/// 批量短信请求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkSmsRequest {
    pub recipients: Vec<BulkSmsRecipient>,
    pub message: String,
    pub unicode: bool,
    pub template_id: Option<String>,
    pub template_data: HashMap<String, String>,
    pub priority: Priority,
    pub metadata: HashMap<String, String>,
}

/// 费用预估
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmsCostEstimate {
    pub segments: u32,
    pub cost_per_segment: f64,
    pub total_cost: f64,
    pub unicode: bool,
    pub country_code: Option<String>,
    pub message_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedSmsTemplate {
    pub id: String,
    pub message: String,
    pub max_length: usize,
    pub unicode: bool,
    pub segments: u32,
}

pub struct SmsService {
    provider: Arc<dyn SmsProvider>,
    logger: Arc<dyn Logger>,
}

impl SmsService {
    pub fn new(config: ChannelConfig, logger: Arc<dyn Logger>) -> Result<Self> {
        ensure_mock_provider(&config, "SMS")?;
        let provider = Arc::new(MockSmsProvider::new(config));
        Ok(Self::with_provider(provider, logger))
    }

    pub fn with_provider(provider: Arc<dyn SmsProvider>, logger: Arc<dyn Logger>) -> Self {
        Self {
            provider,
            logger: logger.with_field("service", "sms".to_string()),
        }
    }

    pub async fn send_sms(
        &self,
        cancel: &CancellationToken,
        request: &SmsRequest,
    ) -> Result<NotificationResponse> {
        if let Err(e) = self.validate_request(request) {
            self.logger.error(&format!("SMS validation failed: {e}"));
            return Err(e);
        }

        self.logger.info(&format!(
            "Sending SMS to {} with message: {}",
            request.phone_number,
            log_preview(&request.message)
        ));

        if let Err(e) = self.provider.is_healthy(cancel).await {
            self.logger
                .error(&format!("SMS provider health check failed: {e}"));
            return Err(e);
        }

        let mut sms = build_notification(request);
        if let Some(template_id) = request.template_id() {
            if let Err(e) = self.apply_template(&mut sms, template_id, &request.template_data) {
                self.logger
                    .error(&format!("Template application failed: {e}"));
                return Err(e);
            }
        }

        match self.provider.send_sms(cancel, &sms).await {
            Ok(response) => {
                self.logger
                    .info(&format!("SMS sent successfully with ID: {}", response.id));
                Ok(response)
            }
            Err(e) => {
                self.logger.error(&format!("SMS sending failed: {e}"));
                Err(e)
            }
        }
    }

    /// 顺序发送，单项失败记为 `Failed` 响应
    pub async fn send_bulk_sms(
        &self,
        cancel: &CancellationToken,
        request: &BulkSmsRequest,
    ) -> Result<Vec<NotificationResponse>> {
        self.logger.info(&format!(
            "Sending bulk SMS to {} recipients",
            request.recipients.len()
        ));
        if request.recipients.is_empty() {
            return Err(NotificationError::validation(
                "recipients",
                "at least one recipient is required",
            ));
        }

        let mut responses = Vec::with_capacity(request.recipients.len());
        for recipient in &request.recipients {
            let single = SmsRequest {
                phone_number: recipient.phone_number.clone(),
                country_code: recipient.country_code.clone(),
                message: request.message.clone(),
                unicode: request.unicode,
                template_id: request.template_id.clone(),
                template_data: merge_template_data(&request.template_data, &recipient.data),
                priority: request.priority,
                metadata: request.metadata.clone(),
            };

            let response = match self.send_sms(cancel, &single).await {
                Ok(response) => response,
                Err(e) => {
                    self.logger.error(&format!(
                        "Failed to send SMS to {}: {e}",
                        recipient.phone_number
                    ));
                    NotificationResponse::failed(&e)
                }
            };
            metrics::record_bulk_item("sms", response.is_sent());
            responses.push(response);
        }

        self.logger.info(&format!(
            "Bulk SMS completed: {} messages processed",
            responses.len()
        ));
        Ok(responses)
    }

    /// 预估短信费用，不支持的国家返回 NotFound
    pub fn estimate_cost(
        &self,
        message: &str,
        country_code: Option<&str>,
        unicode: bool,
    ) -> Result<SmsCostEstimate> {
        let country_code = country_code.filter(|c| !c.is_empty());
        let cost_per_segment = self.provider.sms_cost(country_code)?;
        let segments = pricing::calculate_segments(message, unicode);

        Ok(SmsCostEstimate {
            segments,
            cost_per_segment,
            total_cost: f64::from(segments) * cost_per_segment,
            unicode,
            country_code: country_code.map(str::to_string),
            message_length: message.chars().count(),
        })
    }

    pub fn sms_cost(&self, country_code: Option<&str>) -> Result<f64> {
        self.provider.sms_cost(country_code)
    }

    pub fn supported_countries(&self) -> Vec<CountryInfo> {
        self.provider.supported_countries()
    }

    pub fn list_templates(&self) -> Vec<SmsTemplate> {
        self.provider
            .templates()
            .map(|t| t.list_templates())
            .unwrap_or_default()
    }

    pub fn add_template(&self, template: SmsTemplate) -> Result<SmsTemplate> {
        let templates = self.provider.templates().ok_or_else(templates_unsupported)?;
        Ok(templates.add_template(template))
    }

    pub fn render_template(
        &self,
        template_id: &str,
        data: &HashMap<String, String>,
    ) -> Result<RenderedSmsTemplate> {
        let templates = self.provider.templates().ok_or_else(templates_unsupported)?;
        let rendered = templates.render_template(template_id, data)?;
        let segments = pricing::calculate_segments(&rendered.message, rendered.unicode);
        Ok(RenderedSmsTemplate {
            id: rendered.id,
            message: rendered.message,
            max_length: rendered.max_length,
            unicode: rendered.unicode,
            segments,
        })
    }

    pub fn validate_phone_number(&self, phone_number: &str, country_code: Option<&str>) -> Result<()> {
        self.provider.validate_phone_number(phone_number, country_code)
    }

    pub async fn provider_status(&self, cancel: &CancellationToken) -> ProviderStatus {
        ProviderStatus::probe(self.provider.as_ref(), cancel).await
    }

    fn validate_request(&self, request: &SmsRequest) -> Result<()> {
        if request.phone_number.is_empty() {
            return Err(NotificationError::validation(
                "phone_number",
                "phone number is required",
            ));
        }
        self.provider
            .validate_phone_number(&request.phone_number, request.country_code())?;

        if request.message.is_empty() {
            if request.template_id().is_none() {
                return Err(NotificationError::validation(
                    "message",
                    "SMS message is required when not using a template",
                ));
            }
            return Ok(());
        }

        let unicode = request.unicode || pricing::requires_unicode(&request.message);
        let max_length = pricing::max_message_length(unicode);
        if request.message.chars().count() > max_length {
            return Err(NotificationError::validation(
                "message",
                format!("message too long (max {max_length} characters)"),
            ));
        }
        Ok(())
    }

    fn apply_template(
        &self,
        sms: &mut SmsNotification,
        template_id: &str,
        data: &HashMap<String, String>,
    ) -> Result<()> {
        let templates = self.provider.templates().ok_or_else(templates_unsupported)?;
        let rendered = templates.render_template(template_id, data)?;

        sms.payload.unicode = rendered.unicode || pricing::requires_unicode(&rendered.message);
        sms.header.body = rendered.message.clone();
        sms.payload.message = rendered.message;
        Ok(())
    }
}

fn build_notification(request: &SmsRequest) -> SmsNotification {
    let mut metadata = request.metadata.clone();
    if let Some(country) = request.country_code() {
        metadata.insert("country_code".to_string(), country.to_string());
    }

    let header = Notification::new(
        NotificationType::Sms,
        request.phone_number.clone(),
        request.message.clone(),
    )
    .with_subject(SMS_SUBJECT)
    .with_priority(request.priority)
    .with_metadata(metadata);

    SmsNotification::new(
        header,
        SmsPayload {
            phone_number: request.phone_number.clone(),
            country_code: request.country_code().map(str::to_string),
            message: request.message.clone(),
            unicode: request.unicode || pricing::requires_unicode(&request.message),
        },
    )
}
