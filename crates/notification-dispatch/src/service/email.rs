//! 邮件服务

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
    EmailAttachment, EmailNotification, EmailPayload, Notification, NotificationResponse,
    NotificationType, Priority,
};
use crate::provider::email::DEFAULT_SENDER;
use crate::provider::{EmailProvider, MockEmailProvider};
use crate::template::{EmailTemplate, merge_template_data};

/// 单封邮件请求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailRequest {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub attachments: Vec<EmailAttachment>,
    pub headers: HashMap<String, String>,
    pub template_id: Option<String>,
    pub template_data: HashMap<String, String>,
    pub priority: Priority,
    pub metadata: HashMap<String, String>,
}

impl EmailRequest {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, text_body: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            subject: Some(subject.into()),
            text_body: Some(text_body.into()),
            ..Default::default()
        }
    }

    /// 使用模板的请求
    pub fn templated(
        to: impl Into<String>,
        template_id: impl Into<String>,
        template_data: HashMap<String, String>,
    ) -> Self {
        Self {
            to: vec![to.into()],
            template_id: Some(template_id.into()),
            template_data,
            ..Default::default()
        }
    }

    fn template_id(&self) -> Option<&str> {
        self.template_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkEmailRecipient {
    pub email: String,
    pub data: HashMap<String, String>,
}

/// 批量邮件请求：内容共享，收件人各自携带模板数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkEmailRequest {
    pub recipients: Vec<BulkEmailRecipient>,
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub headers: HashMap<String, String>,
    pub template_id: Option<String>,
    pub template_data: HashMap<String, String>,
    pub priority: Priority,
    pub metadata: HashMap<String, String>,
}

/// 渲染后的邮件模板
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedEmailTemplate {
    pub id: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

pub struct EmailService {
    provider: Arc<dyn EmailProvider>,
    config: ChannelConfig,
    logger: Arc<dyn Logger>,
}

impl EmailService {
    /// 由渠道配置创建服务，目前只支持 "mock" 提供方
    pub fn new(config: ChannelConfig, logger: Arc<dyn Logger>) -> Result<Self> {
        ensure_mock_provider(&config, "email")?;
        let provider = Arc::new(MockEmailProvider::new(config.clone()));
        Ok(Self::with_provider(config, provider, logger))
    }

    /// 使用已构建的提供方
    pub fn with_provider(
        config: ChannelConfig,
        provider: Arc<dyn EmailProvider>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            provider,
            config,
            logger: logger.with_field("service", "email".to_string()),
        }
    }

    pub async fn send_email(
        &self,
        cancel: &CancellationToken,
        request: &EmailRequest,
    ) -> Result<NotificationResponse> {
        if let Err(e) = self.validate_request(request) {
            self.logger.error(&format!("Email validation failed: {e}"));
            return Err(e);
        }

        self.logger.info(&format!(
            "Sending email to {} recipients with subject: {}",
            request.to.len(),
            log_preview(request.subject.as_deref().unwrap_or_default())
        ));

        if let Err(e) = self.provider.is_healthy(cancel).await {
            self.logger
                .error(&format!("Email provider health check failed: {e}"));
            return Err(e);
        }

        let mut email = self.build_notification(request);
        if let Some(template_id) = request.template_id() {
            if let Err(e) = self.apply_template(&mut email, template_id, &request.template_data) {
                self.logger
                    .error(&format!("Template application failed: {e}"));
                return Err(e);
            }
        }

        match self.provider.send_email(cancel, &email).await {
            Ok(response) => {
                self.logger
                    .info(&format!("Email sent successfully with ID: {}", response.id));
                Ok(response)
            }
            Err(e) => {
                self.logger.error(&format!("Email sending failed: {e}"));
                Err(e)
            }
        }
    }

    /// 顺序发送，单项失败记为 `Failed` 响应，不返回聚合错误
    pub async fn send_bulk_email(
        &self,
        cancel: &CancellationToken,
        request: &BulkEmailRequest,
    ) -> Result<Vec<NotificationResponse>> {
        self.logger.info(&format!(
            "Sending bulk email to {} recipients",
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
            let single = EmailRequest {
                to: vec![recipient.email.clone()],
                from: request.from.clone(),
                reply_to: request.reply_to.clone(),
                subject: request.subject.clone(),
                html_body: request.html_body.clone(),
                text_body: request.text_body.clone(),
                headers: request.headers.clone(),
                template_id: request.template_id.clone(),
                template_data: merge_template_data(&request.template_data, &recipient.data),
                priority: request.priority,
                metadata: request.metadata.clone(),
                ..Default::default()
            };

            let response = match self.send_email(cancel, &single).await {
                Ok(response) => response,
                Err(e) => {
                    self.logger.error(&format!(
                        "Failed to send email to {}: {e}",
                        recipient.email
                    ));
                    NotificationResponse::failed(&e)
                }
            };
            metrics::record_bulk_item("email", response.is_sent());
            responses.push(response);
        }

        self.logger.info(&format!(
            "Bulk email completed: {} emails processed",
            responses.len()
        ));
        Ok(responses)
    }

    pub fn list_templates(&self) -> Vec<EmailTemplate> {
        self.provider
            .templates()
            .map(|t| t.list_templates())
            .unwrap_or_default()
    }

    pub fn add_template(&self, template: EmailTemplate) -> Result<EmailTemplate> {
        let templates = self.provider.templates().ok_or_else(templates_unsupported)?;
        Ok(templates.add_template(template))
    }

    pub fn render_template(
        &self,
        template_id: &str,
        data: &HashMap<String, String>,
    ) -> Result<RenderedEmailTemplate> {
        let templates = self.provider.templates().ok_or_else(templates_unsupported)?;
        let rendered = templates.render_template(template_id, data)?;
        Ok(RenderedEmailTemplate {
            id: rendered.id,
            subject: rendered.subject,
            html_body: rendered.html_body,
            text_body: rendered.text_body,
        })
    }

    pub fn validate_email_address(&self, email: &str) -> Result<()> {
        self.provider.validate_email_address(email)
    }

    pub async fn provider_status(&self, cancel: &CancellationToken) -> ProviderStatus {
        ProviderStatus::probe(self.provider.as_ref(), cancel).await
    }

    fn validate_request(&self, request: &EmailRequest) -> Result<()> {
        if request.to.is_empty() {
            return Err(NotificationError::validation(
                "to",
                "at least one recipient is required",
            ));
        }
        for (field, addresses) in [("to", &request.to), ("cc", &request.cc), ("bcc", &request.bcc)]
        {
            for address in addresses {
                if self.provider.validate_email_address(address).is_err() {
                    return Err(NotificationError::validation(
                        field,
                        format!("invalid email address: {address}"),
                    ));
                }
            }
        }

        if let Some(from) = request.from.as_deref().filter(|s| !s.is_empty())
            && self.provider.validate_email_address(from).is_err()
        {
            return Err(NotificationError::validation(
                "from",
                "invalid sender email address",
            ));
        }
        if let Some(reply_to) = request.reply_to.as_deref().filter(|s| !s.is_empty())
            && self.provider.validate_email_address(reply_to).is_err()
        {
            return Err(NotificationError::validation(
                "reply_to",
                "invalid reply-to email address",
            ));
        }

        let templated = request.template_id().is_some();
        if request.subject.as_deref().is_none_or(str::is_empty) && !templated {
            return Err(NotificationError::validation(
                "subject",
                "email subject is required when not using a template",
            ));
        }
        let has_html = request.html_body.as_deref().is_some_and(|b| !b.is_empty());
        let has_text = request.text_body.as_deref().is_some_and(|b| !b.is_empty());
        if !has_html && !has_text && !templated {
            return Err(NotificationError::validation(
                "body",
                "email must have either HTML body, text body, or template",
            ));
        }
        Ok(())
    }

    fn default_sender(&self) -> String {
        self.config
            .setting("default_sender")
            .unwrap_or(DEFAULT_SENDER)
            .to_string()
    }

    fn build_notification(&self, request: &EmailRequest) -> EmailNotification {
        let mut header = Notification::new(
            NotificationType::Email,
            request.to[0].clone(),
            request.text_body.clone().unwrap_or_default(),
        )
        .with_priority(request.priority)
        .with_metadata(request.metadata.clone());
        header.subject = request.subject.clone();

        let from = request
            .from
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| self.default_sender());

        EmailNotification::new(
            header,
            EmailPayload {
                to: request.to.clone(),
                cc: request.cc.clone(),
                bcc: request.bcc.clone(),
                from: Some(from),
                reply_to: request.reply_to.clone(),
                html_body: request.html_body.clone(),
                text_body: request.text_body.clone(),
                attachments: request.attachments.clone(),
                headers: request.headers.clone(),
            },
        )
    }

    fn apply_template(
        &self,
        email: &mut EmailNotification,
        template_id: &str,
        data: &HashMap<String, String>,
    ) -> Result<()> {
        let templates = self.provider.templates().ok_or_else(templates_unsupported)?;
        let rendered = templates.render_template(template_id, data)?;

        email.header.subject = Some(rendered.subject);
        email.header.body = rendered.text_body.clone();
        email.payload.html_body = Some(rendered.html_body);
        email.payload.text_body = Some(rendered.text_body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationStatus;
    use notify_shared::error::ErrorCode;
    use notify_shared::logger::TracingLogger;

    fn service() -> (EmailService, Arc<MockEmailProvider>) {
        let provider = Arc::new(MockEmailProvider::new(ChannelConfig::default()));
        let service = EmailService::with_provider(
            ChannelConfig::default(),
            provider.clone(),
            TracingLogger::shared("email-test"),
        );
        (service, provider)
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = EmailService::new(
            ChannelConfig::with_provider("smtp"),
            TracingLogger::shared("email-test"),
        );
        let err = result.err().unwrap();
        assert_eq!(err.code(), ErrorCode::ProviderNotFound);
    }

    #[tokio::test]
    async fn test_send_plain_email() {
        let (service, provider) = service();
        let cancel = CancellationToken::new();

        let response = service
            .send_email(&cancel, &EmailRequest::new("user@example.com", "Hi", "Hello there"))
            .await
            .unwrap();
        assert_eq!(response.status, NotificationStatus::Sent);

        let sent = provider.sent_emails();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, DEFAULT_SENDER);
        assert_eq!(sent[0].subject, "Hi");
    }

    #[tokio::test]
    async fn test_templated_email_overwrites_content() {
        let (service, provider) = service();
        let cancel = CancellationToken::new();
        let data = HashMap::from([
            ("user_name".to_string(), "Ana".to_string()),
            ("service_name".to_string(), "Acme".to_string()),
            ("user_email".to_string(), "ana@example.com".to_string()),
        ]);

        service
            .send_email(
                &cancel,
                &EmailRequest::templated("ana@example.com", "welcome", data),
            )
            .await
            .unwrap();

        let sent = provider.sent_emails();
        assert_eq!(sent[0].subject, "Welcome to Acme, Ana!");
        assert!(sent[0].text_body.as_deref().unwrap().contains("ana@example.com"));
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let (service, _) = service();
        let err = service
            .send_email(
                &CancellationToken::new(),
                &EmailRequest::templated("a@example.com", "nope", HashMap::new()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TemplateNotFound);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let (service, provider) = service();
        let cancel = CancellationToken::new();

        let mut request = EmailRequest::new("user@example.com", "", "body");
        let err = service.send_email(&cancel, &request).await.unwrap_err();
        assert_eq!(err.field(), Some("subject"));

        request.subject = Some("Subject".to_string());
        request.text_body = None;
        let err = service.send_email(&cancel, &request).await.unwrap_err();
        assert_eq!(err.field(), Some("body"));

        request.text_body = Some("body".to_string());
        request.reply_to = Some("not-an-address".to_string());
        let err = service.send_email(&cancel, &request).await.unwrap_err();
        assert_eq!(err.field(), Some("reply_to"));

        assert!(provider.sent_emails().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_partial_failure() {
        let (service, provider) = service();
        let cancel = CancellationToken::new();
        let request = BulkEmailRequest {
            recipients: ["one@example.com", "invalid-email", "three@example.com"]
                .into_iter()
                .map(|email| BulkEmailRecipient {
                    email: email.to_string(),
                    data: HashMap::new(),
                })
                .collect(),
            subject: Some("Update".to_string()),
            text_body: Some("News".to_string()),
            ..Default::default()
        };

        let responses = service.send_bulk_email(&cancel, &request).await.unwrap();
        assert_eq!(responses.len(), 3);
        assert!(responses[0].is_sent());
        assert_eq!(responses[1].status, NotificationStatus::Failed);
        assert!(responses[1].error.is_some());
        assert!(responses[2].is_sent());
        assert_eq!(provider.sent_emails().len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_requires_recipients() {
        let (service, _) = service();
        let err = service
            .send_bulk_email(&CancellationToken::new(), &BulkEmailRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("recipients"));
    }

    #[test]
    fn test_render_template_leaves_unknown_placeholders() {
        let (service, _) = service();
        let rendered = service
            .render_template(
                "notification",
                &HashMap::from([("notification_title".to_string(), "Heads up".to_string())]),
            )
            .unwrap();
        assert_eq!(rendered.subject, "Heads up");
        assert!(rendered.text_body.contains("{{notification_message}}"));
        assert_eq!(service.list_templates().len(), 3);
    }
}
