//! 通用通知分发器
//!
//! 按渠道维护提供方注册表，将通用的 `NotificationRequest` 路由到对应提供方的
//! `NotificationProvider::send`。配置了仓储时，发送前保存通知头部，发送后按结果更新状态。

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use notify_shared::config::{ChannelConfig, ProvidersConfig};
use notify_shared::error::{ErrorCode, NotificationError, Result};
use notify_shared::logger::Logger;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{
    ChannelData, Notification, NotificationRequest, NotificationResponse, NotificationStatus,
    NotificationType,
};
use crate::provider::{
    MockEmailProvider, MockPushProvider, MockSmsProvider, NotificationProvider, ProviderConfig,
};
use crate::repository::NotificationRepository;
use crate::service::ProviderStatus;
use crate::validation;

pub struct NotificationDispatcher {
    providers: HashMap<NotificationType, Arc<dyn NotificationProvider>>,
    repository: Option<Arc<dyn NotificationRepository>>,
    logger: Arc<dyn Logger>,
}

impl NotificationDispatcher {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            providers: HashMap::new(),
            repository: None,
            logger: logger.with_field("service", "dispatcher".to_string()),
        }
    }

    /// 按配置注册已启用渠道的提供方
    pub fn from_config(config: &ProvidersConfig, logger: Arc<dyn Logger>) -> Result<Self> {
        let mut dispatcher = Self::new(logger);

        let channels: [(&ChannelConfig, NotificationType); 3] = [
            (&config.email, NotificationType::Email),
            (&config.sms, NotificationType::Sms),
            (&config.push, NotificationType::Push),
        ];
        for (channel, notification_type) in channels {
            if !channel.enabled {
                continue;
            }
            crate::service::ensure_mock_provider(channel, notification_type.as_str())?;
            let provider: Arc<dyn NotificationProvider> = match notification_type {
                NotificationType::Email => Arc::new(MockEmailProvider::new(channel.clone())),
                NotificationType::Sms => Arc::new(MockSmsProvider::new(channel.clone())),
                NotificationType::Push => Arc::new(MockPushProvider::new(channel.clone())),
            };
            dispatcher.register_provider(provider);
        }
        Ok(dispatcher)
    }

    pub fn with_repository(mut self, repository: Arc<dyn NotificationRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// 注册提供方，同一渠道重复注册时替换旧的
    pub fn register_provider(&mut self, provider: Arc<dyn NotificationProvider>) {
        let notification_type = provider.notification_type();
        self.logger.info(&format!(
            "Registering {} provider: {}",
            notification_type,
            provider.config().name
        ));
        self.providers.insert(notification_type, provider);
    }

    pub fn get_provider(
        &self,
        notification_type: NotificationType,
    ) -> Result<Arc<dyn NotificationProvider>> {
        self.providers.get(&notification_type).cloned().ok_or_else(|| {
            NotificationError::new(
                ErrorCode::ProviderNotFound,
                format!("no provider registered for {notification_type}"),
            )
        })
    }

    /// 已注册提供方的配置，按渠道排序
    pub fn list_providers(&self) -> Vec<ProviderConfig> {
        let mut configs: Vec<_> = self.providers.values().map(|p| p.config()).collect();
        configs.sort_by_key(|c| c.notification_type.as_str());
        configs
    }

    #[instrument(skip_all, fields(notification_type = %request.notification_type))]
    pub async fn send_notification(
        &self,
        cancel: &CancellationToken,
        request: &NotificationRequest,
    ) -> Result<NotificationResponse> {
        validation::validate_notification_request(request)?;
        if !validation::channel_data_matches(request) {
            return Err(NotificationError::validation(
                "data",
                "channel data does not match notification type",
            ));
        }

        let provider = self.get_provider(request.notification_type)?;
        let mut notification = build_header(request);

        if let Some(repository) = &self.repository {
            repository.save(&notification).await?;
        }

        let result = provider.send(cancel, &notification).await;
        match &result {
            Ok(response) => {
                self.logger.info(&format!(
                    "Notification {} sent via {}",
                    response.id,
                    provider.config().name
                ));
                notification.transition_to(NotificationStatus::Sent)?;
            }
            Err(e) => {
                self.logger
                    .error(&format!("Notification {} failed: {e}", notification.id));
                notification.mark_failed(e.to_string())?;
            }
        }

        if let Some(repository) = &self.repository
            && let Err(e) = repository.update(&notification).await
        {
            self.logger.warn(&format!(
                "Failed to persist status of notification {}: {e}",
                notification.id
            ));
        }
        result
    }

    /// 并发检查所有提供方
    pub async fn health_check(&self, cancel: &CancellationToken) -> Vec<ProviderStatus> {
        let checks = self
            .providers
            .values()
            .map(|provider| ProviderStatus::probe(provider.as_ref(), cancel));

        let mut statuses = join_all(checks).await;
        for status in &statuses {
            if let Some(error) = &status.error {
                self.logger
                    .warn(&format!("Provider {} unhealthy: {error}", status.name));
            }
        }
        statuses.sort_by_key(|s| s.notification_type.as_str());
        statuses
    }

    pub async fn get_notification_status(&self, id: Uuid) -> Result<Notification> {
        let repository = self.repository.as_ref().ok_or_else(|| {
            NotificationError::new(
                ErrorCode::InvalidRequest,
                "notification repository not configured",
            )
        })?;

        repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| NotificationError::not_found(format!("notification not found: {id}")))
    }
}

/// 通用请求转为通知头部，渠道数据中提供方需要的字段写入 metadata
fn build_header(request: &NotificationRequest) -> Notification {
    let mut notification = validation::notification_from_request(request);
    let metadata = &mut notification.metadata;

    match &request.data {
        Some(ChannelData::Sms(data)) => {
            if !data.phone_number.is_empty() {
                notification.recipient = data.phone_number.clone();
            }
            if let Some(country) = data.country_code.as_deref().filter(|c| !c.is_empty()) {
                metadata.insert("country_code".to_string(), country.to_string());
            }
        }
        Some(ChannelData::Push(data)) => {
            metadata.insert("platform".to_string(), data.platform.to_ascii_lowercase());
            if !data.device_token.is_empty() {
                metadata.insert("device_token".to_string(), data.device_token.clone());
            }
        }
        Some(ChannelData::Email(_)) | None => {}
    }
    notification
}
