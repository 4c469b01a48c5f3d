//! 通知分发演示程序
//!
//! 加载配置并初始化可观测性，然后通过三个渠道服务各发送一条通知。

use std::collections::HashMap;

use anyhow::Result;
use notify_shared::config::AppConfig;
use notify_shared::logger::TracingLogger;
use notify_shared::observability;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use notification_dispatch::models::{ChannelData, NotificationRequest, NotificationType, PushData};
use notification_dispatch::service::{EmailRequest, SmsRequest};
use notification_dispatch::{EmailService, NotificationDispatcher, PushService, SmsService};

const SERVICE_NAME: &str = "notification-dispatch";
const DEMO_IOS_TOKEN: &str = "3f2a9c7e1b4d6a8f0c2e4b6d8a0f1c3e5a7b9d1f3c5e7a9b0d2f4a6c8e0b1d3f";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置，失败时使用默认值
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });

    // 2. 初始化可观测性
    let mut obs_config = config.observability.clone();
    obs_config.service_name = SERVICE_NAME.to_string();
    let _guard = observability::init(&obs_config).await?;

    info!(environment = %config.environment, "Starting notification-dispatch demo...");

    // 3. 构建渠道服务
    let logger = TracingLogger::shared(SERVICE_NAME);
    let email = EmailService::new(config.providers.email.clone(), logger.clone())?;
    let sms = SmsService::new(config.providers.sms.clone(), logger.clone())?;
    let push = PushService::new(config.providers.push.clone(), logger.clone())?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling in-flight sends");
            shutdown.cancel();
        }
    });

    // 4. 每个渠道发送一条
    let welcome = HashMap::from([
        ("user_name".to_string(), "Demo User".to_string()),
        ("user_email".to_string(), "demo@example.com".to_string()),
        ("service_name".to_string(), "Notify".to_string()),
    ]);
    match email
        .send_email(
            &cancel,
            &EmailRequest::templated("demo@example.com", "welcome", welcome),
        )
        .await
    {
        Ok(response) => info!(id = %response.id, message = %response.message, "Email sent"),
        Err(e) => error!(error = %e, "Email failed"),
    }

    match sms
        .send_sms(
            &cancel,
            &SmsRequest::new("1234567890", "Hello from the notification demo").with_country("US"),
        )
        .await
    {
        Ok(response) => info!(id = %response.id, message = %response.message, "SMS sent"),
        Err(e) => error!(error = %e, "SMS failed"),
    }

    let push_request = NotificationRequest::new(NotificationType::Push, DEMO_IOS_TOKEN, "Your order has shipped")
        .with_subject("Order update")
        .with_data(ChannelData::Push(PushData::new(DEMO_IOS_TOKEN, "ios")));
    match push.send_push(&cancel, &push_request).await {
        Ok(response) => info!(id = %response.id, message = %response.message, "Push sent"),
        Err(e) => error!(error = %e, "Push failed"),
    }

    // 5. 提供方健康状态
    let dispatcher = NotificationDispatcher::from_config(&config.providers, logger)?;
    for status in dispatcher.health_check(&cancel).await {
        info!(
            provider = %status.name,
            channel = %status.notification_type,
            healthy = status.healthy,
            "Provider status"
        );
    }

    info!("Demo finished");
    Ok(())
}
