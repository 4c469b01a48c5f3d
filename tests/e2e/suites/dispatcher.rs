//! 通用分发器路由

use std::sync::Arc;

use notification_dispatch::models::NotificationType;
use notification_dispatch::test_utils::{RecordingLogger, generic_sms_request};
use notification_dispatch::{ErrorCode, NotificationDispatcher};
use notify_shared::config::{ChannelConfig, ProvidersConfig};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_dispatcher_routes_sms_through_generic_send() {
    let logger = RecordingLogger::new();
    let dispatcher =
        NotificationDispatcher::from_config(&ProvidersConfig::default(), Arc::new(logger.clone()))
            .expect("mock providers resolve");

    let response = dispatcher
        .send_notification(
            &CancellationToken::new(),
            &generic_sms_request("1234567890", "US", "Hello world"),
        )
        .await
        .expect("routed to the SMS provider");

    assert!(response.is_sent());
    assert!(response.message.contains("$0.0075"));
    assert_eq!(logger.count("info", "sent via Mock SMS Provider"), 1);
}

#[tokio::test]
async fn test_disabled_channel_is_not_registered() {
    let config = ProvidersConfig {
        push: ChannelConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let dispatcher = NotificationDispatcher::from_config(&config, Arc::new(RecordingLogger::new()))
        .expect("mock providers resolve");

    assert!(dispatcher.get_provider(NotificationType::Sms).is_ok());
    let err = dispatcher
        .get_provider(NotificationType::Push)
        .err()
        .expect("push is disabled");
    assert_eq!(err.code(), ErrorCode::ProviderNotFound);
    assert_eq!(dispatcher.health_check(&CancellationToken::new()).await.len(), 2);
}
