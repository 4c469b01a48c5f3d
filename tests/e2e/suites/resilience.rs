//! 提供方不健康与取消

use std::time::{Duration, Instant};

use notification_dispatch::test_utils::{email_request, ios_token, push_request, sms_request};
use notification_dispatch::ErrorCode;
use tokio_util::sync::CancellationToken;

use crate::setup::TestEnvironment;

#[tokio::test]
async fn test_unhealthy_providers_short_circuit() {
    let env = TestEnvironment::setup();
    env.email_provider.set_healthy(false);
    env.sms_provider.set_healthy(false);
    env.push_provider.set_healthy(false);
    let cancel = CancellationToken::new();
    let fast = Duration::from_millis(20);

    let start = Instant::now();
    let err = env
        .email
        .send_email(&cancel, &email_request("user@example.com"))
        .await
        .unwrap_err();
    assert!(start.elapsed() < fast);
    assert_eq!(err.code(), ErrorCode::ProviderUnavailable);

    let start = Instant::now();
    let err = env
        .sms
        .send_sms(&cancel, &sms_request("1234567890", None, "hi"))
        .await
        .unwrap_err();
    assert!(start.elapsed() < fast);
    assert_eq!(err.code(), ErrorCode::ProviderUnavailable);

    let token = ios_token();
    let start = Instant::now();
    let err = env
        .push
        .send_push(&cancel, &push_request(&token, "ios", "t", "b"))
        .await
        .unwrap_err();
    assert!(start.elapsed() < fast);
    assert_eq!(err.code(), ErrorCode::ProviderUnavailable);

    let start = Instant::now();
    let err = env.push.health_check(&cancel).await.unwrap_err();
    assert!(start.elapsed() < fast);
    assert_eq!(err.code(), ErrorCode::ProviderUnavailable);

    assert!(env.email_provider.sent_emails().is_empty());
    assert!(env.sms_provider.sent_sms().is_empty());
    assert!(env.push_provider.sent_pushes().is_empty());
    assert_eq!(env.logger.count("error", "health check failed"), 3);
}

#[tokio::test]
async fn test_recovery_after_marking_healthy() {
    let env = TestEnvironment::setup();
    let cancel = CancellationToken::new();
    env.sms_provider.set_healthy(false);
    assert!(
        !env.sms.provider_status(&cancel).await.healthy,
        "status reflects the unhealthy flag"
    );

    env.sms_provider.set_healthy(true);
    env.sms
        .send_sms(&cancel, &sms_request("1234567890", None, "back online"))
        .await
        .expect("provider recovered");
    assert_eq!(env.sms_provider.sent_sms().len(), 1);
}

#[tokio::test]
async fn test_cancellation_yields_timeout_without_side_effects() {
    let env = TestEnvironment::setup();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = env
        .sms
        .send_sms(&cancel, &sms_request("1234567890", Some("US"), "Hello world"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(err.is_retryable());

    let token = ios_token();
    let err = env
        .push
        .send_push(&cancel, &push_request(&token, "ios", "t", "b"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);

    assert!(env.sms_provider.sent_sms().is_empty());
    assert!(env.push_provider.sent_pushes().is_empty());
}

#[tokio::test]
async fn test_cancellation_during_send() {
    let env = TestEnvironment::setup();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    // 健康检查约 75ms，发送约 150ms；在发送阶段取消
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        trigger.cancel();
    });

    let err = env
        .sms
        .send_sms(&cancel, &sms_request("1234567890", None, "slow"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(env.sms_provider.sent_sms().is_empty());
}
