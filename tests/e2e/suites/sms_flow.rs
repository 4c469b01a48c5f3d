//! 短信发送全流程

use notification_dispatch::models::NotificationStatus;
use notification_dispatch::provider::SentStatus;
use notification_dispatch::test_utils::sms_request;
use tokio_util::sync::CancellationToken;

use crate::setup::TestEnvironment;

#[tokio::test]
async fn test_us_sms_end_to_end() {
    let env = TestEnvironment::setup();

    let response = env
        .sms
        .send_sms(
            &CancellationToken::new(),
            &sms_request("1234567890", Some("US"), "Hello world"),
        )
        .await
        .expect("SMS should be sent");

    assert_eq!(response.status, NotificationStatus::Sent);
    assert!(
        response
            .message
            .contains("SMS sent to 1234567890 (1 segments, $0.0075)")
    );

    let sent = env.sms_provider.sent_sms();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].segments, 1);
    assert!((sent[0].cost - 0.0075).abs() < 1e-9);
    assert_eq!(sent[0].status, SentStatus::Sent);
    assert_eq!(sent[0].country_code.as_deref(), Some("US"));
}

#[tokio::test]
async fn test_multi_segment_estimate_matches_send() {
    let env = TestEnvironment::setup();
    let message = "x".repeat(306);

    let estimate = env
        .sms
        .estimate_cost(&message, Some("UK"), false)
        .expect("UK is supported");
    assert_eq!(estimate.segments, 2);

    env.sms
        .send_sms(
            &CancellationToken::new(),
            &sms_request("07700900123", Some("UK"), &message),
        )
        .await
        .expect("SMS should be sent");

    let sent = env.sms_provider.sent_sms();
    assert_eq!(sent[0].segments, estimate.segments);
    assert!((sent[0].cost - estimate.total_cost).abs() < 1e-9);
}

#[tokio::test]
async fn test_clear_resets_audit_log() {
    let env = TestEnvironment::setup();
    env.sms
        .send_sms(
            &CancellationToken::new(),
            &sms_request("1234567890", None, "ping"),
        )
        .await
        .expect("SMS should be sent");

    assert_eq!(env.sms_provider.sent_sms().len(), 1);
    env.sms_provider.clear_sent_sms();
    assert!(env.sms_provider.sent_sms().is_empty());
}
