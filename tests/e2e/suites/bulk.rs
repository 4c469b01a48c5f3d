//! 批量发送：单项失败不影响其他项

use std::collections::HashMap;

use notification_dispatch::models::NotificationStatus;
use notification_dispatch::service::{
    BulkEmailRecipient, BulkEmailRequest, BulkSmsRecipient, BulkSmsRequest,
};
use notification_dispatch::test_utils::{ios_token, push_request};
use notification_dispatch::ErrorCode;
use tokio_util::sync::CancellationToken;

use crate::setup::TestEnvironment;

#[tokio::test]
async fn test_bulk_email_bad_middle_recipient() {
    let env = TestEnvironment::setup();
    let request = BulkEmailRequest {
        recipients: ["first@example.com", "invalid-email", "third@example.com"]
            .into_iter()
            .map(|email| BulkEmailRecipient {
                email: email.to_string(),
                data: HashMap::new(),
            })
            .collect(),
        subject: Some("Weekly digest".to_string()),
        text_body: Some("Here is what happened".to_string()),
        ..Default::default()
    };

    let responses = env
        .email
        .send_bulk_email(&CancellationToken::new(), &request)
        .await
        .expect("bulk email returns per-item results");

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].status, NotificationStatus::Sent);
    assert_eq!(responses[1].status, NotificationStatus::Failed);
    assert!(responses[1].error.is_some());
    assert_eq!(responses[2].status, NotificationStatus::Sent);
    assert_eq!(env.email_provider.sent_emails().len(), 2);
}

#[tokio::test]
async fn test_bulk_sms_bad_middle_recipient() {
    let env = TestEnvironment::setup();
    let recipient = |phone: &str| BulkSmsRecipient {
        phone_number: phone.to_string(),
        country_code: Some("US".to_string()),
        data: HashMap::new(),
    };
    let request = BulkSmsRequest {
        recipients: vec![recipient("1234567890"), recipient("12"), recipient("5551234567")],
        message: "Service window tonight".to_string(),
        ..Default::default()
    };

    let responses = env
        .sms
        .send_bulk_sms(&CancellationToken::new(), &request)
        .await
        .expect("bulk SMS returns per-item results");

    let statuses: Vec<_> = responses.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [
            NotificationStatus::Sent,
            NotificationStatus::Failed,
            NotificationStatus::Sent
        ]
    );
    assert_ne!(responses[1].id, responses[0].id);
}

#[tokio::test]
async fn test_bulk_push_reports_aggregate_error() {
    let env = TestEnvironment::setup();
    let good = ios_token();
    let requests = vec![
        push_request(&good, "ios", "one", "first"),
        push_request("not-a-token", "ios", "two", "second"),
        push_request(&good, "ios", "three", "third"),
    ];

    let report = env
        .push
        .send_bulk_push(&CancellationToken::new(), &requests)
        .await
        .expect("bulk push returns a report");

    assert_eq!(report.responses.len(), 3);
    assert_eq!(report.responses[1].status, NotificationStatus::Failed);
    assert!(!report.is_success());

    let err = report.aggregate_error().expect("one item failed");
    assert_eq!(err.code(), ErrorCode::NotificationFailed);
    assert!(err.to_string().contains("1 failed"));
    assert_eq!(env.push_provider.sent_pushes().len(), 2);
}

#[tokio::test]
async fn test_bulk_rejects_empty_lists() {
    let env = TestEnvironment::setup();
    let cancel = CancellationToken::new();

    let err = env
        .email
        .send_bulk_email(&cancel, &BulkEmailRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("recipients"));

    let err = env.push.send_bulk_push(&cancel, &[]).await.unwrap_err();
    assert_eq!(err.field(), Some("requests"));
}
