//! 可观测性与共享基础设施集成测试
//!
//! 测试 metrics 记录函数、结构化 logger 与重试退避在 crate 外部的使用方式。

use std::time::Duration;

// ============================================================================
// 指标记录测试
// ============================================================================

mod metrics_tests {
    use notify_shared::observability::metrics::{
        describe_metrics, record_bulk_item, record_health_check, record_send,
        record_sms_segments,
    };

    #[test]
    fn test_record_send_outcomes() {
        describe_metrics();
        for channel in ["email", "sms", "push"] {
            record_send(channel, "sent", 0.1);
            record_send(channel, "rejected", 0.001);
            record_send(channel, "timeout", 0.05);
        }
    }

    #[test]
    fn test_record_channel_counters() {
        record_bulk_item("email", true);
        record_bulk_item("sms", false);
        record_health_check("push", true);
        record_health_check("push", false);
        record_sms_segments("US", 1);
        record_sms_segments("unknown", 10);
    }
}

// ============================================================================
// Logger 测试
// ============================================================================

mod logger_tests {
    use notify_shared::logger::{Logger, TracingLogger};

    #[test]
    fn test_derived_loggers_are_usable() {
        let logger = TracingLogger::shared("integration");
        let derived = logger
            .with_field("service", "sms".to_string())
            .with_fields(vec![("platform", "ios".to_string()), ("attempt", "1".to_string())]);

        derived.debug("debug message");
        derived.info("info message");
        derived.warn("warn message");
        derived.error("error message");
    }
}

// ============================================================================
// 配置与错误测试
// ============================================================================

mod config_tests {
    use notify_shared::config::{AppConfig, ChannelConfig};
    use notify_shared::error::{ErrorCode, NotificationError};

    #[test]
    fn test_load_without_files_uses_defaults() {
        // SAFETY: 测试进程内仅此处修改该变量
        unsafe { std::env::set_var("CONFIG_DIR", "/nonexistent-config-dir") };
        let config = AppConfig::load("notification-dispatch").expect("defaults load");
        assert_eq!(config.service_name, "notification-dispatch");
        assert_eq!(config.providers.email.provider, "mock");
        assert!(config.providers.push.enabled);
    }

    #[test]
    fn test_channel_config_provider_override() {
        let config = ChannelConfig::with_provider("sendgrid");
        assert_eq!(config.provider, "sendgrid");
        assert!(config.enabled);
    }

    #[test]
    fn test_error_display_and_status() {
        let err = NotificationError::provider("mock-sms", ErrorCode::ProviderUnavailable, "down");
        assert_eq!(err.to_string(), "PROVIDER_UNAVAILABLE: down - Provider: mock-sms");
        assert_eq!(err.http_status(), 503);
        assert!(err.is_retryable());

        let err = NotificationError::validation("phone_number", "phone number is required");
        assert_eq!(err.field(), Some("phone_number"));
        assert_eq!(err.http_status(), 400);
        assert!(!err.is_retryable());
    }
}

// ============================================================================
// 重试退避测试
// ============================================================================

#[test]
fn test_retry_backoff_is_capped() {
    use notify_shared::retry::RetryPolicy;

    let policy = RetryPolicy::exponential(Duration::from_secs(60));
    assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(60));
    assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(120));
    assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(3600));
    assert!(policy.should_retry(2));
    assert!(!policy.should_retry(3));
}
