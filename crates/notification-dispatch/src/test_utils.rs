//! 测试工具模块
//!
//! 设备令牌与请求生成器，以及记录日志内容的 `RecordingLogger`，
//! 供单元测试、集成测试与基准测试共用。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use notify_shared::logger::Logger;
use parking_lot::Mutex;
use rand::Rng;

use crate::models::{ChannelData, NotificationRequest, NotificationType, PushData, SmsData};
use crate::service::{EmailRequest, SmsRequest};

// ==================== 令牌生成 ====================

/// 64 位十六进制 iOS 令牌
pub fn ios_token() -> String {
    let mut rng = rand::rng();
    (0..64)
        .map(|_| char::from_digit(rng.random_range(0..16), 16).unwrap_or('0'))
        .collect()
}

/// 指定长度的 Android 令牌（合法长度为 140-255）
pub fn android_token(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// 满足提供方 50-500 字符要求的 web 令牌
pub fn web_token() -> String {
    format!("https://push.example.com/subscription/{}", android_token(40))
}

/// 互不相同的测试手机号
pub fn test_phone_number() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("555{:07}", COUNTER.fetch_add(1, Ordering::SeqCst) % 10_000_000)
}

// ==================== 请求构造 ====================

pub fn email_request(to: &str) -> EmailRequest {
    EmailRequest::new(to, "Test subject", "Test body")
}

pub fn sms_request(phone: &str, country: Option<&str>, message: &str) -> SmsRequest {
    let request = SmsRequest::new(phone, message);
    match country {
        Some(country) => request.with_country(country),
        None => request,
    }
}

/// 携带 `PushData` 的推送请求
pub fn push_request(token: &str, platform: &str, title: &str, body: &str) -> NotificationRequest {
    NotificationRequest::new(NotificationType::Push, token, body)
        .with_subject(title)
        .with_data(ChannelData::Push(PushData::new(token, platform)))
}

/// 携带 `SmsData` 的通用请求
pub fn generic_sms_request(phone: &str, country: &str, body: &str) -> NotificationRequest {
    NotificationRequest::new(NotificationType::Sms, phone, body).with_data(ChannelData::Sms(
        SmsData {
            phone_number: phone.to_string(),
            country_code: Some(country.to_string()),
            unicode: false,
        },
    ))
}

// ==================== RecordingLogger ====================

/// 一条已记录的日志
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: &'static str,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// 记录所有日志的 logger，派生出的 logger 共享同一份记录
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    fields: HashMap<String, String>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// 指定级别下包含给定片段的日志条数
    pub fn count(&self, level: &str, fragment: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == level && e.message.contains(fragment))
            .count()
    }

    fn record(&self, level: &'static str, message: &str) {
        self.entries.lock().push(LogEntry {
            level,
            message: message.to_string(),
            fields: self.fields.clone(),
        });
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str) {
        self.record("debug", message);
    }

    fn info(&self, message: &str) {
        self.record("info", message);
    }

    fn warn(&self, message: &str) {
        self.record("warn", message);
    }

    fn error(&self, message: &str) {
        self.record("error", message);
    }

    fn with_field(&self, key: &str, value: String) -> Arc<dyn Logger> {
        self.with_fields(vec![(key, value)])
    }

    fn with_fields(&self, fields: Vec<(&str, String)>) -> Arc<dyn Logger> {
        let mut derived = self.clone();
        for (key, value) in fields {
            derived.fields.insert(key.to_string(), value);
        }
        Arc::new(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation;

    #[test]
    fn test_generated_tokens_are_valid() {
        assert!(validation::validate_ios_token(&ios_token()).is_ok());
        assert!(validation::validate_android_token(&android_token(140)).is_ok());
        assert!(validation::validate_android_token(&android_token(139)).is_err());
        let web = web_token();
        assert!((50..=500).contains(&web.len()));
    }

    #[test]
    fn test_recording_logger_shares_entries() {
        let logger = RecordingLogger::new();
        let derived = logger.with_field("service", "sms".to_string());
        derived.info("hello");
        logger.error("boom");

        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].fields.get("service").map(String::as_str), Some("sms"));
        assert_eq!(logger.count("error", "boom"), 1);
    }
}
