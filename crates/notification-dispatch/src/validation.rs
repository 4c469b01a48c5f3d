//! 校验与格式化工具
//!
//! 纯函数：邮箱、手机号、设备令牌与通用请求结构的校验，
//! 以及手机号格式化、字符串截断/清洗、由请求生成通知头部等辅助函数。
//! 所有校验在第一个失败的字段处立即返回。

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify_shared::error::{NotificationError, Result};
use notify_shared::retry::RetryPolicy;
use regex::Regex;

use crate::models::{ChannelData, Notification, NotificationRequest, NotificationType};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{7,15}$").expect("valid phone regex"));

static HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]+$").expect("valid hex regex"));

static ANDROID_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid token regex"));

static CONTROL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f\x7f]").expect("valid control regex"));

/// 手机号校验支持的国家代码
pub const VALIDATION_COUNTRIES: [&str; 8] = ["US", "UK", "CA", "AU", "DE", "FR", "IN", "BR"];

// ---------------------------------------------------------------------------
// 标识校验
// ---------------------------------------------------------------------------

pub fn validate_email_address(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(NotificationError::validation("email", "email address is required"));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(NotificationError::validation(
            "email",
            format!("invalid email format: {email}"),
        ));
    }
    Ok(())
}

/// 去掉空格、连字符、括号、加号和点
pub fn clean_phone_number(phone_number: &str) -> String {
    phone_number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+' | '.'))
        .collect()
}

pub fn validate_phone_number(phone_number: &str, country_code: Option<&str>) -> Result<()> {
    if phone_number.is_empty() {
        return Err(NotificationError::validation(
            "phone_number",
            "phone number is required",
        ));
    }

    let clean = clean_phone_number(phone_number);
    if !DIGITS_RE.is_match(&clean) {
        return Err(NotificationError::validation(
            "phone_number",
            "phone number must contain 7-15 digits",
        ));
    }

    match country_code.filter(|c| !c.is_empty()) {
        Some(country) => validate_phone_for_country(&clean, country),
        None => Ok(()),
    }
}

/// 校验国家代码是否受支持（大小写不敏感）
pub fn validate_country_code(country_code: &str) -> Result<String> {
    let upper = country_code.to_ascii_uppercase();
    if !VALIDATION_COUNTRIES.contains(&upper.as_str()) {
        return Err(NotificationError::validation(
            "country_code",
            format!("country code not supported: {country_code}"),
        ));
    }
    Ok(upper)
}

fn validate_phone_for_country(clean: &str, country_code: &str) -> Result<()> {
    let country = validate_country_code(country_code)?;
    let len = clean.len();

    let (ok, rule) = match country.as_str() {
        "US" | "CA" => (len == 10 || len == 11, "10 or 11 digits"),
        "UK" => ((10..=11).contains(&len), "10-11 digits"),
        "AU" => ((9..=10).contains(&len), "9-10 digits"),
        "DE" => ((10..=12).contains(&len), "10-12 digits"),
        "IN" => (len == 10, "exactly 10 digits"),
        _ => (true, ""),
    };

    if !ok {
        return Err(NotificationError::validation(
            "phone_number",
            format!("{country} phone numbers must have {rule}"),
        ));
    }
    Ok(())
}

/// 通用设备令牌校验
///
/// web 令牌只要求至少 10 个字符，推送提供方在发送时会执行更严格的 50-500 范围检查。
pub fn validate_device_token(token: &str, platform: &str) -> Result<()> {
    if token.is_empty() {
        return Err(NotificationError::validation(
            "device_token",
            "device token is required",
        ));
    }

    match platform.to_ascii_lowercase().as_str() {
        "ios" => validate_ios_token(token),
        "android" => validate_android_token(token),
        "web" => {
            if token.len() < 10 {
                return Err(NotificationError::validation(
                    "device_token",
                    "web push token is too short",
                ));
            }
            Ok(())
        }
        _ => Err(NotificationError::validation(
            "platform",
            format!("unsupported platform: {platform}"),
        )),
    }
}

/// iOS 令牌：64 位十六进制
pub fn validate_ios_token(token: &str) -> Result<()> {
    if token.len() != 64 {
        return Err(NotificationError::validation(
            "device_token",
            "iOS device token must be 64 characters",
        ));
    }
    if !HEX_RE.is_match(token) {
        return Err(NotificationError::validation(
            "device_token",
            "iOS device token must be hexadecimal",
        ));
    }
    Ok(())
}

/// Android 令牌：140-255 个 `[A-Za-z0-9_-]` 字符
pub fn validate_android_token(token: &str) -> Result<()> {
    if !(140..=255).contains(&token.len()) {
        return Err(NotificationError::validation(
            "device_token",
            "Android device token must be 140-255 characters",
        ));
    }
    if !ANDROID_TOKEN_RE.is_match(token) {
        return Err(NotificationError::validation(
            "device_token",
            "Android device token contains invalid characters",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 请求校验
// ---------------------------------------------------------------------------

/// 通用请求校验，按通知类型分派到渠道规则
///
/// 类型与优先级由枚举保证合法，这里检查收件人、正文和渠道数据。
pub fn validate_notification_request(request: &NotificationRequest) -> Result<()> {
    if request.recipient.is_empty() {
        return Err(NotificationError::validation("recipient", "recipient is required"));
    }
    if request.body.is_empty() {
        return Err(NotificationError::validation("body", "body is required"));
    }

    match request.notification_type {
        NotificationType::Email => validate_email_request(request),
        NotificationType::Sms => validate_sms_request(request),
        NotificationType::Push => validate_push_request(request),
    }
}

fn validate_email_request(request: &NotificationRequest) -> Result<()> {
    validate_email_address(&request.recipient)?;

    if let Some(data) = request.email_data() {
        for email in data.to.iter().chain(&data.cc).chain(&data.bcc) {
            validate_email_address(email)?;
        }
        for email in [&data.from, &data.reply_to].into_iter().flatten() {
            if !email.is_empty() {
                validate_email_address(email)?;
            }
        }
    }
    Ok(())
}

fn validate_sms_request(request: &NotificationRequest) -> Result<()> {
    let (phone, country) = match request.sms_data() {
        Some(data) if !data.phone_number.is_empty() => {
            (data.phone_number.as_str(), data.country_code.as_deref())
        }
        Some(data) => (request.recipient.as_str(), data.country_code.as_deref()),
        None => (request.recipient.as_str(), None),
    };
    validate_phone_number(phone, country)
}

fn validate_push_request(request: &NotificationRequest) -> Result<()> {
    let Some(data) = request.push_data() else {
        return Err(NotificationError::validation(
            "push_data",
            "push data is required for push notifications",
        ));
    };
    if data.platform.is_empty() {
        return Err(NotificationError::validation("platform", "platform is required"));
    }

    let token = if data.device_token.is_empty() {
        request.recipient.as_str()
    } else {
        data.device_token.as_str()
    };
    validate_device_token(token, &data.platform)
}

/// 渠道数据与通知类型是否一致
pub fn channel_data_matches(request: &NotificationRequest) -> bool {
    matches!(
        (&request.data, request.notification_type),
        (None, _)
            | (Some(ChannelData::Email(_)), NotificationType::Email)
            | (Some(ChannelData::Sms(_)), NotificationType::Sms)
            | (Some(ChannelData::Push(_)), NotificationType::Push)
    )
}

// ---------------------------------------------------------------------------
// 辅助函数
// ---------------------------------------------------------------------------

/// 格式化为带 `+` 前缀的国际号码
pub fn format_phone_number(phone_number: &str, country_prefix: Option<&str>) -> String {
    let mut clean = clean_phone_number(phone_number);
    if let Some(prefix) = country_prefix.filter(|p| !p.is_empty()) {
        if !clean.starts_with(prefix) {
            clean = format!("{prefix}{clean}");
        }
    }
    format!("+{clean}")
}

/// 截断到 max_chars 个字符，超出时以 `...` 结尾
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// 去掉控制字符并修剪首尾空白
pub fn sanitize_string(s: &str) -> String {
    CONTROL_RE.replace_all(s, "").trim().to_string()
}

/// 下一次重试时间：base * 2^retry_count，最长 1 小时
pub fn next_retry_time(retry_count: u32, base_delay: Duration) -> DateTime<Utc> {
    RetryPolicy::exponential(base_delay).next_attempt_at(Utc::now(), retry_count)
}

/// 由通用请求生成待发送的通知头部
pub fn notification_from_request(request: &NotificationRequest) -> Notification {
    let mut notification =
        Notification::new(request.notification_type, &request.recipient, &request.body)
            .with_priority(request.priority)
            .with_metadata(request.metadata.clone());
    notification.subject = request.subject.clone();
    notification.scheduled_at = request.scheduled_at;
    if let Some(max_retries) = request.max_retries.filter(|m| *m > 0) {
        notification.max_retries = max_retries;
    }
    notification
}
