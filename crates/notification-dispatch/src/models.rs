//! 通知数据模型
//!
//! `Notification` 是所有渠道共享的头部实体；渠道通知由头部加渠道载荷组成
//! （`Envelope<EmailPayload>` 等），请求侧使用 `ChannelData` 标签联合携带渠道数据。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use notify_shared::error::{ErrorCode, NotificationError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 未指定时的最大重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// 枚举
// ---------------------------------------------------------------------------

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Email,
    Sms,
    Push,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "push" => Ok(Self::Push),
            other => Err(NotificationError::validation(
                "type",
                format!("unsupported notification type: {other}"),
            )),
        }
    }
}

/// 通知状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Retrying,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通知优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(NotificationError::validation(
                "priority",
                format!("invalid priority: {other}"),
            )),
        }
    }
}

/// 推送平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Ios, Platform::Android, Platform::Web];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = NotificationError;

    /// 大小写不敏感
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            "web" => Ok(Self::Web),
            _ => Err(NotificationError::validation(
                "platform",
                format!("unsupported platform: {s}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// 通知头部
// ---------------------------------------------------------------------------

/// 通知头部实体
///
/// 状态机：delivered 为终态；failed 仅在 retry_count < max_retries 时可转入 retrying；
/// 任何状态都不能回到 pending。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub status: NotificationStatus,
    pub priority: Priority,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Notification {
    /// 新建待发送通知
    pub fn new(
        notification_type: NotificationType,
        recipient: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            notification_type,
            status: NotificationStatus::Pending,
            priority: Priority::Normal,
            recipient: recipient.into(),
            subject: None,
            body: body.into(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            sent_at: None,
            delivered_at: None,
            failed_at: None,
            error_message: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn subject_str(&self) -> &str {
        self.subject.as_deref().unwrap_or_default()
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// 状态迁移，非法迁移返回 InvalidNotification
    pub fn transition_to(&mut self, next: NotificationStatus) -> Result<()> {
        use NotificationStatus::*;

        let allowed = match (self.status, next) {
            (Delivered, _) => false,
            (Failed, Retrying) => self.retry_count < self.max_retries,
            (Failed, _) => false,
            (_, Retrying) | (_, Pending) => false,
            _ => true,
        };

        if !allowed {
            return Err(NotificationError::new(
                ErrorCode::InvalidNotification,
                format!("illegal status transition: {} -> {}", self.status, next),
            ));
        }

        let now = Utc::now();
        match next {
            Sent => self.sent_at = Some(now),
            Delivered => self.delivered_at = Some(now),
            Failed => self.failed_at = Some(now),
            Retrying => self.retry_count += 1,
            Pending => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// 标记失败并记录错误信息
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition_to(NotificationStatus::Failed)?;
        self.error_message = Some(error.into());
        Ok(())
    }

    pub fn should_retry(&self) -> bool {
        self.status == NotificationStatus::Failed && self.retry_count < self.max_retries
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled_at.is_some_and(|at| at > Utc::now())
    }
}

/// 头部 + 渠道载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    #[serde(flatten)]
    pub header: Notification,
    #[serde(flatten)]
    pub payload: P,
}

impl<P> Envelope<P> {
    pub fn new(header: Notification, payload: P) -> Self {
        Self { header, payload }
    }

    pub fn id(&self) -> Uuid {
        self.header.id
    }
}

pub type EmailNotification = Envelope<EmailPayload>;
pub type SmsNotification = Envelope<SmsPayload>;
pub type PushNotification = Envelope<PushPayload>;

// ---------------------------------------------------------------------------
// 渠道载荷
// ---------------------------------------------------------------------------

/// 邮件附件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAttachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: String,
    pub size: u64,
}

impl EmailAttachment {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            size: content.len() as u64,
            content,
            content_type: content_type.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<EmailAttachment>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl EmailPayload {
    /// 收件人总数（to + cc + bcc）
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmsPayload {
    pub phone_number: String,
    pub country_code: Option<String>,
    pub message: String,
    pub unicode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    pub device_token: String,
    pub platform: Platform,
    pub title: String,
    pub message: String,
    pub icon: Option<String>,
    pub badge: u32,
    pub sound: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, String>,
    pub image_url: Option<String>,
    pub click_action: Option<String>,
}

impl PushPayload {
    pub fn new(device_token: impl Into<String>, platform: Platform) -> Self {
        Self {
            device_token: device_token.into(),
            platform,
            title: String::new(),
            message: String::new(),
            icon: None,
            badge: 0,
            sound: None,
            data: HashMap::new(),
            image_url: None,
            click_action: None,
        }
    }
}

// ---------------------------------------------------------------------------
// 请求 / 响应
// ---------------------------------------------------------------------------

/// 通用通知请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub priority: Priority,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub max_retries: Option<u32>,
    pub data: Option<ChannelData>,
}

impl NotificationRequest {
    pub fn new(
        notification_type: NotificationType,
        recipient: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            priority: Priority::Normal,
            recipient: recipient.into(),
            subject: None,
            body: body.into(),
            metadata: HashMap::new(),
            scheduled_at: None,
            max_retries: None,
            data: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_data(mut self, data: ChannelData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn email_data(&self) -> Option<&EmailData> {
        match &self.data {
            Some(ChannelData::Email(data)) => Some(data),
            _ => None,
        }
    }

    pub fn sms_data(&self) -> Option<&SmsData> {
        match &self.data {
            Some(ChannelData::Sms(data)) => Some(data),
            _ => None,
        }
    }

    pub fn push_data(&self) -> Option<&PushData> {
        match &self.data {
            Some(ChannelData::Push(data)) => Some(data),
            _ => None,
        }
    }
}

/// 渠道专属请求数据，一个请求最多携带一种
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ChannelData {
    Email(EmailData),
    Sms(SmsData),
    Push(PushData),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailData {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub from: Option<String>,
    pub reply_to: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub attachments: Vec<EmailAttachment>,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsData {
    pub phone_number: String,
    pub country_code: Option<String>,
    pub unicode: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushData {
    pub device_token: String,
    pub platform: String,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub badge: u32,
    pub sound: Option<String>,
    pub data: HashMap<String, String>,
    pub image_url: Option<String>,
    pub click_action: Option<String>,
    pub template_id: Option<String>,
    pub template_data: HashMap<String, String>,
}

impl PushData {
    pub fn new(device_token: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            device_token: device_token.into(),
            platform: platform.into(),
            ..Default::default()
        }
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub status: NotificationStatus,
    pub message: String,
    pub provider_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl NotificationResponse {
    /// 成功发送
    pub fn sent(id: Uuid, message: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            id,
            status: NotificationStatus::Sent,
            message: message.into(),
            provider_id: Some(provider_id.into()),
            sent_at: Some(Utc::now()),
            error: None,
        }
    }

    /// 批量发送中单项失败时的合成结果，使用新 ID
    pub fn failed(error: &NotificationError) -> Self {
        Self {
            id: Uuid::now_v7(),
            status: NotificationStatus::Failed,
            message: String::new(),
            provider_id: None,
            sent_at: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == NotificationStatus::Sent
    }
}

/// 投递状态报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub notification_id: Uuid,
    pub status: NotificationStatus,
    pub details: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub provider_data: HashMap<String, String>,
}
