//! 通知模板
//!
//! 每个渠道一种模板结构，统一由 `TemplateCatalog` 管理：按 ID 存取、运行时新增、
//! 渲染时克隆模板并将 `{{key}}` 替换为传入的值，未提供的占位符保留原样。
//!
//! ```ignore
//! let catalog = TemplateCatalog::new(default_sms_templates());
//! let rendered = catalog.render("welcome_sms", &data)?;
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use notify_shared::error::{ErrorCode, NotificationError, Result};
use parking_lot::RwLock;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing;

/// 匹配 `{{key}}`，一次扫描完成替换，替换值中的占位符不会被二次展开
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("valid placeholder regex"));

/// 将模板文本中的占位符替换为对应值
pub fn render_placeholders(template: &str, data: &HashMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| match data.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// 全局数据与单个收件人数据合并，收件人数据优先
pub fn merge_template_data(
    global: &HashMap<String, String>,
    recipient: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = global.clone();
    merged.extend(recipient.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

// ---------------------------------------------------------------------------
// 模板抽象与目录
// ---------------------------------------------------------------------------

/// 可存入目录的模板
pub trait Template: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn set_timestamps(&mut self, now: DateTime<Utc>);

    /// 返回渲染后的副本
    fn rendered(&self, data: &HashMap<String, String>) -> Self;

    /// 入库前补齐默认值
    fn normalize(&mut self) {}
}

/// 模板目录
pub struct TemplateCatalog<T: Template> {
    templates: RwLock<HashMap<String, T>>,
}

impl<T: Template> TemplateCatalog<T> {
    pub fn new(seed: impl IntoIterator<Item = T>) -> Self {
        let catalog = Self {
            templates: RwLock::new(HashMap::new()),
        };
        for template in seed {
            catalog.add(template);
        }
        catalog
    }

    /// 新增或覆盖模板；ID 为空时分配新 ID，返回入库后的模板
    pub fn add(&self, mut template: T) -> T {
        if template.id().is_empty() {
            template.set_id(Uuid::now_v7().to_string());
        }
        template.set_timestamps(Utc::now());
        template.normalize();

        self.templates
            .write()
            .insert(template.id().to_string(), template.clone());
        template
    }

    pub fn get(&self, id: &str) -> Result<T> {
        self.templates.read().get(id).cloned().ok_or_else(|| {
            NotificationError::new(
                ErrorCode::TemplateNotFound,
                format!("template not found: {id}"),
            )
        })
    }

    /// 按 ID 排序的全部模板
    pub fn list(&self) -> Vec<T> {
        let mut all: Vec<T> = self.templates.read().values().cloned().collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    pub fn render(&self, id: &str, data: &HashMap<String, String>) -> Result<T> {
        Ok(self.get(id)?.rendered(data))
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// 渠道模板
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub variables: Vec<String>,
    pub category: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

impl Template for EmailTemplate {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn set_timestamps(&mut self, now: DateTime<Utc>) {
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }

    fn rendered(&self, data: &HashMap<String, String>) -> Self {
        Self {
            subject: render_placeholders(&self.subject, data),
            html_body: render_placeholders(&self.html_body, data),
            text_body: render_placeholders(&self.text_body, data),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmsTemplate {
    pub id: String,
    pub name: String,
    pub message: String,
    pub variables: Vec<String>,
    pub category: String,
    /// 0 表示按编码取默认值（160 / 70）
    pub max_length: usize,
    pub unicode: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

impl Template for SmsTemplate {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn set_timestamps(&mut self, now: DateTime<Utc>) {
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }

    fn rendered(&self, data: &HashMap<String, String>) -> Self {
        Self {
            message: render_placeholders(&self.message, data),
            ..self.clone()
        }
    }

    fn normalize(&mut self) {
        if self.max_length == 0 {
            self.max_length = pricing::segment_limit(self.unicode);
        }
    }
}

/// 推送操作按钮
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushAction {
    pub id: String,
    pub title: String,
    pub icon: Option<String>,
}

impl PushAction {
    fn new(id: &str, title: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            icon: Some(icon.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushTemplate {
    pub id: String,
    pub name: String,
    /// "all" 或具体平台
    pub platform: String,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub sound: Option<String>,
    pub variables: Vec<String>,
    pub category: String,
    pub actions: Vec<PushAction>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

impl PushTemplate {
    /// 模板是否适用于指定平台
    pub fn applies_to(&self, platform: &str) -> bool {
        self.platform == "all" || self.platform.eq_ignore_ascii_case(platform)
    }
}

impl Template for PushTemplate {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn set_timestamps(&mut self, now: DateTime<Utc>) {
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }

    fn rendered(&self, data: &HashMap<String, String>) -> Self {
        Self {
            title: render_placeholders(&self.title, data),
            body: render_placeholders(&self.body, data),
            ..self.clone()
        }
    }

    fn normalize(&mut self) {
        if self.platform.is_empty() {
            self.platform = "all".to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// 默认模板
// ---------------------------------------------------------------------------

fn vars(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub fn default_email_templates() -> Vec<EmailTemplate> {
    vec![
        EmailTemplate {
            id: "welcome".to_string(),
            name: "Welcome Email".to_string(),
            subject: "Welcome to {{service_name}}, {{user_name}}!".to_string(),
            html_body: "<html><body><h1>Welcome {{user_name}}!</h1>\
                <p>Thanks for joining {{service_name}}.</p>\
                <p>Your account email: {{user_email}}</p></body></html>"
                .to_string(),
            text_body: "Welcome {{user_name}}!\n\nThanks for joining {{service_name}}.\n\
                Your account email: {{user_email}}"
                .to_string(),
            variables: vars(&["user_name", "user_email", "service_name"]),
            category: "onboarding".to_string(),
            ..Default::default()
        },
        EmailTemplate {
            id: "password_reset".to_string(),
            name: "Password Reset".to_string(),
            subject: "Reset your {{service_name}} password".to_string(),
            html_body: "<html><body><p>Hi {{user_name}},</p>\
                <p><a href=\"{{reset_link}}\">Reset your {{service_name}} password</a></p>\
                <p>The link expires in {{expiry_time}}.</p></body></html>"
                .to_string(),
            text_body: "Hi {{user_name}},\n\nReset your {{service_name}} password: {{reset_link}}\n\
                The link expires in {{expiry_time}}."
                .to_string(),
            variables: vars(&["user_name", "service_name", "reset_link", "expiry_time"]),
            category: "security".to_string(),
            ..Default::default()
        },
        EmailTemplate {
            id: "notification".to_string(),
            name: "General Notification".to_string(),
            subject: "{{notification_title}}".to_string(),
            html_body: "<html><body><h2>{{notification_title}}</h2>\
                <p>{{notification_message}}</p><p><em>Sent at {{timestamp}}</em></p></body></html>"
                .to_string(),
            text_body: "{{notification_title}}\n\n{{notification_message}}\n\nSent at {{timestamp}}"
                .to_string(),
            variables: vars(&["notification_title", "notification_message", "timestamp"]),
            category: "general".to_string(),
            ..Default::default()
        },
    ]
}

pub fn default_sms_templates() -> Vec<SmsTemplate> {
    let sms = |id: &str, name: &str, message: &str, variables: &[&str], category: &str| {
        SmsTemplate {
            id: id.to_string(),
            name: name.to_string(),
            message: message.to_string(),
            variables: vars(variables),
            category: category.to_string(),
            max_length: pricing::GSM_SEGMENT_LIMIT,
            unicode: false,
            ..Default::default()
        }
    };

    vec![
        sms(
            "verification",
            "Verification Code",
            "Your {{service_name}} verification code is: {{code}}. Valid for {{expiry_minutes}} minutes.",
            &["service_name", "code", "expiry_minutes"],
            "security",
        ),
        sms(
            "welcome_sms",
            "Welcome SMS",
            "Welcome to {{service_name}}, {{user_name}}! Thanks for joining us.",
            &["service_name", "user_name"],
            "onboarding",
        ),
        sms(
            "alert",
            "Alert Notification",
            "ALERT: {{alert_message}} Time: {{timestamp}}",
            &["alert_message", "timestamp"],
            "alerts",
        ),
        sms(
            "reminder",
            "Reminder",
            "Reminder: {{reminder_text}}. Reply STOP to opt out.",
            &["reminder_text"],
            "general",
        ),
    ]
}

pub fn default_push_templates() -> Vec<PushTemplate> {
    vec![
        PushTemplate {
            id: "welcome_push".to_string(),
            name: "Welcome Push Notification".to_string(),
            platform: "all".to_string(),
            title: "Welcome to {{app_name}}!".to_string(),
            body: "Hi {{user_name}}, thanks for installing {{app_name}}. Tap to get started!"
                .to_string(),
            icon: Some("ic_welcome".to_string()),
            sound: Some("default".to_string()),
            variables: vars(&["app_name", "user_name"]),
            category: "onboarding".to_string(),
            ..Default::default()
        },
        PushTemplate {
            id: "news_alert".to_string(),
            name: "News Alert".to_string(),
            platform: "all".to_string(),
            title: "Breaking: {{headline}}".to_string(),
            body: "{{summary}} Tap to read more.".to_string(),
            icon: Some("ic_news".to_string()),
            sound: Some("news_alert".to_string()),
            variables: vars(&["headline", "summary"]),
            category: "news".to_string(),
            actions: vec![
                PushAction::new("read", "Read Now", "ic_read"),
                PushAction::new("save", "Save", "ic_save"),
            ],
            ..Default::default()
        },
        PushTemplate {
            id: "promotion".to_string(),
            name: "Promotional Notification".to_string(),
            platform: "all".to_string(),
            title: "🎉 Special Offer!".to_string(),
            body: "{{offer_text}} Use code {{promo_code}}. Valid until {{expiry_date}}."
                .to_string(),
            icon: Some("ic_promotion".to_string()),
            sound: Some("promotion".to_string()),
            variables: vars(&["offer_text", "promo_code", "expiry_date"]),
            category: "marketing".to_string(),
            actions: vec![
                PushAction::new("shop", "Shop Now", "ic_shop"),
                PushAction::new("dismiss", "Dismiss", "ic_close"),
            ],
            ..Default::default()
        },
        PushTemplate {
            id: "reminder".to_string(),
            name: "Reminder Notification".to_string(),
            platform: "all".to_string(),
            title: "Reminder: {{event_title}}".to_string(),
            body: "{{event_description}} Scheduled for {{event_time}}.".to_string(),
            icon: Some("ic_reminder".to_string()),
            sound: Some("gentle".to_string()),
            variables: vars(&["event_title", "event_description", "event_time"]),
            category: "productivity".to_string(),
            actions: vec![
                PushAction::new("view", "View", "ic_view"),
                PushAction::new("snooze", "Snooze", "ic_snooze"),
            ],
            ..Default::default()
        },
    ]
}
