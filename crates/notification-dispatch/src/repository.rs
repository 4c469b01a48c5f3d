//! 通知仓储接口
//!
//! 仅定义持久化契约，不附带实现；分发器在配置了仓储时于发送前后保存通知头部。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify_shared::error::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Notification, NotificationStatus, NotificationType, Priority};

/// 列表查询条件，未设置的字段不参与过滤
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationFilters {
    pub notification_type: Option<NotificationType>,
    pub status: Option<NotificationStatus>,
    pub priority: Option<Priority>,
    pub recipient: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl NotificationFilters {
    /// 通知是否满足条件（不考虑分页）
    pub fn matches(&self, notification: &Notification) -> bool {
        self.notification_type
            .is_none_or(|t| t == notification.notification_type)
            && self.status.is_none_or(|s| s == notification.status)
            && self.priority.is_none_or(|p| p == notification.priority)
            && self
                .recipient
                .as_deref()
                .is_none_or(|r| r == notification.recipient)
            && self
                .created_after
                .is_none_or(|at| notification.created_at >= at)
            && self
                .created_before
                .is_none_or(|at| notification.created_at < at)
    }
}

/// 通知仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn save(&self, notification: &Notification) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Notification>>;
    async fn update(&self, notification: &Notification) -> Result<()>;
    async fn list(&self, filters: &NotificationFilters) -> Result<Vec<Notification>>;
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// 待发送（pending / retrying）的通知，按创建时间升序
    async fn pending(&self, limit: usize) -> Result<Vec<Notification>>;
}
