//! Notification（异常报告）与 InboxEntry（Coordinator 收件箱条目）
//!
//! Notification 创建后不可变，且必须至少引用一个 Snapshot。
//! InboxEntry 的状态只能单调前进：unread → acknowledged → resolved。

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::{ActionError, ReferenceKind};
use crate::model::{new_id, NOTIFICATION_PREFIX};

/// 严重程度：info < warning < critical
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// 异常报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub monitor_id: String,
    /// 异常类型（自由字符串，如 mem_high）
    pub anomaly_type: String,
    pub severity: Severity,
    pub summary: String,
    /// 引用的 Snapshot ID，非空
    pub snapshot_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// 创建通知；snapshot_ids 为空时返回 MissingReference
    pub fn new(
        monitor_id: impl Into<String>,
        anomaly_type: impl Into<String>,
        summary: impl Into<String>,
        severity: Severity,
        snapshot_ids: Vec<String>,
    ) -> Result<Self, ActionError> {
        if snapshot_ids.is_empty() {
            return Err(ActionError::MissingReference {
                kind: ReferenceKind::Snapshot,
                missing: Vec::new(),
            });
        }
        Ok(Self {
            id: new_id(NOTIFICATION_PREFIX),
            monitor_id: monitor_id.into(),
            anomaly_type: anomaly_type.into(),
            severity,
            summary: summary.into(),
            snapshot_ids,
            created_at: Utc::now(),
        })
    }
}

/// 收件箱条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Acknowledged,
    Resolved,
}

impl NotificationStatus {
    fn rank(self) -> u8 {
        match self {
            NotificationStatus::Unread => 0,
            NotificationStatus::Acknowledged => 1,
            NotificationStatus::Resolved => 2,
        }
    }

    /// 只允许向前推进
    pub fn can_advance_to(self, next: NotificationStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Acknowledged => "acknowledged",
            NotificationStatus::Resolved => "resolved",
        }
    }
}

/// 收件箱条目：通知 + 状态；状态字段私有，只能经 advance_to 单调推进
#[derive(Debug, Clone, Serialize)]
pub struct InboxEntry {
    pub notification: Notification,
    status: NotificationStatus,
    /// 最近一次状态变更的原因
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl InboxEntry {
    pub fn new(notification: Notification) -> Self {
        Self {
            notification,
            status: NotificationStatus::Unread,
            reason: None,
            updated_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.notification.id
    }

    pub fn status(&self) -> NotificationStatus {
        self.status
    }

    /// 推进到 next；非前进方向（含同状态）不生效，返回 false
    pub fn advance_to(&mut self, next: NotificationStatus, reason: Option<String>) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        self.reason = reason;
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Notification {
        Notification::new(
            "memory",
            "mem_high",
            "RSS above 90%",
            Severity::Warning,
            vec!["snap_1".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn test_notification_requires_snapshot() {
        let err = Notification::new("memory", "mem_high", "x", Severity::Info, vec![]).unwrap_err();
        assert!(matches!(
            err,
            ActionError::MissingReference {
                kind: ReferenceKind::Snapshot,
                ..
            }
        ));
    }

    #[test]
    fn test_inbox_entry_starts_unread() {
        let entry = InboxEntry::new(sample());
        assert_eq!(entry.status(), NotificationStatus::Unread);
        assert!(entry.id().starts_with("notif_"));
    }

    #[test]
    fn test_inbox_entry_monotonic() {
        let mut entry = InboxEntry::new(sample());
        assert!(entry.advance_to(NotificationStatus::Acknowledged, None));
        assert!(entry.advance_to(NotificationStatus::Resolved, Some("fixed".to_string())));
        assert!(!entry.advance_to(NotificationStatus::Unread, None));
        assert!(!entry.advance_to(NotificationStatus::Acknowledged, None));
        assert_eq!(entry.status(), NotificationStatus::Resolved);
        assert_eq!(entry.reason.as_deref(), Some("fixed"));
    }

    #[test]
    fn test_inbox_entry_can_skip_to_resolved() {
        let mut entry = InboxEntry::new(sample());
        assert!(entry.advance_to(NotificationStatus::Resolved, None));
        assert!(!entry.advance_to(NotificationStatus::Resolved, None));
    }

    #[test]
    fn test_severity_serde_lowercase() {
        let v = serde_json::to_value(Severity::Critical).unwrap();
        assert_eq!(v, serde_json::json!("critical"));
    }
}
