//! Coordinator 收件箱：按通知 ID 去重，保持到达顺序，状态只能单调推进

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{InboxEntry, Notification, NotificationStatus};

/// 批量更新状态的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusUpdate {
    /// 实际发生推进的 ID
    pub applied: Vec<String>,
    /// 已处于该状态或更靠后的 ID
    pub unchanged: Vec<String>,
    /// 收件箱中不存在的 ID（忽略，不报错）
    pub unknown: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Inbox {
    entries: HashMap<String, InboxEntry>,
    order: Vec<String>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一条 unread 条目；重复投递的通知返回 false
    pub fn insert(&mut self, notification: Notification) -> bool {
        if self.entries.contains_key(&notification.id) {
            return false;
        }
        self.order.push(notification.id.clone());
        self.entries
            .insert(notification.id.clone(), InboxEntry::new(notification));
        true
    }

    pub fn get(&self, id: &str) -> Option<&InboxEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// 按到达顺序列出，filter 为 None 时返回全部
    pub fn list(&self, filter: Option<NotificationStatus>) -> Vec<InboxEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|entry| filter.map_or(true, |status| entry.status() == status))
            .cloned()
            .collect()
    }

    pub fn update_statuses(
        &mut self,
        ids: &[String],
        status: NotificationStatus,
        reason: Option<&str>,
    ) -> StatusUpdate {
        let mut update = StatusUpdate::default();
        for id in ids {
            match self.entries.get_mut(id) {
                Some(entry) => {
                    if entry.advance_to(status, reason.map(str::to_string)) {
                        update.applied.push(id.clone());
                    } else {
                        update.unchanged.push(id.clone());
                    }
                }
                None => update.unknown.push(id.clone()),
            }
        }
        update
    }

    /// 将引用的条目全部标记为 resolved（已 resolved 的保持不变）
    pub fn resolve(&mut self, ids: &[String], reason: &str) -> StatusUpdate {
        self.update_statuses(ids, NotificationStatus::Resolved, Some(reason))
    }

    pub fn missing<'a>(&self, ids: &'a [String]) -> Vec<&'a String> {
        ids.iter().filter(|id| !self.contains(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.status() == NotificationStatus::Unread)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    fn notification(monitor: &str) -> Notification {
        Notification::new(
            monitor,
            "latency",
            "p99 above budget",
            Severity::Warning,
            vec!["snap_x".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_insert_dedupes() {
        let mut inbox = Inbox::new();
        let n = notification("api");
        assert!(inbox.insert(n.clone()));
        assert!(!inbox.insert(n));
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox.unread_count(), 1);
    }

    #[test]
    fn test_partial_batch_applies_valid_subset() {
        let mut inbox = Inbox::new();
        let a = notification("api");
        let b = notification("db");
        inbox.insert(a.clone());
        inbox.insert(b.clone());

        let ids = vec![a.id.clone(), "notif_bogus".to_string()];
        let update = inbox.update_statuses(&ids, NotificationStatus::Acknowledged, Some("seen"));
        assert_eq!(update.applied, vec![a.id.clone()]);
        assert_eq!(update.unknown, vec!["notif_bogus".to_string()]);
        assert_eq!(
            inbox.get(&a.id).unwrap().status(),
            NotificationStatus::Acknowledged
        );
        assert_eq!(inbox.get(&b.id).unwrap().status(), NotificationStatus::Unread);
    }

    #[test]
    fn test_status_never_moves_backwards() {
        let mut inbox = Inbox::new();
        let a = notification("api");
        inbox.insert(a.clone());
        inbox.resolve(&[a.id.clone()], "correlated");

        let update = inbox.update_statuses(&[a.id.clone()], NotificationStatus::Unread, None);
        assert_eq!(update.unchanged, vec![a.id.clone()]);
        assert_eq!(inbox.get(&a.id).unwrap().status(), NotificationStatus::Resolved);
        assert_eq!(inbox.list(Some(NotificationStatus::Unread)).len(), 0);
        assert_eq!(inbox.list(None).len(), 1);
    }
}
