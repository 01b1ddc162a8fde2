//! 有上限的历史记录：超出容量时淘汰最旧的条目

use std::collections::VecDeque;

use crate::model::{Notification, Snapshot};

/// 按时间顺序保存，最旧的在前
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    cap: usize,
    items: VecDeque<T>,
}

impl<T: Clone> BoundedHistory<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            items: VecDeque::new(),
        }
    }

    /// 追加；超出容量时返回被淘汰的最旧条目
    pub fn push(&mut self, item: T) -> Option<T> {
        self.items.push_back(item);
        if self.items.len() > self.cap {
            self.items.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// 最新的在前，跳过 offset 条后取 limit 条
    pub fn page_newest_first(&self, limit: usize, offset: usize) -> Vec<T> {
        self.items
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| pred(item))
    }
}

pub type SnapshotHistory = BoundedHistory<Snapshot>;
pub type NotificationHistory = BoundedHistory<Notification>;

impl SnapshotHistory {
    pub fn get(&self, id: &str) -> Option<&Snapshot> {
        self.find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_evicts_oldest() {
        let mut history = SnapshotHistory::new(2);
        let a = Snapshot::new(Map::new());
        let b = Snapshot::new(Map::new());
        let c = Snapshot::new(Map::new());
        assert!(history.push(a.clone()).is_none());
        assert!(history.push(b.clone()).is_none());
        let evicted = history.push(c.clone()).unwrap();
        assert_eq!(evicted.id, a.id);
        assert_eq!(history.len(), 2);
        assert!(!history.contains(&a.id));
        assert!(history.contains(&c.id));
    }

    #[test]
    fn test_page_newest_first() {
        let mut history = BoundedHistory::new(10);
        for i in 0..5 {
            history.push(i);
        }
        assert_eq!(history.page_newest_first(2, 0), vec![4, 3]);
        assert_eq!(history.page_newest_first(2, 3), vec![1, 0]);
        assert!(history.page_newest_first(2, 10).is_empty());
    }
}
