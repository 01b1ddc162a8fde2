//! 数据模型：Snapshot / Notification / InboxEntry / Insight 与 Monitor 健康状态
//!
//! 全部可序列化，便于作为 JSON 回灌决策上下文；ID 采用「前缀_uuid」形式（snap_ / notif_ / insight_），
//! 上下文压缩时据此逐字保留引用。

pub mod insight;
pub mod notification;
pub mod snapshot;
pub mod state;

pub use insight::{Confidence, CorrelationKind, Insight};
pub use notification::{InboxEntry, Notification, NotificationStatus, Severity};
pub use snapshot::Snapshot;
pub use state::MonitorState;

/// ID 前缀
pub const SNAPSHOT_PREFIX: &str = "snap";
pub const NOTIFICATION_PREFIX: &str = "notif";
pub const INSIGHT_PREFIX: &str = "insight";

pub(crate) fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4())
}
