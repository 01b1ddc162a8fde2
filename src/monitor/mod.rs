//! Monitor：每个被监控子系统一个 Actor
//!
//! 持续循环：快照 → 决策 → 执行，直到 wait 暂停或停机；
//! 调用方可随时发起一次有界分析（run），结果为期间产生的通知。

pub mod actions;
pub mod actor;
pub mod handle;
pub mod history;
pub mod prompt;

pub use actions::MonitorAction;
pub use actor::MonitorActor;
pub use handle::{MonitorHandle, MonitorSettings, RunOptions};
pub use history::{BoundedHistory, NotificationHistory, SnapshotHistory};
pub use prompt::Mode;
