//! Coordinator：跨 Monitor 的通知收件箱与关联分析

pub mod actions;
pub mod actor;
pub mod handle;
pub mod inbox;
pub mod prompt;

pub use actions::CoordinatorAction;
pub use actor::CoordinatorActor;
pub use handle::{CoordinatorHandle, CoordinatorSettings};
pub use inbox::{Inbox, StatusUpdate};
