//! 核心层：错误与恢复、状态投影、Actor 取消监管、延迟唤醒、优雅关闭

pub mod error;
pub mod recovery;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod supervisor;

pub use error::{ActionError, DecisionError, HiveError, RecoveryAction, ReferenceKind};
pub use recovery::RecoveryEngine;
pub use scheduler::{Wake, WakeId, WakeScheduler};
pub use shutdown::{wait_for_signal, ShutdownSignal};
pub use state::{CoordinatorStatus, MonitorStatus};
pub use supervisor::Supervisor;
