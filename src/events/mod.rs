//! 事件层：进程内 Event Bus 与对外遥测事件

pub mod bus;
pub mod telemetry;

pub use bus::EventBus;
pub use telemetry::{EventName, HiveEvent};
