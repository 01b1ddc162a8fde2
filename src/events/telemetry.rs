//! 对外事件：每次状态变更、通知、动作执行、重试、洞察都发出一条结构化事件
//! （事件名 + 数值度量 + 元数据），供仪表盘、告警转发等观察者订阅。

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    MonitorStarted,
    MonitorStopped,
    StateChanged,
    NotificationSent,
    ActionExecuted,
    /// 动作参数校验失败（已回灌上下文）
    ValidationFailed,
    /// 决策调用失败（含本次尝试次数与退避延迟）
    DecisionError,
    /// 超过重试上限，循环停止
    LoopHalted,
    ContextCompacted,
    NotificationStatusUpdated,
    InsightProduced,
    CoordinatorRunning,
    CoordinatorIdle,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::MonitorStarted => "monitor_started",
            EventName::MonitorStopped => "monitor_stopped",
            EventName::StateChanged => "state_changed",
            EventName::NotificationSent => "notification_sent",
            EventName::ActionExecuted => "action_executed",
            EventName::ValidationFailed => "validation_failed",
            EventName::DecisionError => "decision_error",
            EventName::LoopHalted => "loop_halted",
            EventName::ContextCompacted => "context_compacted",
            EventName::NotificationStatusUpdated => "notification_status_updated",
            EventName::InsightProduced => "insight_produced",
            EventName::CoordinatorRunning => "coordinator_running",
            EventName::CoordinatorIdle => "coordinator_idle",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条结构化事件
#[derive(Debug, Clone, Serialize)]
pub struct HiveEvent {
    pub name: EventName,
    pub measurements: BTreeMap<String, f64>,
    pub metadata: BTreeMap<String, Value>,
    pub at: DateTime<Utc>,
}

impl HiveEvent {
    pub fn new(name: EventName) -> Self {
        Self {
            name,
            measurements: BTreeMap::new(),
            metadata: BTreeMap::new(),
            at: Utc::now(),
        }
    }

    pub fn measure(mut self, key: &str, value: f64) -> Self {
        self.measurements.insert(key.to_string(), value);
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}
