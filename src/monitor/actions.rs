//! Monitor 动作表（决策引擎每轮选择其一）
//!
//! 变体上的文档注释会进入 JSON Schema 的 description，直接给模型看，因此用英文。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::decision::ActionVocabulary;
use crate::model::{MonitorState, Severity};

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", content = "args", rename_all = "snake_case")]
pub enum MonitorAction {
    /// Set the health state of the monitored subsystem. The reason is recorded in the event stream.
    SetState { state: MonitorState, reason: String },

    /// Report an anomaly. `snapshot_ids` must reference at least one snapshot you captured.
    SendNotification {
        #[serde(rename = "type")]
        anomaly_type: String,
        summary: String,
        severity: Severity,
        snapshot_ids: Vec<String>,
    },

    /// Capture the current subsystem status. Returns the new snapshot id and its data.
    TakeSnapshot {},

    /// Fetch one captured snapshot by id.
    GetSnapshot { id: String },

    /// List captured snapshots, newest first.
    GetSnapshots {
        #[serde(default = "default_limit")]
        limit: usize,
        #[serde(default)]
        offset: usize,
    },

    /// List the notifications this monitor has sent.
    GetNotifications {},

    /// Run a short read-only script against the subsystem callbacks.
    Execute { script: String },

    /// Record a reasoning step. Has no effect besides being kept in context.
    Think { thought: String },

    /// Pause the continuous loop for the given number of seconds, then start a fresh analysis window.
    Wait { seconds: u64 },

    /// Finish a requested analysis and return the notifications produced during it.
    Done {},
}

impl ActionVocabulary for MonitorAction {
    const NAMES: &'static [&'static str] = &[
        "set_state",
        "send_notification",
        "take_snapshot",
        "get_snapshot",
        "get_snapshots",
        "get_notifications",
        "execute",
        "think",
        "wait",
        "done",
    ];

    fn name(&self) -> &'static str {
        match self {
            MonitorAction::SetState { .. } => "set_state",
            MonitorAction::SendNotification { .. } => "send_notification",
            MonitorAction::TakeSnapshot {} => "take_snapshot",
            MonitorAction::GetSnapshot { .. } => "get_snapshot",
            MonitorAction::GetSnapshots { .. } => "get_snapshots",
            MonitorAction::GetNotifications {} => "get_notifications",
            MonitorAction::Execute { .. } => "execute",
            MonitorAction::Think { .. } => "think",
            MonitorAction::Wait { .. } => "wait",
            MonitorAction::Done {} => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{decode_action, ActionCall};
    use serde_json::json;

    #[test]
    fn test_send_notification_uses_type_key() {
        let call = ActionCall::new(
            "send_notification",
            json!({
                "type": "mem_high",
                "summary": "available memory below 5%",
                "severity": "critical",
                "snapshot_ids": ["snap_a"]
            }),
        );
        let action: MonitorAction = decode_action(&call).unwrap();
        match action {
            MonitorAction::SendNotification {
                anomaly_type,
                severity,
                ..
            } => {
                assert_eq!(anomaly_type, "mem_high");
                assert_eq!(severity, Severity::Critical);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_get_snapshots_defaults() {
        let call = ActionCall::new("get_snapshots", json!({}));
        let action: MonitorAction = decode_action(&call).unwrap();
        assert_eq!(action, MonitorAction::GetSnapshots { limit: 10, offset: 0 });
    }

    #[test]
    fn test_names_match_serde_tags() {
        let samples = vec![
            MonitorAction::TakeSnapshot {},
            MonitorAction::Wait { seconds: 5 },
            MonitorAction::Done {},
            MonitorAction::GetNotifications {},
        ];
        for action in samples {
            let v = serde_json::to_value(&action).unwrap();
            assert_eq!(v["action"], json!(action.name()));
            assert!(MonitorAction::NAMES.contains(&action.name()));
        }
    }
}
