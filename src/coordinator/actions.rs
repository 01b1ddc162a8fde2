//! Coordinator 动作表
//!
//! 与 MonitorAction 一样，变体文档注释会进入 JSON Schema，使用英文。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::decision::ActionVocabulary;
use crate::model::{Confidence, CorrelationKind, NotificationStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", content = "args", rename_all = "snake_case")]
pub enum CoordinatorAction {
    /// List inbox entries, optionally only those with the given status.
    GetNotifications {
        #[serde(default)]
        status: Option<NotificationStatus>,
    },

    /// Move inbox entries forward (unread -> acknowledged -> resolved). Unknown ids are ignored.
    UpdateNotificationStatuses {
        ids: Vec<String>,
        status: NotificationStatus,
        #[serde(default)]
        reason: Option<String>,
    },

    /// Record a correlation across notifications. Every referenced notification is marked resolved.
    ProduceInsight {
        notification_ids: Vec<String>,
        correlation_kind: CorrelationKind,
        summary: String,
        #[serde(default)]
        hypothesis: Option<String>,
        confidence: Confidence,
    },

    /// Record a reasoning step. Has no effect besides being kept in context.
    Think { thought: String },

    /// Finish this triage pass. If unread notifications remain, a new pass starts immediately.
    Done {},
}

impl ActionVocabulary for CoordinatorAction {
    const NAMES: &'static [&'static str] = &[
        "get_notifications",
        "update_notification_statuses",
        "produce_insight",
        "think",
        "done",
    ];

    fn name(&self) -> &'static str {
        match self {
            CoordinatorAction::GetNotifications { .. } => "get_notifications",
            CoordinatorAction::UpdateNotificationStatuses { .. } => "update_notification_statuses",
            CoordinatorAction::ProduceInsight { .. } => "produce_insight",
            CoordinatorAction::Think { .. } => "think",
            CoordinatorAction::Done {} => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{decode_action, ActionCall};
    use serde_json::json;

    #[test]
    fn test_optional_fields_default() {
        let call = ActionCall::new(
            "produce_insight",
            json!({
                "notification_ids": ["notif_a", "notif_b"],
                "correlation_kind": "causal",
                "summary": "disk pressure slowed the queue",
                "confidence": "medium"
            }),
        );
        let action: CoordinatorAction = decode_action(&call).unwrap();
        match action {
            CoordinatorAction::ProduceInsight {
                hypothesis,
                correlation_kind,
                ..
            } => {
                assert!(hypothesis.is_none());
                assert_eq!(correlation_kind, CorrelationKind::Causal);
            }
            other => panic!("unexpected {other:?}"),
        }

        let call = ActionCall::new("get_notifications", serde_json::Value::Null);
        let action: CoordinatorAction = decode_action(&call).unwrap();
        assert_eq!(action, CoordinatorAction::GetNotifications { status: None });
    }

    #[test]
    fn test_wrong_status_is_invalid() {
        let call = ActionCall::new(
            "update_notification_statuses",
            json!({ "ids": ["notif_a"], "status": "archived" }),
        );
        assert!(decode_action::<CoordinatorAction>(&call).is_err());
    }
}
