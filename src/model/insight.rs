//! Insight：Coordinator 关联多条 Notification 得出的结论（不可变）

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::{ActionError, ReferenceKind};
use crate::model::{new_id, INSIGHT_PREFIX};

/// 关联类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationKind {
    /// 时间上相近
    Temporal,
    /// 存在因果关系
    Causal,
    /// 同一根因的不同症状
    Symptomatic,
}

/// 置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    /// 引用的 Notification ID，非空
    pub notification_ids: Vec<String>,
    pub kind: CorrelationKind,
    pub summary: String,
    /// 根因假设（可选）
    pub hypothesis: Option<String>,
    pub confidence: Confidence,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        notification_ids: Vec<String>,
        kind: CorrelationKind,
        summary: impl Into<String>,
        hypothesis: Option<String>,
        confidence: Confidence,
    ) -> Result<Self, ActionError> {
        if notification_ids.is_empty() {
            return Err(ActionError::MissingReference {
                kind: ReferenceKind::Notification,
                missing: Vec::new(),
            });
        }
        Ok(Self {
            id: new_id(INSIGHT_PREFIX),
            notification_ids,
            kind,
            summary: summary.into(),
            hypothesis,
            confidence,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insight_requires_notifications() {
        let err = Insight::new(vec![], CorrelationKind::Causal, "x", None, Confidence::Low)
            .unwrap_err();
        assert!(matches!(
            err,
            ActionError::MissingReference {
                kind: ReferenceKind::Notification,
                ..
            }
        ));
    }

    #[test]
    fn test_insight_new() {
        let insight = Insight::new(
            vec!["notif_a".to_string()],
            CorrelationKind::Temporal,
            "queue backlog follows memory spike",
            Some("GC pressure".to_string()),
            Confidence::Medium,
        )
        .unwrap();
        assert!(insight.id.starts_with("insight_"));
        assert_eq!(insight.notification_ids, vec!["notif_a".to_string()]);
    }
}
