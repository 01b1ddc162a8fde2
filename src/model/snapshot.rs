//! Snapshot：某一时刻采集到的子系统数据（不可变）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{new_id, SNAPSHOT_PREFIX};

/// 采集快照：由 Monitor 执行 take_snapshot 时创建，之后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub captured_at: DateTime<Utc>,
    pub payload: Map<String, Value>,
}

impl Snapshot {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self {
            id: new_id(SNAPSHOT_PREFIX),
            captured_at: Utc::now(),
            payload,
        }
    }
}
