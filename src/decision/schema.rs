//! 动作表：JSON Schema 生成与 ActionCall → 强类型动作的解码

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::coordinator::CoordinatorAction;
use crate::decision::ActionCall;
use crate::monitor::MonitorAction;

/// 一组可供决策引擎选择的动作（adjacently tagged：{"action": name, "args": {...}}）
pub trait ActionVocabulary: DeserializeOwned + JsonSchema {
    /// 全部动作名
    const NAMES: &'static [&'static str];

    fn name(&self) -> &'static str;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// 动作不在动作表中
    #[error("Unknown action: {0}")]
    Unknown(String),

    /// 动作已知但参数不合法
    #[error("{0}")]
    Invalid(String),
}

pub fn action_schema<A: ActionVocabulary>() -> Value {
    serde_json::to_value(schemars::schema_for!(A)).unwrap_or_default()
}

pub fn monitor_action_schema() -> Value {
    action_schema::<MonitorAction>()
}

pub fn coordinator_action_schema() -> Value {
    action_schema::<CoordinatorAction>()
}

/// 解码为强类型动作；args 缺省或为 null 视为空对象
pub fn decode_action<A: ActionVocabulary>(call: &ActionCall) -> Result<A, DecodeError> {
    if !A::NAMES.contains(&call.action.as_str()) {
        return Err(DecodeError::Unknown(call.action.clone()));
    }
    let args = match &call.args {
        Value::Null => json!({}),
        other => other.clone(),
    };
    serde_json::from_value(json!({ "action": call.action, "args": args }))
        .map_err(|e| DecodeError::Invalid(e.to_string()))
}
