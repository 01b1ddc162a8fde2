//! 决策引擎边界：给定上下文与动作 Schema，返回恰好一个结构化动作
//!
//! 实现可以是 LLM（LlmDecisionEngine），也可以是任意策略（ScriptedEngine）。
//! 调用方总是在后台任务中调用，见 dispatch::spawn_decision_cycle。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::DecisionError;
use crate::memory::Message;

/// 一次决策请求
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    /// 角色与规则说明（由 Monitor / Coordinator 构建）
    pub system_prompt: String,
    /// 当前上下文轮次
    pub turns: Vec<Message>,
    /// 动作表的 JSON Schema
    pub schema: Value,
}

/// 决策引擎选出的动作：{"action": "...", "args": {...}}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub action: String,
    #[serde(default)]
    pub args: Value,
}

impl ActionCall {
    pub fn new(action: impl Into<String>, args: Value) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }
}

#[async_trait]
pub trait DecisionEngine: Send + Sync {
    /// 选出下一个动作
    async fn decide(&self, request: &DecisionRequest) -> Result<ActionCall, DecisionError>;

    /// 无 Schema 的摘要调用（用于上下文压缩）
    async fn summarize(&self, turns: &[Message], instructions: &str)
        -> Result<String, DecisionError>;
}
