//! Mock LLM 客户端（无需 API Key）
//!
//! 依次输出 take_snapshot → think → wait 三个动作并循环，便于本地跑通监控循环；
//! 收到摘要请求时返回纯文本摘要。

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

const CYCLE: [&str; 3] = [
    r#"{"action": "take_snapshot", "args": {}}"#,
    r#"{"action": "think", "args": {"thought": "Mock client: nothing to analyse offline."}}"#,
    r#"{"action": "wait", "args": {"seconds": 30}}"#,
];

/// Mock 客户端：按固定顺序循环输出动作
#[derive(Debug, Default)]
pub struct MockLlmClient {
    turn: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if last_user.starts_with("Summarize") {
            return Ok("Mock summary of earlier turns.".to_string());
        }

        let idx = self.turn.fetch_add(1, Ordering::Relaxed) % CYCLE.len();
        Ok(format!("```json\n{}\n```", CYCLE[idx]))
    }
}
