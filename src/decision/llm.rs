//! LlmDecisionEngine：把任意 LlmClient 适配为决策引擎
//!
//! system prompt 末尾附上动作表 JSON Schema；parse_action 从模型输出中提取 JSON 动作
//! （```json ... ``` 或首个 `{` 到末个 `}`），无法解析即 Malformed。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::DecisionError;
use crate::decision::{ActionCall, DecisionEngine, DecisionRequest};
use crate::llm::LlmClient;
use crate::memory::{Message, Role};

const SUMMARIZER_PROMPT: &str =
    "You compress the working context of an autonomous monitoring agent. Be terse and factual.";

/// 解析 LLM 输出为 ActionCall
pub fn parse_action(output: &str) -> Result<ActionCall, DecisionError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start > end {
            return Err(DecisionError::Malformed(format!(
                "no JSON action in output: {}",
                trimmed
            )));
        }
        &trimmed[start..=end]
    } else {
        return Err(DecisionError::Malformed(format!(
            "no JSON action in output: {}",
            trimmed
        )));
    };

    let parsed: ActionCall = serde_json::from_str(json_str)
        .map_err(|e| DecisionError::Malformed(format!("{}: {}", e, json_str)))?;

    if parsed.action.trim().is_empty() {
        return Err(DecisionError::Malformed("empty action name".to_string()));
    }
    Ok(parsed)
}

pub struct LlmDecisionEngine {
    llm: Arc<dyn LlmClient>,
}

impl LlmDecisionEngine {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    fn build_messages(request: &DecisionRequest) -> Vec<Message> {
        let schema = serde_json::to_string_pretty(&request.schema).unwrap_or_default();
        let system = format!(
            "{}\n\n## Actions\n\
             Reply with exactly one JSON object of the form {{\"action\": \"<name>\", \"args\": {{...}}}} \
             that validates against this JSON Schema:\n```json\n{}\n```",
            request.system_prompt, schema
        );

        let mut messages = Vec::with_capacity(request.turns.len() + 2);
        messages.push(Message::system(system));
        messages.extend(request.turns.iter().cloned());
        if !matches!(messages.last(), Some(m) if m.role == Role::User) {
            messages.push(Message::user("Choose the next action."));
        }
        messages
    }
}

#[async_trait]
impl DecisionEngine for LlmDecisionEngine {
    async fn decide(&self, request: &DecisionRequest) -> Result<ActionCall, DecisionError> {
        let messages = Self::build_messages(request);
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| DecisionError::Transport(e.to_string()))?;
        debug!(output = %output, "LLM decision output");
        parse_action(&output)
    }

    async fn summarize(
        &self,
        turns: &[Message],
        instructions: &str,
    ) -> Result<String, DecisionError> {
        let mut messages = Vec::with_capacity(turns.len() + 2);
        messages.push(Message::system(SUMMARIZER_PROMPT));
        messages.extend(turns.iter().cloned());
        messages.push(Message::user(instructions));
        self.llm
            .complete(&messages)
            .await
            .map_err(|e| DecisionError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use serde_json::json;

    struct FailingClient;

    #[async_trait]
    impl LlmClient for FailingClient {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            Err(LlmError::Api("503 Service Unavailable".to_string()))
        }
    }

    fn request() -> DecisionRequest {
        DecisionRequest {
            system_prompt: "You watch memory.".to_string(),
            turns: vec![],
            schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_parse_fenced_json() {
        let out = "I will look first.\n```json\n{\"action\": \"take_snapshot\", \"args\": {}}\n```";
        let call = parse_action(out).unwrap();
        assert_eq!(call.action, "take_snapshot");
    }

    #[test]
    fn test_parse_bare_json_without_args() {
        let call = parse_action("{\"action\": \"done\"}").unwrap();
        assert_eq!(call, ActionCall::new("done", serde_json::Value::Null));
    }

    #[test]
    fn test_parse_plain_text_is_malformed() {
        assert!(matches!(
            parse_action("Everything looks fine."),
            Err(DecisionError::Malformed(_))
        ));
        assert!(matches!(
            parse_action("} nonsense {"),
            Err(DecisionError::Malformed(_))
        ));
    }

    #[test]
    fn test_build_messages_appends_schema_and_prompt() {
        let messages = LlmDecisionEngine::build_messages(&request());
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("You watch memory."));
        assert!(messages[0].content.contains("\"type\": \"object\""));
        assert_eq!(messages[1].role, Role::User);
    }

    #[tokio::test]
    async fn test_decide_with_mock_client() {
        let engine = LlmDecisionEngine::new(Arc::new(MockLlmClient::new()));
        let call = engine.decide(&request()).await.unwrap();
        assert_eq!(call.action, "take_snapshot");
    }

    #[tokio::test]
    async fn test_transport_error_mapped() {
        let engine = LlmDecisionEngine::new(Arc::new(FailingClient));
        let err = engine.decide(&request()).await.unwrap_err();
        assert!(matches!(err, DecisionError::Transport(_)));
    }
}
