//! 上下文轮次：决策引擎看到的对话式上下文
//!
//! 每次动作执行后追加两条消息（assistant：所选动作 JSON；user：动作结果），
//! 超出预算时由 ContextCompactor 压缩为「摘要 + 最近 K 条」。

use serde::{Deserialize, Serialize};

use crate::memory::TokenEstimator;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 当前分析窗口的上下文（Actor 独占，不跨 Actor 共享）
#[derive(Clone, Debug, Default)]
pub struct ContextWindow {
    messages: Vec<Message>,
}

impl ContextWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 用压缩后的轮次整体替换
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn estimated_tokens(&self) -> usize {
        TokenEstimator::estimate_messages(&self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_window_push_and_replace() {
        let mut ctx = ContextWindow::new();
        ctx.push(Message::user("begin"));
        ctx.push(Message::assistant("{\"action\":\"take_snapshot\"}"));
        assert_eq!(ctx.len(), 2);
        ctx.replace(vec![Message::system("summary")]);
        assert_eq!(ctx.messages(), &[Message::system("summary")]);
        ctx.clear();
        assert!(ctx.is_empty());
        assert_eq!(ctx.estimated_tokens(), 0);
    }
}
