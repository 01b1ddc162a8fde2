//! Context Compaction：上下文超出预算时，把较早的轮次交给决策引擎摘要，
//! 替换为一条 system 摘要消息，其后保留最近 keep_last 条原文。
//!
//! 摘要消息末尾总是附带被压缩部分出现过的全部 snap_/notif_/insight_ ID，
//! 即使摘要本身遗漏了它们；再次压缩时这些 ID 会被重新提取，不会丢失。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::core::DecisionError;
use crate::decision::DecisionEngine;
use crate::memory::{Message, Role, TokenEstimator};

/// 摘要消息的固定前缀，用于识别已压缩的上下文
pub const SUMMARY_HEADER: &str = "Previous context summary:";

const REFERENCED_IDS_LABEL: &str = "Referenced ids:";

const SUMMARY_INSTRUCTIONS: &str = "Summarize the monitoring context above for your own later use. \
Preserve verbatim every snapshot, notification and insight id that is mentioned, \
list any outstanding unresolved items, and keep the key observed values (numbers, thresholds, states). \
Reply with plain text only, no action.";

fn id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"\b(?:snap|notif|insight)_[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b",
            )
            .ok()
        })
        .as_ref()
}

/// 按首次出现顺序提取文本中的实体 ID（去重）
pub fn referenced_ids<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let Some(pattern) = id_pattern() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for text in texts {
        for m in pattern.find_iter(text) {
            if seen.insert(m.as_str()) {
                ids.push(m.as_str().to_string());
            }
        }
    }
    ids
}

/// 上下文压缩器：max_tokens 为触发阈值，keep_last 为保留原文的轮次数
#[derive(Debug, Clone)]
pub struct ContextCompactor {
    max_tokens: usize,
    keep_last: usize,
}

impl ContextCompactor {
    pub fn new(max_tokens: usize, keep_last: usize) -> Self {
        Self {
            max_tokens,
            keep_last,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn keep_last(&self) -> usize {
        self.keep_last
    }

    pub fn is_summary(msg: &Message) -> bool {
        msg.role == Role::System && msg.content.starts_with(SUMMARY_HEADER)
    }

    /// 已是最简形式：不超过 keep_last 条，或「一条摘要 + 不超过 keep_last 条」
    pub fn is_compact(&self, turns: &[Message]) -> bool {
        if turns.len() <= self.keep_last {
            return true;
        }
        matches!(turns.first(), Some(first) if Self::is_summary(first))
            && turns.len() - 1 <= self.keep_last
    }

    pub fn needs_compaction(&self, turns: &[Message]) -> bool {
        TokenEstimator::estimate_messages(turns) > self.max_tokens && !self.is_compact(turns)
    }

    /// 压缩；已是最简形式时原样返回，不调用决策引擎
    pub async fn compact(
        &self,
        engine: &dyn DecisionEngine,
        turns: &[Message],
    ) -> Result<Vec<Message>, DecisionError> {
        if self.is_compact(turns) {
            return Ok(turns.to_vec());
        }

        let split = turns.len() - self.keep_last;
        let (head, tail) = turns.split_at(split);
        let summary = engine.summarize(head, SUMMARY_INSTRUCTIONS).await?;
        let ids = referenced_ids(head.iter().map(|m| m.content.as_str()));

        let mut content = format!("{}\n\n{}", SUMMARY_HEADER, summary.trim());
        if !ids.is_empty() {
            content.push_str(&format!("\n\n{} {}", REFERENCED_IDS_LABEL, ids.join(", ")));
        }

        debug!(
            compacted = head.len(),
            kept = tail.len(),
            ids = ids.len(),
            "Context compacted"
        );

        let mut out = Vec::with_capacity(tail.len() + 1);
        out.push(Message::system(content));
        out.extend_from_slice(tail);
        Ok(out)
    }
}
