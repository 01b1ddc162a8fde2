//! Token 估算：判断上下文是否超出预算（触发压缩）
//!
//! 不依赖具体模型的分词器，使用字符数近似。

use crate::memory::Message;

/// 每条消息的固定开销（角色标记等）
const PER_MESSAGE_OVERHEAD: usize = 4;

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 英文约 4 字符/token，中文约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }

    /// 估算一组消息的总 token 数
    pub fn estimate_messages(messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| Self::estimate(&m.content) + PER_MESSAGE_OVERHEAD)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimator_english() {
        let text = "Hello, world! This is a test.";
        let tokens = TokenEstimator::estimate(text);
        assert!(tokens > 0);
        assert!(tokens < text.len());
    }

    #[test]
    fn test_token_estimator_chinese() {
        let tokens = TokenEstimator::estimate("内存使用率持续升高");
        assert_eq!(tokens, 6);
    }

    #[test]
    fn test_estimate_messages_adds_overhead() {
        let messages = vec![Message::user("abcd"), Message::assistant("abcd")];
        assert_eq!(TokenEstimator::estimate_messages(&messages), 2 * (1 + PER_MESSAGE_OVERHEAD));
        assert_eq!(TokenEstimator::estimate_messages(&[]), 0);
    }
}
