//! 记忆层：上下文轮次、Token 估算与上下文压缩
//!
//! 只在进程内保存，不跨重启持久化。

pub mod compactor;
pub mod conversation;
pub mod token_budget;

pub use compactor::{referenced_ids, ContextCompactor, SUMMARY_HEADER};
pub use conversation::{ContextWindow, Message, Role};
pub use token_budget::TokenEstimator;
