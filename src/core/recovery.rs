//! 错误恢复引擎
//!
//! 根据 DecisionError 与连续失败次数返回 RecoveryAction：指数退避重试、达到上限后停机、不可重试则立即失败。
//! 退避延迟：第 1 次失败等待 base，之后每次翻倍（base、2*base、4*base ...），并以 MAX_BACKOFF 封顶。

use std::time::Duration;

use crate::core::{DecisionError, RecoveryAction};

/// 单次退避的上限，防止重试上限配置过大时溢出
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// 有上限的指数退避策略
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    max_retries: u32,
    base_delay: Duration,
}

impl RecoveryEngine {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// attempt 为连续失败次数（从 1 开始）
    pub fn handle(&self, err: &DecisionError, attempt: u32) -> RecoveryAction {
        if !err.is_retryable() {
            return RecoveryAction::Fail;
        }
        if attempt >= self.max_retries {
            return RecoveryAction::Halt { attempts: attempt };
        }
        RecoveryAction::Retry {
            attempt,
            delay: self.backoff(attempt),
        }
    }

    /// 第 attempt 次失败后的等待时长
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}
