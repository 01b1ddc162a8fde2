//! 错误类型与恢复动作
//!
//! 三层错误：HiveError（对调用方）、DecisionError（决策引擎调用失败，走重试/退避）、
//! ActionError（动作参数校验失败，回灌进上下文让决策引擎自我纠正，不会让 Actor 崩溃）。
//! 与 RecoveryEngine 配合：根据 DecisionError 与尝试次数决定 Retry / Halt / Fail。

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// 对外（run / status 调用方）可见的错误
#[derive(Error, Debug)]
pub enum HiveError {
    #[error("Monitor not configured: {0}")]
    MonitorNotConfigured(String),

    #[error("Monitor not running: {0}")]
    MonitorNotRunning(String),

    #[error("Coordinator not running")]
    CoordinatorNotRunning,

    #[error("Analysis timed out after {0:?}")]
    RunTimeout(Duration),

    #[error("Decision engine failed: {0}")]
    Decision(#[from] DecisionError),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}

/// 决策引擎调用失败（超时、传输、输出格式错误、后台任务崩溃、未知动作）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
    #[error("Decision timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed decision: {0}")]
    Malformed(String),

    /// 后台调用 panic，与返回错误等价处理
    #[error("Decision task crashed: {0}")]
    Crashed(String),

    /// 决策引擎选择了动作表之外的动作：不重试，立即上报
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Decision cancelled")]
    Cancelled,
}

impl DecisionError {
    /// 是否值得重试（未知动作与取消不重试）
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DecisionError::UnknownAction(_) | DecisionError::Cancelled)
    }
}

/// 引用的实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Snapshot,
    Notification,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Snapshot => f.write_str("snapshot"),
            ReferenceKind::Notification => f.write_str("notification"),
        }
    }
}

/// 动作校验错误：动作无副作用，错误作为结果回灌上下文
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    /// 引用为空或引用了不存在的 ID（missing 为空表示一个引用都没给）
    #[error("{}", missing_reference_message(*kind, missing))]
    MissingReference {
        kind: ReferenceKind,
        missing: Vec<String>,
    },

    #[error("Invalid arguments for {action}: {message}")]
    InvalidArguments { action: String, message: String },

    #[error("Action {action} is not available in {mode} mode")]
    ModeMismatch { action: String, mode: &'static str },

    #[error("Collector failed: {0}")]
    Collector(String),
}

fn missing_reference_message(kind: ReferenceKind, missing: &[String]) -> String {
    if missing.is_empty() {
        format!("At least one {kind} reference is required")
    } else {
        format!("Unknown {kind} reference(s): {}", missing.join(", "))
    }
}

/// 恢复引擎根据错误类型与尝试次数给出的动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 延迟 delay 后重试（第 attempt 次失败之后）
    Retry { attempt: u32, delay: Duration },
    /// 已达重试上限，停止循环（Actor 本身保持可查询、可重启）
    Halt { attempts: u32 },
    /// 不可重试的错误，立即上报
    Fail,
}
