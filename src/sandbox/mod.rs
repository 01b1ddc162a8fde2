//! 沙箱求值：在 Collector 注册的只读回调之上运行短脚本
//!
//! 脚本只能调用回调表中的函数，没有文件、网络、进程能力；执行有步数与时间上限；
//! 脚本内的任何故障都以 SandboxError 返回，不会向调用方传播 panic。

pub mod registry;
pub mod script;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use registry::{Callback, Callbacks};
pub use script::CallScriptEvaluator;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Callback {name} failed: {message}")]
    Callback { name: String, message: String },

    #[error("Script timed out after {0:?}")]
    Timeout(Duration),

    #[error("Script exceeded {0} steps")]
    StepLimit(usize),

    #[error("Script panicked: {0}")]
    Panicked(String),
}

impl SandboxError {
    /// 错误类别（回灌上下文时使用）
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::Parse(_) => "parse",
            SandboxError::UnknownFunction(_) => "unknown_function",
            SandboxError::UndefinedVariable(_) => "undefined_variable",
            SandboxError::Callback { .. } => "callback",
            SandboxError::Timeout(_) => "timeout",
            SandboxError::StepLimit(_) => "step_limit",
            SandboxError::Panicked(_) => "panicked",
        }
    }
}

/// 沙箱求值器
#[async_trait]
pub trait SandboxEvaluator: Send + Sync {
    async fn eval(&self, script: &str, callbacks: &Callbacks) -> Result<Value, SandboxError>;
}
