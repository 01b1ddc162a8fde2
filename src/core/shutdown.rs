//! 优雅关闭：等待 Ctrl+C / SIGTERM，或运行时根 token 被取消
//!
//! 宿主进程通过 `Hive::run_until_shutdown` 使用：收到信号后先并发关闭所有 Actor
//! （取消在途决策调用），再取消根 token。

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// 触发关闭的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// 根 token 被程序内部取消
    Cancelled,
}

impl ShutdownSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "interrupt",
            ShutdownSignal::Terminate => "terminate",
            ShutdownSignal::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// 等待第一个关闭信号
pub async fn wait_for_signal(token: &CancellationToken) -> ShutdownSignal {
    tokio::select! {
        _ = token.cancelled() => ShutdownSignal::Cancelled,
        _ = interrupt() => ShutdownSignal::Interrupt,
        _ = terminate() => ShutdownSignal::Terminate,
    }
}
