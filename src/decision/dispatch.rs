//! 决策调用的后台执行单元
//!
//! Actor 不在自己的循环里 await 决策引擎：spawn_decision_cycle 把「可选的上下文压缩 + decide」
//! 放进后台任务，完成后通过回调投递到 Actor 邮箱（带 CallId），Actor 期间继续处理其他消息。
//! 后台任务 panic 映射为 DecisionError::Crashed；取消后保证不再投递完成消息。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::supervisor::panic_message;
use crate::core::DecisionError;
use crate::decision::{ActionCall, DecisionEngine, DecisionRequest};
use crate::memory::{ContextCompactor, Message};

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// 决策调用 ID：Actor 只接受与当前在途调用匹配的完成消息
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CallId(u64);

impl CallId {
    fn next() -> Self {
        Self(NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// 一次决策周期的结果
#[derive(Debug)]
pub struct DecisionCycle {
    /// 若发生了压缩，压缩后的上下文（Actor 用它替换自己的上下文）
    pub compacted: Option<Vec<Message>>,
    pub result: Result<ActionCall, DecisionError>,
}

/// 在途调用句柄
#[derive(Debug)]
pub struct InFlightCall {
    id: CallId,
    token: CancellationToken,
}

impl InFlightCall {
    pub fn id(&self) -> CallId {
        self.id
    }

    /// 尽力终止后台任务；之后不会再有完成消息
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// 派发一次决策周期
pub fn spawn_decision_cycle<F>(
    engine: Arc<dyn DecisionEngine>,
    compactor: ContextCompactor,
    request: DecisionRequest,
    timeout: Duration,
    parent: &CancellationToken,
    on_complete: F,
) -> InFlightCall
where
    F: FnOnce(CallId, DecisionCycle) + Send + 'static,
{
    let id = CallId::next();
    let token = parent.child_token();
    let call_token = token.clone();

    tokio::spawn(async move {
        let work = tokio::spawn(run_cycle(engine, compactor, request, timeout));
        let abort = work.abort_handle();

        let cycle = tokio::select! {
            _ = call_token.cancelled() => {
                abort.abort();
                return;
            }
            joined = work => match joined {
                Ok(cycle) => cycle,
                Err(e) => DecisionCycle {
                    compacted: None,
                    result: Err(DecisionError::Crashed(panic_message(e))),
                },
            },
        };

        if call_token.is_cancelled() {
            return;
        }
        on_complete(id, cycle);
    });

    InFlightCall { id, token }
}

async fn run_cycle(
    engine: Arc<dyn DecisionEngine>,
    compactor: ContextCompactor,
    mut request: DecisionRequest,
    timeout: Duration,
) -> DecisionCycle {
    let mut compacted = None;
    if compactor.needs_compaction(&request.turns) {
        let outcome =
            tokio::time::timeout(timeout, compactor.compact(engine.as_ref(), &request.turns)).await;
        match outcome {
            Ok(Ok(turns)) => {
                request.turns = turns.clone();
                compacted = Some(turns);
            }
            // 压缩失败不影响本次决策，沿用未压缩的上下文
            Ok(Err(e)) => warn!(error = %e, "Context compaction failed"),
            Err(_) => warn!(timeout = ?timeout, "Context compaction timed out"),
        }
    }

    let result = match tokio::time::timeout(timeout, engine.decide(&request)).await {
        Ok(result) => result,
        Err(_) => Err(DecisionError::Timeout(timeout)),
    };

    DecisionCycle { compacted, result }
}
