//! 延迟唤醒调度：wait 与退避都实现为「稍后投递到邮箱的消息」，而不是阻塞式 sleep
//!
//! 每个唤醒带一个递增的 WakeId，Actor 只接受与当前挂起状态匹配的 WakeId，过期唤醒直接丢弃。
//! 定时任务绑定在 Actor 的子 token 上，Actor 停止时全部取消；单个唤醒也可以通过返回的
//! `Wake` 提前取消（分析结束后的截止时间、停止循环后的 wait）。

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 唤醒 ID（同一个调度器内单调递增）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct WakeId(u64);

/// 一次已调度的唤醒：ID 加上它自己的取消 token
#[derive(Debug, Clone)]
#[must_use = "an unused Wake cannot be cancelled"]
pub struct Wake {
    id: WakeId,
    token: CancellationToken,
}

impl Wake {
    pub fn id(&self) -> WakeId {
        self.id
    }

    /// 取消尚未触发的定时任务；已投递的消息不受影响
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// 延迟消息调度器：向 Actor 自己的邮箱投递未来消息
///
/// 只持有邮箱的弱引用，不会让 Actor 的邮箱因定时器而保持打开。
pub struct WakeScheduler<M> {
    tx: mpsc::WeakUnboundedSender<M>,
    token: CancellationToken,
    next_id: u64,
}

impl<M: Send + 'static> WakeScheduler<M> {
    pub fn new(tx: mpsc::WeakUnboundedSender<M>, token: CancellationToken) -> Self {
        Self {
            tx,
            token,
            next_id: 0,
        }
    }

    /// delay 之后把 make(id) 投递到邮箱；返回可单独取消的唤醒
    pub fn schedule(&mut self, delay: Duration, make: impl FnOnce(WakeId) -> M) -> Wake {
        let id = WakeId(self.next_id);
        self.next_id += 1;
        let msg = make(id);
        let tx = self.tx.clone();
        let token = self.token.child_token();
        let wake = Wake {
            id,
            token: token.clone(),
        };
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(msg);
                    }
                }
            }
        });
        wake
    }
}
