//! CoordinatorHandle：与 Coordinator Actor 通信的入口

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::CoordinatorSection;
use crate::core::{CoordinatorStatus, HiveError, RecoveryEngine, WakeId};
use crate::decision::{CallId, DecisionCycle};
use crate::memory::ContextCompactor;
use crate::model::{InboxEntry, Insight, NotificationStatus};

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub decision_timeout: Duration,
    pub recovery: RecoveryEngine,
    pub compactor: ContextCompactor,
    /// 单轮分析的迭代上限，达到后按 done 处理
    pub max_iterations: u32,
}

impl CoordinatorSettings {
    pub fn from_config(cfg: &CoordinatorSection) -> Self {
        Self {
            decision_timeout: cfg.decision_timeout(),
            recovery: RecoveryEngine::new(cfg.max_retries, cfg.backoff_base()),
            compactor: ContextCompactor::new(cfg.context_max_tokens, cfg.keep_last_turns),
            max_iterations: cfg.max_iterations,
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&CoordinatorSection::default())
    }
}

pub(crate) enum CoordinatorMsg {
    Status {
        reply: oneshot::Sender<CoordinatorStatus>,
    },
    Inbox {
        filter: Option<NotificationStatus>,
        reply: oneshot::Sender<Vec<InboxEntry>>,
    },
    Insights {
        reply: oneshot::Sender<Vec<Insight>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    Decided {
        call: CallId,
        cycle: DecisionCycle,
    },
    /// 退避结束
    Wake {
        wake: WakeId,
    },
}

#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorMsg>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<CoordinatorMsg>) -> Self {
        Self { tx }
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMsg,
    ) -> Result<T, HiveError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| HiveError::CoordinatorNotRunning)?;
        rx.await.map_err(|_| HiveError::CoordinatorNotRunning)
    }

    pub async fn status(&self) -> Result<CoordinatorStatus, HiveError> {
        self.request(|reply| CoordinatorMsg::Status { reply }).await
    }

    /// 按到达顺序；filter 为 None 时返回全部
    pub async fn inbox(
        &self,
        filter: Option<NotificationStatus>,
    ) -> Result<Vec<InboxEntry>, HiveError> {
        self.request(|reply| CoordinatorMsg::Inbox { filter, reply })
            .await
    }

    pub async fn insights(&self) -> Result<Vec<Insight>, HiveError> {
        self.request(|reply| CoordinatorMsg::Insights { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), HiveError> {
        self.request(|reply| CoordinatorMsg::Shutdown { reply }).await
    }
}
