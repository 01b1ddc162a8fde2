//! MonitorHandle：与 Monitor Actor 通信的唯一入口（邮箱 + oneshot 回复）

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::MonitorSection;
use crate::core::{HiveError, MonitorStatus, RecoveryEngine, WakeId};
use crate::decision::{CallId, DecisionCycle};
use crate::memory::ContextCompactor;
use crate::model::{Notification, Snapshot};

/// Monitor 运行参数（由 [monitor] 配置段生成）
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub decision_timeout: Duration,
    pub recovery: RecoveryEngine,
    pub compactor: ContextCompactor,
    pub snapshot_cap: usize,
    pub notification_cap: usize,
    pub max_wait: Duration,
    pub run_max_iterations: u32,
    pub run_timeout: Duration,
}

impl MonitorSettings {
    pub fn from_config(cfg: &MonitorSection) -> Self {
        Self {
            decision_timeout: cfg.decision_timeout(),
            recovery: RecoveryEngine::new(cfg.max_retries, cfg.backoff_base()),
            compactor: ContextCompactor::new(cfg.context_max_tokens, cfg.keep_last_turns),
            snapshot_cap: cfg.snapshot_cap,
            notification_cap: cfg.notification_cap,
            max_wait: cfg.max_wait(),
            run_max_iterations: cfg.run_max_iterations,
            run_timeout: cfg.run_timeout(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&MonitorSection::default())
    }
}

/// 有界分析的选项；未设置的字段取 MonitorSettings 中的默认值
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    pub max_iterations: Option<u32>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }
}

pub(crate) type RunReply = oneshot::Sender<Result<Vec<Notification>, HiveError>>;

pub(crate) struct RunRequest {
    pub trigger: String,
    pub options: RunOptions,
    pub reply: RunReply,
}

/// Monitor 邮箱消息
pub(crate) enum MonitorMsg {
    /// 启动持续循环；已在运行时回复 false
    Start { reply: oneshot::Sender<bool> },
    /// 停止持续循环（Actor 保持可查询、可重启）
    Stop { reply: oneshot::Sender<()> },
    /// 拆除 Actor
    Shutdown { reply: oneshot::Sender<()> },
    Run(RunRequest),
    Status { reply: oneshot::Sender<MonitorStatus> },
    Snapshots {
        limit: usize,
        offset: usize,
        reply: oneshot::Sender<Vec<Snapshot>>,
    },
    Notifications { reply: oneshot::Sender<Vec<Notification>> },
    /// 后台决策调用完成
    Decided { call: CallId, cycle: DecisionCycle },
    /// wait / 退避结束
    Wake { wake: WakeId },
    /// 有界分析超时
    RunDeadline { run: u64 },
}

#[derive(Clone, Debug)]
pub struct MonitorHandle {
    id: String,
    tx: mpsc::UnboundedSender<MonitorMsg>,
}

impl MonitorHandle {
    pub(crate) fn new(id: String, tx: mpsc::UnboundedSender<MonitorMsg>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    fn not_running(&self) -> HiveError {
        HiveError::MonitorNotRunning(self.id.clone())
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> MonitorMsg,
    ) -> Result<T, HiveError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| self.not_running())?;
        rx.await.map_err(|_| self.not_running())
    }

    /// 启动（或在停机后重启）持续循环；返回是否由本次调用启动
    pub async fn start(&self) -> Result<bool, HiveError> {
        self.request(|reply| MonitorMsg::Start { reply }).await
    }

    pub async fn stop(&self) -> Result<(), HiveError> {
        self.request(|reply| MonitorMsg::Stop { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), HiveError> {
        self.request(|reply| MonitorMsg::Shutdown { reply }).await
    }

    /// 有界分析：排队执行，直到 done 或迭代上限，返回期间产生的 Notification
    pub async fn run(
        &self,
        trigger: impl Into<String>,
        options: RunOptions,
    ) -> Result<Vec<Notification>, HiveError> {
        let trigger = trigger.into();
        self.request(|reply| {
            MonitorMsg::Run(RunRequest {
                trigger,
                options,
                reply,
            })
        })
        .await?
    }

    pub async fn status(&self) -> Result<MonitorStatus, HiveError> {
        self.request(|reply| MonitorMsg::Status { reply }).await
    }

    /// 最新的在前
    pub async fn snapshots(&self, limit: usize, offset: usize) -> Result<Vec<Snapshot>, HiveError> {
        self.request(|reply| MonitorMsg::Snapshots {
            limit,
            offset,
            reply,
        })
        .await
    }

    pub async fn notifications(&self) -> Result<Vec<Notification>, HiveError> {
        self.request(|reply| MonitorMsg::Notifications { reply }).await
    }
}
