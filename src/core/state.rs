//! 状态投影：MonitorStatus / CoordinatorStatus
//!
//! Actor 内部状态只由自身循环修改；对外查询时投影成轻量、可序列化的快照。

use serde::Serialize;

use crate::model::MonitorState;

/// Monitor 状态查询结果
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub monitor_id: String,
    pub state: MonitorState,
    /// 持续循环是否在运行（重试耗尽后为 false，等待外部重启）
    pub running: bool,
    /// 当前分析窗口内的迭代次数
    pub iteration: u64,
    /// 是否正在处理一次有界分析（run）
    pub analysis_active: bool,
    /// 排队等待的有界分析请求数
    pub queued_runs: usize,
    pub snapshot_count: usize,
    pub notification_count: usize,
}

/// Coordinator 状态查询结果
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoordinatorStatus {
    pub running: bool,
    pub notification_count: usize,
    pub unread_count: usize,
    pub iteration: u64,
    pub insight_count: usize,
}
