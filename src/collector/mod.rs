//! Collector：被监控子系统的数据来源
//!
//! 每个 Monitor 绑定一个 Collector：snapshot() 提供廉价的状态快照，
//! callbacks() 提供给沙箱脚本的只读查询函数，其余为构造 prompt 用的静态说明。

pub mod host;

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::sandbox::Callbacks;

pub use host::HostCollector;

pub trait Collector: Send + Sync {
    fn title(&self) -> &str;

    fn description(&self) -> &str;

    /// 该子系统的分析指引（拼入 Monitor 的 system prompt）
    fn system_prompt(&self) -> &str;

    /// 回调函数说明
    fn callback_docs(&self) -> &str;

    /// 当前状态快照；应足够廉价，每次 take_snapshot 都会调用
    fn snapshot(&self) -> anyhow::Result<Map<String, Value>>;

    fn callbacks(&self) -> Callbacks;
}

/// 按名称解析内置 Collector（对应配置中的 [[monitors]].collector）
pub fn collector_from_name(name: &str) -> Option<Arc<dyn Collector>> {
    match name {
        "host" => Some(Arc::new(HostCollector::new())),
        _ => None,
    }
}
