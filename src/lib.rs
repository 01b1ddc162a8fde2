//! Hive - Rust 自主监控智能体运行时
//!
//! 模块划分：
//! - **collector**: 子系统采集器契约（快照 + 只读回调）与内置 host 采集器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **coordinator**: 跨 Monitor 的通知收件箱与关联分析循环（产出 Insight）
//! - **core**: 错误与恢复、状态投影、取消监管、延迟唤醒、优雅关闭
//! - **decision**: 决策引擎边界（LLM 适配 / 脚本化引擎）、动作 Schema、后台可取消调用
//! - **events**: 进程内事件总线（通知投递 + 可观测事件流）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 上下文轮次、Token 估算与上下文压缩
//! - **model**: Snapshot / Notification / InboxEntry / Insight 数据模型
//! - **monitor**: 每个子系统一个的 Monitor Actor（状态机 + 动作分发）
//! - **observability**: 日志初始化与事件流镜像
//! - **runtime**: 按 ID 注册的运行时（Hive），对外提供 run / status 等入口
//! - **sandbox**: 受限脚本求值器（仅可调用注册的只读回调）

pub mod collector;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod decision;
pub mod events;
pub mod llm;
pub mod memory;
pub mod model;
pub mod monitor;
pub mod observability;
pub mod runtime;
pub mod sandbox;

pub use runtime::{Hive, HiveBuilder};
