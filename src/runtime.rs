//! 运行时：按 ID 注册 Monitor，持有 Coordinator 与事件总线
//!
//! Hive 是宿主进程唯一需要持有的对象：run / status 等调用按 monitor id 路由到对应 Actor，
//! 未注册的 id 直接返回 MonitorNotConfigured，不会隐式创建 Monitor。

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::{collector_from_name, Collector};
use crate::config::AppConfig;
use crate::coordinator::{CoordinatorActor, CoordinatorHandle, CoordinatorSettings};
use crate::core::{wait_for_signal, CoordinatorStatus, HiveError, MonitorStatus, ShutdownSignal};
use crate::decision::DecisionEngine;
use crate::events::{EventBus, HiveEvent};
use crate::model::{InboxEntry, Insight, Notification, NotificationStatus, Snapshot};
use crate::monitor::{MonitorActor, MonitorHandle, MonitorSettings, RunOptions};
use crate::sandbox::{CallScriptEvaluator, SandboxEvaluator};

struct MonitorRegistration {
    id: String,
    collector: Arc<dyn Collector>,
    engine: Option<Arc<dyn DecisionEngine>>,
    autostart: bool,
}

/// Hive 构建器
pub struct HiveBuilder {
    config: AppConfig,
    engine: Option<Arc<dyn DecisionEngine>>,
    coordinator_engine: Option<Arc<dyn DecisionEngine>>,
    sandbox: Option<Arc<dyn SandboxEvaluator>>,
    bus: Option<EventBus>,
    monitors: Vec<MonitorRegistration>,
}

impl HiveBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            engine: None,
            coordinator_engine: None,
            sandbox: None,
            bus: None,
            monitors: Vec::new(),
        }
    }

    /// 默认决策引擎（Monitor 与 Coordinator 共用，除非单独指定）
    pub fn with_engine(mut self, engine: Arc<dyn DecisionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_coordinator_engine(mut self, engine: Arc<dyn DecisionEngine>) -> Self {
        self.coordinator_engine = Some(engine);
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn SandboxEvaluator>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// 使用外部创建的事件总线（便于在 build 之前订阅）
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_monitor(
        mut self,
        id: impl Into<String>,
        collector: Arc<dyn Collector>,
        autostart: bool,
    ) -> Self {
        self.monitors.push(MonitorRegistration {
            id: id.into(),
            collector,
            engine: None,
            autostart,
        });
        self
    }

    /// 为某个已注册的 Monitor 单独指定决策引擎
    pub fn with_monitor_engine(mut self, id: &str, engine: Arc<dyn DecisionEngine>) -> Self {
        match self.monitors.iter_mut().find(|m| m.id == id) {
            Some(registration) => registration.engine = Some(engine),
            None => warn!(monitor_id = id, "Engine given for unregistered monitor, ignored"),
        }
        self
    }

    /// 注册配置文件 [[monitors]] 中的 Monitor；未知 collector 名返回 Config 错误
    pub fn with_configured_monitors(mut self) -> Result<Self, HiveError> {
        for entry in self.config.monitors.clone() {
            let collector = collector_from_name(&entry.collector).ok_or_else(|| {
                HiveError::Config(format!(
                    "Unknown collector '{}' for monitor '{}'",
                    entry.collector, entry.id
                ))
            })?;
            self = self.with_monitor(entry.id, collector, entry.autostart);
        }
        Ok(self)
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// 启动 Coordinator 与全部 Monitor；autostart 的 Monitor 立即进入持续循环
    pub async fn build(self) -> Result<Hive, HiveError> {
        let engine = self
            .engine
            .ok_or_else(|| HiveError::Config("No decision engine configured".to_string()))?;
        let mut seen = std::collections::HashSet::new();
        for registration in &self.monitors {
            if !seen.insert(registration.id.as_str()) {
                return Err(HiveError::Config(format!(
                    "Duplicate monitor id '{}'",
                    registration.id
                )));
            }
        }

        let root = CancellationToken::new();
        let bus = self
            .bus
            .unwrap_or_else(|| EventBus::new(self.config.events.capacity));
        let sandbox = self
            .sandbox
            .unwrap_or_else(|| Arc::new(CallScriptEvaluator::from_config(&self.config.sandbox)));

        let coordinator = CoordinatorActor::spawn(
            self.coordinator_engine.unwrap_or_else(|| engine.clone()),
            CoordinatorSettings::from_config(&self.config.coordinator),
            bus.clone(),
            &root,
        );

        let settings = MonitorSettings::from_config(&self.config.monitor);
        let mut monitors = HashMap::new();
        for registration in self.monitors {
            let handle = MonitorActor::spawn(
                registration.id.clone(),
                registration.collector,
                registration.engine.unwrap_or_else(|| engine.clone()),
                sandbox.clone(),
                settings.clone(),
                bus.clone(),
                &root,
            );
            if registration.autostart {
                handle.start().await?;
            }
            info!(monitor_id = %registration.id, autostart = registration.autostart, "Monitor registered");
            monitors.insert(registration.id, handle);
        }

        Ok(Hive {
            monitors,
            coordinator,
            bus,
            root,
        })
    }
}

/// 运行中的 Hive
pub struct Hive {
    monitors: HashMap<String, MonitorHandle>,
    coordinator: CoordinatorHandle,
    bus: EventBus,
    root: CancellationToken,
}

impl Hive {
    pub fn builder(config: AppConfig) -> HiveBuilder {
        HiveBuilder::new(config)
    }

    fn monitor(&self, id: &str) -> Result<&MonitorHandle, HiveError> {
        let handle = self
            .monitors
            .get(id)
            .ok_or_else(|| HiveError::MonitorNotConfigured(id.to_string()))?;
        if !handle.is_alive() {
            return Err(HiveError::MonitorNotRunning(id.to_string()));
        }
        Ok(handle)
    }

    pub fn monitor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.monitors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 有界分析：返回期间产生的通知
    pub async fn run(
        &self,
        monitor_id: &str,
        trigger: impl Into<String>,
        options: RunOptions,
    ) -> Result<Vec<Notification>, HiveError> {
        self.monitor(monitor_id)?.run(trigger, options).await
    }

    pub async fn status(&self, monitor_id: &str) -> Result<MonitorStatus, HiveError> {
        self.monitor(monitor_id)?.status().await
    }

    pub async fn coordinator_status(&self) -> Result<CoordinatorStatus, HiveError> {
        self.coordinator.status().await
    }

    /// 启动（或在停机后重启）持续循环
    pub async fn start(&self, monitor_id: &str) -> Result<bool, HiveError> {
        self.monitor(monitor_id)?.start().await
    }

    pub async fn stop(&self, monitor_id: &str) -> Result<(), HiveError> {
        self.monitor(monitor_id)?.stop().await
    }

    pub async fn notifications(&self, monitor_id: &str) -> Result<Vec<Notification>, HiveError> {
        self.monitor(monitor_id)?.notifications().await
    }

    pub async fn snapshots(
        &self,
        monitor_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Snapshot>, HiveError> {
        self.monitor(monitor_id)?.snapshots(limit, offset).await
    }

    pub async fn inbox(
        &self,
        filter: Option<NotificationStatus>,
    ) -> Result<Vec<InboxEntry>, HiveError> {
        self.coordinator.inbox(filter).await
    }

    pub async fn insights(&self) -> Result<Vec<Insight>, HiveError> {
        self.coordinator.insights().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<HiveEvent> {
        self.bus.subscribe_events()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// 并发关闭全部 Actor（取消在途决策调用），最后取消根 token
    pub async fn shutdown(&self) {
        let monitors = self.monitors.values().map(|handle| async move {
            if let Err(e) = handle.shutdown().await {
                debug!(monitor_id = handle.id(), error = %e, "Monitor already stopped");
            }
        });
        let coordinator = async {
            if let Err(e) = self.coordinator.shutdown().await {
                debug!(error = %e, "Coordinator already stopped");
            }
        };
        futures_util::join!(join_all(monitors), coordinator);
        self.root.cancel();
        info!("Hive shut down");
    }

    /// 根 token 的克隆：取消它等同于请求关闭
    pub fn shutdown_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// 阻塞到 Ctrl+C / SIGTERM（或根 token 被取消），然后执行 shutdown
    pub async fn run_until_shutdown(&self) -> ShutdownSignal {
        let signal = wait_for_signal(&self.root).await;
        info!(signal = %signal, "Shutdown requested");
        self.shutdown().await;
        signal
    }
}
