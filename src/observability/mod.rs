//! 可观测性：日志初始化与事件流镜像

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::events::{EventBus, EventName, HiveEvent};

/// 安装全局 subscriber；RUST_LOG 优先，否则使用 default_filter（如 "info"）
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// 订阅事件流，把每条结构化事件写成一条 tracing 记录，直到 token 取消
pub fn spawn_event_logger(bus: &EventBus, token: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe_events();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event logger lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

fn log_event(event: &HiveEvent) {
    let measurements = serde_json::to_string(&event.measurements).unwrap_or_default();
    let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
    match event.name {
        EventName::DecisionError | EventName::ValidationFailed => tracing::warn!(
            target: "hive::events",
            event = %event.name,
            %measurements,
            %metadata
        ),
        EventName::LoopHalted => tracing::error!(
            target: "hive::events",
            event = %event.name,
            %measurements,
            %metadata
        ),
        EventName::ActionExecuted | EventName::ContextCompacted => tracing::debug!(
            target: "hive::events",
            event = %event.name,
            %measurements,
            %metadata
        ),
        _ => tracing::info!(
            target: "hive::events",
            event = %event.name,
            %measurements,
            %metadata
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_event_logger_stops_on_cancel() {
        let bus = EventBus::new(8);
        let token = CancellationToken::new();
        let task = spawn_event_logger(&bus, token.clone());
        bus.emit(HiveEvent::new(EventName::MonitorStarted).meta("monitor_id", "host"));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
