//! Hive - Rust 自主监控智能体运行时
//!
//! 入口：初始化日志、加载配置、创建决策引擎并注册 Monitor，运行直到 Ctrl+C / SIGTERM。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use hive::collector::HostCollector;
use hive::config::{load_config, AppConfig};
use hive::decision::LlmDecisionEngine;
use hive::llm::create_llm_from_config;
use hive::{observability, HiveBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init("info");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    };

    let llm = create_llm_from_config(&config);
    let engine = Arc::new(LlmDecisionEngine::new(llm));

    let mut builder = HiveBuilder::new(config.clone()).with_engine(engine);
    builder = builder
        .with_configured_monitors()
        .context("Failed to register monitors")?;
    if builder.monitor_count() == 0 {
        tracing::info!("No monitors configured, watching the local host");
        builder = builder.with_monitor("host", Arc::new(HostCollector::new()), true);
    }

    let hive = builder.build().await.context("Failed to start hive")?;

    let logger = observability::spawn_event_logger(hive.bus(), hive.shutdown_token());

    tracing::info!(
        app = config.app.name.as_deref().unwrap_or("hive"),
        monitors = ?hive.monitor_ids(),
        "Hive running, press Ctrl+C to stop"
    );
    let signal = hive.run_until_shutdown().await;
    tracing::info!(signal = %signal, "Stopped");
    let _ = logger.await;
    Ok(())
}
