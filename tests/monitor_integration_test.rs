//! Monitor 集成测试：通过 Hive 公共接口驱动脚本化决策引擎

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use hive::collector::Collector;
    use hive::config::AppConfig;
    use hive::core::{DecisionError, HiveError};
    use hive::decision::{ActionCall, DecisionRequest, ScriptStep, ScriptedEngine};
    use hive::events::{EventBus, EventName, HiveEvent};
    use hive::memory::{referenced_ids, SUMMARY_HEADER};
    use hive::model::MonitorState;
    use hive::monitor::RunOptions;
    use hive::sandbox::Callbacks;
    use hive::{Hive, HiveBuilder};
    use serde_json::{json, Map, Value};
    use tokio::sync::broadcast;

    /// 每次快照返回递增的 tick
    struct CountingCollector {
        ticks: AtomicUsize,
    }

    impl CountingCollector {
        fn new() -> Self {
            Self {
                ticks: AtomicUsize::new(0),
            }
        }
    }

    impl Collector for CountingCollector {
        fn title(&self) -> &str {
            "Memory"
        }

        fn description(&self) -> &str {
            "Resident memory of the service"
        }

        fn system_prompt(&self) -> &str {
            "Report sustained growth of rss_mb."
        }

        fn callback_docs(&self) -> &str {
            "rss_mb() -> number"
        }

        fn snapshot(&self) -> anyhow::Result<Map<String, Value>> {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
            let mut map = Map::new();
            map.insert("tick".to_string(), json!(tick));
            map.insert("rss_mb".to_string(), json!(512 + tick * 64));
            Ok(map)
        }

        fn callbacks(&self) -> Callbacks {
            Callbacks::new().with("rss_mb", |_| Ok(json!(512)))
        }
    }

    async fn hive_with(config: AppConfig, engine: Arc<ScriptedEngine>, bus: EventBus) -> Hive {
        HiveBuilder::new(config)
            .with_engine(engine)
            .with_bus(bus)
            .with_monitor("mem", Arc::new(CountingCollector::new()), false)
            .build()
            .await
            .unwrap()
    }

    fn snapshot_ids(request: &DecisionRequest) -> Vec<String> {
        referenced_ids(request.turns.iter().map(|m| m.content.as_str()))
            .into_iter()
            .filter(|id| id.starts_with("snap_"))
            .collect()
    }

    fn drain(rx: &mut broadcast::Receiver<HiveEvent>) -> Vec<HiveEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn count(events: &[HiveEvent], name: EventName) -> usize {
        events.iter().filter(|e| e.name == name).count()
    }

    #[tokio::test]
    async fn test_notification_references_second_snapshot() {
        let engine = Arc::new(
            ScriptedEngine::new()
                .act("take_snapshot", json!({}))
                .act("take_snapshot", json!({}))
                .dynamic(|req| {
                    let ids = snapshot_ids(req);
                    ActionCall::new(
                        "send_notification",
                        json!({
                            "type": "mem_high",
                            "summary": "rss grew by 64MB between snapshots",
                            "severity": "warning",
                            "snapshot_ids": [ids[1]]
                        }),
                    )
                })
                .act("done", json!({})),
        );
        let hive = hive_with(AppConfig::default(), engine, EventBus::new(64)).await;

        let produced = hive
            .run("mem", "rss alarm from upstream", RunOptions::new())
            .await
            .unwrap();
        assert_eq!(produced.len(), 1);

        let snapshots = hive.snapshots("mem", 10, 0).await.unwrap();
        assert_eq!(snapshots.len(), 2);
        // 最新的在前
        let second = &snapshots[0];
        assert_eq!(second.payload["tick"], json!(1));
        assert_eq!(produced[0].snapshot_ids, vec![second.id.clone()]);
        assert_eq!(produced[0].anomaly_type, "mem_high");

        assert_eq!(hive.notifications("mem").await.unwrap().len(), 1);
        hive.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_exhaustion_halts_loop() {
        let mut config = AppConfig::default();
        config.monitor.max_retries = 3;
        config.monitor.backoff_base_ms = 10;

        let engine = Arc::new(
            ScriptedEngine::new()
                .act(
                    "set_state",
                    json!({ "state": "warning", "reason": "rss trending up" }),
                )
                .fail(DecisionError::Transport("connection reset".to_string()))
                .fail(DecisionError::Timeout(Duration::from_secs(30)))
                .fail(DecisionError::Transport("connection reset".to_string())),
        );
        let bus = EventBus::new(256);
        let mut rx = bus.subscribe_events();
        let hive = hive_with(config, engine.clone(), bus).await;

        assert!(hive.start("mem").await.unwrap());
        tokio::time::sleep(Duration::from_millis(300)).await;

        let status = hive.status("mem").await.unwrap();
        assert!(!status.running);
        assert_eq!(status.state, MonitorState::Warning);

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventName::DecisionError), 3);
        assert_eq!(count(&events, EventName::LoopHalted), 1);
        assert_eq!(count(&events, EventName::StateChanged), 1);
        assert_eq!(engine.decide_calls(), 4);

        // 停机后仍可查询、可重启
        engine.push(ScriptStep::Act(ActionCall::new(
            "wait",
            json!({ "seconds": 60 }),
        )));
        assert!(hive.start("mem").await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(hive.status("mem").await.unwrap().running);
        hive.shutdown().await;
    }

    #[tokio::test]
    async fn test_compaction_replaces_context() {
        let mut config = AppConfig::default();
        config.monitor.context_max_tokens = 1;
        config.monitor.keep_last_turns = 1;

        let engine = Arc::new(
            ScriptedEngine::new()
                .with_summary("rss rising steadily, nothing sent yet")
                .act("think", json!({ "thought": "rss looks high" }))
                .act("think", json!({ "thought": "compare with baseline" }))
                .act("done", json!({})),
        );
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe_events();
        let hive = hive_with(config, engine.clone(), bus).await;

        hive.run("mem", "rss alarm from upstream", RunOptions::new())
            .await
            .unwrap();

        let requests = engine.requests();
        assert_eq!(requests.len(), 3);
        // 首轮只有 kickoff，无需压缩
        assert!(requests[0].turns[0].content.contains("rss alarm from upstream"));
        for request in &requests[1..] {
            let first = &request.turns[0].content;
            assert!(first.starts_with(SUMMARY_HEADER));
            assert!(first.contains("rss rising steadily"));
            assert_eq!(request.turns.len(), 2);
        }
        assert_eq!(engine.summarize_calls(), 2);

        let compacted: Vec<HiveEvent> = drain(&mut rx)
            .into_iter()
            .filter(|e| e.name == EventName::ContextCompacted)
            .collect();
        assert_eq!(compacted.len(), 2);
        assert_eq!(compacted[0].measurements["turns_before"], 3.0);
        assert_eq!(compacted[0].measurements["turns_after"], 2.0);
        // 第二次压缩基于已替换的上下文：摘要 + 1 条保留 + 新的 2 条
        assert_eq!(compacted[1].measurements["turns_before"], 4.0);
        assert_eq!(compacted[1].meta_str("monitor_id"), Some("mem"));
        hive.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_notification_has_no_effect() {
        let engine = Arc::new(
            ScriptedEngine::new()
                .act(
                    "send_notification",
                    json!({
                        "type": "mem_high",
                        "summary": "no evidence",
                        "severity": "critical",
                        "snapshot_ids": []
                    }),
                )
                .act(
                    "send_notification",
                    json!({
                        "type": "mem_high",
                        "summary": "made-up evidence",
                        "severity": "critical",
                        "snapshot_ids": ["snap_00000000-0000-0000-0000-000000000000"]
                    }),
                )
                .act("done", json!({})),
        );
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe_events();
        let hive = hive_with(AppConfig::default(), engine.clone(), bus).await;

        let produced = hive.run("mem", "", RunOptions::new()).await.unwrap();
        assert!(produced.is_empty());
        assert!(hive.notifications("mem").await.unwrap().is_empty());

        let events = drain(&mut rx);
        assert_eq!(count(&events, EventName::NotificationSent), 0);
        assert_eq!(count(&events, EventName::ValidationFailed), 2);

        // 错误已回灌到上下文，供下一轮自我纠正
        let last = engine.requests().pop().unwrap();
        let fed_back = last
            .turns
            .iter()
            .any(|m| m.content.contains("snap_00000000-0000-0000-0000-000000000000") && m.content.contains("error"));
        assert!(fed_back);
        hive.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_monitor_is_not_configured() {
        let engine = Arc::new(ScriptedEngine::new());
        let hive = hive_with(AppConfig::default(), engine, EventBus::new(16)).await;
        let err = hive
            .run("disk", "", RunOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HiveError::MonitorNotConfigured(id) if id == "disk"));
        assert!(matches!(
            hive.status("disk").await,
            Err(HiveError::MonitorNotConfigured(_))
        ));
        hive.shutdown().await;
    }

    #[tokio::test]
    async fn test_runs_are_served_in_order() {
        let engine = Arc::new(
            ScriptedEngine::new()
                .act("think", json!({ "thought": "first run" }))
                .act("done", json!({}))
                .act("done", json!({})),
        );
        let hive = hive_with(AppConfig::default(), engine.clone(), EventBus::new(64)).await;

        let (a, b) = tokio::join!(
            hive.run("mem", "alpha", RunOptions::new()),
            hive.run("mem", "beta", RunOptions::new()),
        );
        assert!(a.unwrap().is_empty());
        assert!(b.unwrap().is_empty());

        let requests = engine.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].turns[0].content.contains("alpha"));
        assert!(requests[1].turns[0].content.contains("alpha"));
        assert!(requests[2].turns[0].content.contains("beta"));
        hive.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_timeout_and_iteration_cap() {
        let engine = Arc::new(ScriptedEngine::new().hang());
        let hive = hive_with(AppConfig::default(), engine.clone(), EventBus::new(64)).await;

        let err = hive
            .run(
                "mem",
                "",
                RunOptions::new().with_timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HiveError::RunTimeout(_)));
        assert!(!hive.status("mem").await.unwrap().analysis_active);

        for _ in 0..5 {
            engine.push(ScriptStep::Act(ActionCall::new(
                "think",
                json!({ "thought": "still looking" }),
            )));
        }
        let produced = hive
            .run("mem", "", RunOptions::new().with_max_iterations(2))
            .await
            .unwrap();
        assert!(produced.is_empty());
        assert_eq!(engine.remaining(), 3);
        hive.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_action_fails_run() {
        let engine = Arc::new(ScriptedEngine::new().act("reboot_host", json!({})));
        let hive = hive_with(AppConfig::default(), engine, EventBus::new(64)).await;
        let err = hive.run("mem", "", RunOptions::new()).await.unwrap_err();
        assert!(matches!(
            err,
            HiveError::Decision(DecisionError::UnknownAction(name)) if name == "reboot_host"
        ));
        hive.shutdown().await;
    }

    #[tokio::test]
    async fn test_execute_uses_collector_callbacks() {
        let engine = Arc::new(
            ScriptedEngine::new()
                .act("execute", json!({ "script": "let r = rss_mb()\n{\"rss\": r}" }))
                .act("execute", json!({ "script": "missing()" }))
                .act("done", json!({})),
        );
        let hive = hive_with(AppConfig::default(), engine.clone(), EventBus::new(64)).await;
        hive.run("mem", "", RunOptions::new()).await.unwrap();

        let last = engine.requests().pop().unwrap();
        let results: Vec<&str> = last
            .turns
            .iter()
            .map(|m| m.content.as_str())
            .filter(|c| c.starts_with("Result of execute"))
            .collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].contains("\"ok\":true") && results[0].contains("512"));
        assert!(results[1].contains("\"ok\":false") && results[1].contains("unknown_function"));
        hive.shutdown().await;
    }
}
