//! Coordinator Actor：汇总所有 Monitor 的通知并产出 Insight
//!
//! 启动时订阅事件总线。空闲时收到新通知即开始一轮分析；done 时若仍有 unread 条目，
//! 立即以全新上下文再开一轮，否则回到空闲。

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::handle::{CoordinatorHandle, CoordinatorMsg, CoordinatorSettings};
use crate::coordinator::inbox::Inbox;
use crate::coordinator::prompt;
use crate::coordinator::CoordinatorAction;
use crate::core::{
    ActionError, CoordinatorStatus, DecisionError, RecoveryAction, ReferenceKind, Supervisor,
    Wake, WakeScheduler,
};
use crate::decision::{
    coordinator_action_schema, decode_action, spawn_decision_cycle, ActionCall, ActionVocabulary,
    CallId, DecisionCycle, DecisionEngine, DecisionRequest, DecodeError, InFlightCall,
};
use crate::events::{EventBus, EventName, HiveEvent};
use crate::memory::{ContextWindow, Message};
use crate::model::{Insight, Notification};

#[derive(Debug, Default)]
struct Pass {
    context: ContextWindow,
    iteration: u64,
    failures: u32,
    backoff: Option<Wake>,
}

impl Pass {
    fn fresh(kickoff: String) -> Self {
        let mut context = ContextWindow::new();
        context.push(Message::user(kickoff));
        Self {
            context,
            ..Default::default()
        }
    }
}

enum Outcome {
    Continue,
    Done,
}

pub struct CoordinatorActor {
    engine: Arc<dyn DecisionEngine>,
    settings: CoordinatorSettings,
    bus: EventBus,
    supervisor: Supervisor,
    tx: mpsc::WeakUnboundedSender<CoordinatorMsg>,
    scheduler: WakeScheduler<CoordinatorMsg>,
    schema: Value,

    inbox: Inbox,
    insights: Vec<Insight>,
    running: bool,
    pass: Pass,
    in_flight: Option<InFlightCall>,
}

impl CoordinatorActor {
    /// 创建并启动 Coordinator；返回前已完成总线订阅，之后发布的通知不会丢失
    pub fn spawn(
        engine: Arc<dyn DecisionEngine>,
        settings: CoordinatorSettings,
        bus: EventBus,
        parent: &CancellationToken,
    ) -> CoordinatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::with_parent(parent);
        let notifications = bus.subscribe_notifications();

        let actor = CoordinatorActor {
            engine,
            settings,
            bus,
            scheduler: WakeScheduler::new(tx.downgrade(), supervisor.child_token()),
            supervisor,
            tx: tx.downgrade(),
            schema: coordinator_action_schema(),
            inbox: Inbox::new(),
            insights: Vec::new(),
            running: false,
            pass: Pass::default(),
            in_flight: None,
        };
        tokio::spawn(actor.run(rx, notifications));
        CoordinatorHandle::new(tx)
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<CoordinatorMsg>,
        mut notifications: mpsc::UnboundedReceiver<Notification>,
    ) {
        let token = self.supervisor.cancel_token();
        loop {
            // 先处理总线上的通知，再处理决策完成
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    self.teardown();
                    break;
                }
                Some(notification) = notifications.recv() => self.on_notification(notification),
                msg = rx.recv() => match msg {
                    Some(CoordinatorMsg::Shutdown { reply }) => {
                        self.teardown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(msg) => self.handle(msg).await,
                    None => {
                        self.teardown();
                        break;
                    }
                },
            }
            self.advance();
        }
        debug!("Coordinator actor exited");
    }

    async fn handle(&mut self, msg: CoordinatorMsg) {
        match msg {
            CoordinatorMsg::Status { reply } => {
                let _ = reply.send(self.status());
            }
            CoordinatorMsg::Inbox { filter, reply } => {
                let _ = reply.send(self.inbox.list(filter));
            }
            CoordinatorMsg::Insights { reply } => {
                let _ = reply.send(self.insights.clone());
            }
            CoordinatorMsg::Decided { call, cycle } => self.on_decided(call, cycle).await,
            CoordinatorMsg::Wake { wake } => {
                if matches!(&self.pass.backoff, Some(pending) if pending.id() == wake) {
                    self.pass.backoff = None;
                }
            }
            // 在主循环中处理
            CoordinatorMsg::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn emit(&self, event: HiveEvent) {
        self.bus.emit(event.meta("actor", "coordinator"));
    }

    fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            running: self.running,
            notification_count: self.inbox.len(),
            unread_count: self.inbox.unread_count(),
            iteration: self.pass.iteration,
            insight_count: self.insights.len(),
        }
    }

    fn teardown(&mut self) {
        self.supervisor.cancel();
        if let Some(call) = self.in_flight.take() {
            call.cancel();
        }
        self.running = false;
    }

    fn on_notification(&mut self, notification: Notification) {
        let id = notification.id.clone();
        let monitor_id = notification.monitor_id.clone();
        if !self.inbox.insert(notification) {
            debug!(notification_id = %id, "Duplicate notification ignored");
            return;
        }
        debug!(notification_id = %id, monitor_id = %monitor_id, "Notification received");
        if !self.running {
            self.begin_pass();
            info!(unread = self.inbox.unread_count(), "Coordinator running");
            self.emit(
                HiveEvent::new(EventName::CoordinatorRunning)
                    .measure("unread", self.inbox.unread_count() as f64),
            );
        }
    }

    fn begin_pass(&mut self) {
        if let Some(pending) = self.pass.backoff.take() {
            pending.cancel();
        }
        self.running = true;
        self.pass = Pass::fresh(prompt::kickoff(&self.inbox));
    }

    fn advance(&mut self) {
        if !self.running
            || self.in_flight.is_some()
            || self.pass.backoff.is_some()
            || self.supervisor.is_cancelled()
        {
            return;
        }
        let request = DecisionRequest {
            system_prompt: prompt::system_prompt(
                &self.inbox,
                self.insights.len(),
                self.pass.iteration,
            ),
            turns: self.pass.context.messages().to_vec(),
            schema: self.schema.clone(),
        };
        let tx = self.tx.clone();
        let call = spawn_decision_cycle(
            self.engine.clone(),
            self.settings.compactor.clone(),
            request,
            self.settings.decision_timeout,
            &self.supervisor.cancel_token(),
            move |call, cycle| {
                if let Some(tx) = tx.upgrade() {
                    let _ = tx.send(CoordinatorMsg::Decided { call, cycle });
                }
            },
        );
        debug!(call = call.id().as_u64(), "Coordinator decision dispatched");
        self.in_flight = Some(call);
    }

    async fn on_decided(&mut self, call: CallId, cycle: DecisionCycle) {
        if !matches!(&self.in_flight, Some(flight) if flight.id() == call) {
            debug!(call = call.as_u64(), "Stale decision ignored");
            return;
        }
        self.in_flight = None;
        if !self.running {
            return;
        }

        if let Some(turns) = cycle.compacted {
            let before = self.pass.context.len();
            self.pass.context.replace(turns);
            self.emit(
                HiveEvent::new(EventName::ContextCompacted)
                    .measure("turns_before", before as f64)
                    .measure("turns_after", self.pass.context.len() as f64),
            );
        }

        match cycle.result {
            Ok(call) => {
                self.pass.failures = 0;
                let outcome = self.execute(call);
                let capped = self.pass.iteration >= u64::from(self.settings.max_iterations);
                // on_failure 可能已使本轮停机
                if self.running && (matches!(outcome, Outcome::Done) || capped) {
                    if capped {
                        info!(iteration = self.pass.iteration, "Coordinator pass reached iteration cap");
                    }
                    self.finish_pass();
                }
            }
            Err(err) => self.on_failure(err),
        }
    }

    /// 一轮结束：仍有 unread 则立即重开，否则空闲
    fn finish_pass(&mut self) {
        let unread = self.inbox.unread_count();
        if unread > 0 {
            info!(unread, "Unread notifications remain, starting a new pass");
            self.begin_pass();
        } else {
            self.running = false;
            info!(insights = self.insights.len(), "Coordinator idle");
            self.emit(
                HiveEvent::new(EventName::CoordinatorIdle)
                    .measure("notifications", self.inbox.len() as f64)
                    .measure("insights", self.insights.len() as f64)
                    .meta("reason", "done"),
            );
        }
    }

    fn on_failure(&mut self, err: DecisionError) {
        self.pass.failures += 1;
        let attempt = self.pass.failures;
        let event = HiveEvent::new(EventName::DecisionError)
            .measure("attempt", f64::from(attempt))
            .meta("error", err.to_string());

        match self.settings.recovery.handle(&err, attempt) {
            RecoveryAction::Retry { delay, .. } => {
                warn!(attempt, delay = ?delay, error = %err, "Coordinator decision failed, backing off");
                self.emit(event.measure("delay_ms", delay.as_millis() as f64));
                let wake = self
                    .scheduler
                    .schedule(delay, |wake| CoordinatorMsg::Wake { wake });
                self.pass.backoff = Some(wake);
            }
            RecoveryAction::Halt { .. } | RecoveryAction::Fail => {
                error!(attempts = attempt, error = %err, "Coordinator loop halted");
                self.emit(event);
                self.emit(
                    HiveEvent::new(EventName::LoopHalted)
                        .measure("attempts", f64::from(attempt))
                        .meta("error", err.to_string()),
                );
                // 下一条通知到达时重新开始
                self.running = false;
                self.emit(
                    HiveEvent::new(EventName::CoordinatorIdle)
                        .measure("notifications", self.inbox.len() as f64)
                        .measure("insights", self.insights.len() as f64)
                        .meta("reason", "halted"),
                );
            }
        }
    }

    fn execute(&mut self, call: ActionCall) -> Outcome {
        let action: CoordinatorAction = match decode_action(&call) {
            Ok(action) => action,
            Err(DecodeError::Unknown(name)) => {
                self.on_failure(DecisionError::UnknownAction(name));
                return Outcome::Continue;
            }
            Err(DecodeError::Invalid(message)) => {
                self.record_call(&call);
                let err = ActionError::InvalidArguments {
                    action: call.action.clone(),
                    message,
                };
                self.reject(&call.action, &err);
                return Outcome::Continue;
            }
        };

        self.record_call(&call);
        let name = action.name();
        match self.perform(action) {
            Ok((result, outcome)) => {
                debug!(action = name, "Coordinator action executed");
                self.pass
                    .context
                    .push(Message::user(format!("Result of {}: {}", name, result)));
                self.emit(
                    HiveEvent::new(EventName::ActionExecuted)
                        .measure("iteration", self.pass.iteration as f64)
                        .meta("action", name),
                );
                outcome
            }
            Err(err) => {
                self.reject(name, &err);
                Outcome::Continue
            }
        }
    }

    fn record_call(&mut self, call: &ActionCall) {
        self.pass
            .context
            .push(Message::assistant(serde_json::to_string(call).unwrap_or_default()));
        self.pass.iteration += 1;
    }

    fn reject(&mut self, action: &str, err: &ActionError) {
        warn!(action, error = %err, "Coordinator action rejected");
        self.pass.context.push(Message::user(
            json!({ "action": action, "error": err.to_string() }).to_string(),
        ));
        self.emit(
            HiveEvent::new(EventName::ValidationFailed)
                .meta("action", action)
                .meta("error", err.to_string()),
        );
    }

    fn perform(&mut self, action: CoordinatorAction) -> Result<(Value, Outcome), ActionError> {
        match action {
            CoordinatorAction::GetNotifications { status } => {
                let entries = self.inbox.list(status);
                Ok((
                    json!({ "count": entries.len(), "entries": entries }),
                    Outcome::Continue,
                ))
            }
            CoordinatorAction::UpdateNotificationStatuses {
                ids,
                status,
                reason,
            } => {
                let update = self.inbox.update_statuses(&ids, status, reason.as_deref());
                if !update.unknown.is_empty() {
                    debug!(unknown = ?update.unknown, "Unknown notification ids ignored");
                }
                self.emit(
                    HiveEvent::new(EventName::NotificationStatusUpdated)
                        .measure("applied", update.applied.len() as f64)
                        .measure("unknown", update.unknown.len() as f64)
                        .meta("status", status.as_str())
                        .meta("ids", json!(update.applied)),
                );
                Ok((
                    serde_json::to_value(&update).unwrap_or_default(),
                    Outcome::Continue,
                ))
            }
            CoordinatorAction::ProduceInsight {
                notification_ids,
                correlation_kind,
                summary,
                hypothesis,
                confidence,
            } => {
                let missing: Vec<String> = self
                    .inbox
                    .missing(&notification_ids)
                    .into_iter()
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(ActionError::MissingReference {
                        kind: ReferenceKind::Notification,
                        missing,
                    });
                }
                let insight = Insight::new(
                    notification_ids,
                    correlation_kind,
                    summary,
                    hypothesis,
                    confidence,
                )?;
                let resolved = self
                    .inbox
                    .resolve(&insight.notification_ids, &format!("correlated in {}", insight.id));
                info!(
                    insight_id = %insight.id,
                    notifications = insight.notification_ids.len(),
                    "Insight produced"
                );
                self.emit(
                    HiveEvent::new(EventName::InsightProduced)
                        .measure("notifications", insight.notification_ids.len() as f64)
                        .measure("resolved", resolved.applied.len() as f64)
                        .meta("insight_id", insight.id.clone())
                        .meta("summary", insight.summary.clone())
                        .meta("correlation_kind", json!(insight.kind))
                        .meta("confidence", json!(insight.confidence)),
                );
                let result = json!({
                    "insight_id": insight.id,
                    "resolved": resolved.applied,
                });
                self.insights.push(insight);
                Ok((result, Outcome::Continue))
            }
            CoordinatorAction::Think { thought } => {
                debug!(thought = %thought, "Coordinator think");
                Ok((json!({ "recorded": true }), Outcome::Continue))
            }
            CoordinatorAction::Done {} => Ok((
                json!({ "unread": self.inbox.unread_count() }),
                Outcome::Done,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ScriptedEngine;
    use crate::model::Severity;
    use std::time::Duration;

    fn notification(monitor: &str) -> Notification {
        Notification::new(
            monitor,
            "errors",
            "error rate rising",
            Severity::Warning,
            vec!["snap_1".to_string()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_idle_until_notification() {
        let engine = Arc::new(ScriptedEngine::new().act("done", json!({})));
        let bus = EventBus::new(16);
        let root = CancellationToken::new();
        let handle = CoordinatorActor::spawn(
            engine.clone(),
            CoordinatorSettings::default(),
            bus.clone(),
            &root,
        );

        let status = handle.status().await.unwrap();
        assert!(!status.running);
        assert_eq!(engine.decide_calls(), 0);

        bus.publish_notification(&notification("api"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // done 时仍有 unread：立即重开一轮，迭代归零
        let status = handle.status().await.unwrap();
        assert!(status.running);
        assert_eq!(status.iteration, 0);
        assert_eq!(status.unread_count, 1);
    }

    #[tokio::test]
    async fn test_done_with_empty_inbox_goes_idle() {
        let n = notification("api");
        let engine = Arc::new(
            ScriptedEngine::new()
                .act(
                    "update_notification_statuses",
                    json!({ "ids": [n.id.clone()], "status": "acknowledged" }),
                )
                .act("done", json!({})),
        );
        let bus = EventBus::new(16);
        let mut events = bus.subscribe_events();
        let root = CancellationToken::new();
        let handle =
            CoordinatorActor::spawn(engine, CoordinatorSettings::default(), bus.clone(), &root);

        bus.publish_notification(&n);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = handle.status().await.unwrap();
        assert!(!status.running);
        assert_eq!(status.unread_count, 0);

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.name);
        }
        assert!(names.contains(&EventName::CoordinatorRunning));
        assert!(names.contains(&EventName::NotificationStatusUpdated));
        assert_eq!(names.last(), Some(&EventName::CoordinatorIdle));
    }
}
