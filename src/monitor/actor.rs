//! Monitor Actor：单个子系统的决策循环
//!
//! Actor 独占自己的状态，只通过邮箱消息与外界交互。每次最多一个决策调用在途，
//! 调用在后台执行，完成后以 Decided 消息回到邮箱；wait 与退避都是延迟投递的 Wake 消息。
//! 有界分析（run）排队按到达顺序执行，期间持续循环让出决策机会。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collector::Collector;
use crate::core::{
    ActionError, DecisionError, HiveError, MonitorStatus, RecoveryAction, ReferenceKind,
    Supervisor, Wake, WakeId, WakeScheduler,
};
use crate::decision::{
    decode_action, monitor_action_schema, spawn_decision_cycle, ActionCall, ActionVocabulary,
    CallId, DecisionCycle, DecisionEngine, DecisionRequest, DecodeError, InFlightCall,
};
use crate::events::{EventBus, EventName, HiveEvent};
use crate::memory::{ContextWindow, Message};
use crate::model::{MonitorState, Notification, Snapshot};
use crate::monitor::handle::{MonitorMsg, RunReply, RunRequest};
use crate::monitor::history::{NotificationHistory, SnapshotHistory};
use crate::monitor::prompt::{self, Mode};
use crate::monitor::{MonitorAction, MonitorHandle, MonitorSettings};
use crate::sandbox::{Callbacks, SandboxEvaluator};

/// 会话挂起原因（带唤醒，过期唤醒被忽略）
#[derive(Debug, Clone)]
enum Pause {
    Wait(Wake),
    Backoff(Wake),
}

impl Pause {
    fn wake(&self) -> &Wake {
        match self {
            Pause::Wait(wake) | Pause::Backoff(wake) => wake,
        }
    }

    fn is_backoff(&self, id: WakeId) -> bool {
        matches!(self, Pause::Backoff(wake) if wake.id() == id)
    }
}

/// 一个分析窗口：上下文、迭代计数、连续失败次数
#[derive(Debug, Default)]
struct Session {
    context: ContextWindow,
    iteration: u64,
    failures: u32,
    pause: Option<Pause>,
}

impl Session {
    fn fresh(kickoff: String) -> Self {
        let mut context = ContextWindow::new();
        context.push(Message::user(kickoff));
        Self {
            context,
            ..Default::default()
        }
    }
}

struct ActiveRun {
    id: u64,
    session: Session,
    max_iterations: u32,
    timeout: Duration,
    /// 本次分析期间发出的通知
    produced: Vec<Notification>,
    deadline: Wake,
    reply: RunReply,
}

impl ActiveRun {
    /// 分析结束：截止时间与退避定时器都不再需要
    fn cancel_timers(&self) {
        self.deadline.cancel();
        if let Some(pause) = &self.session.pause {
            pause.wake().cancel();
        }
    }
}

struct QueuedRun {
    id: u64,
    trigger: String,
    max_iterations: u32,
    timeout: Duration,
    deadline: Wake,
    reply: RunReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Continuous,
    Run(u64),
}

struct InFlight {
    call: InFlightCall,
    target: Target,
}

/// 一轮决策之后会话如何继续
enum Outcome {
    Continue,
    Wait(Duration),
    Done,
    Backoff(Duration),
    Failed(DecisionError),
}

pub struct MonitorActor {
    id: String,
    collector: Arc<dyn Collector>,
    callbacks: Callbacks,
    callback_names: Vec<String>,
    engine: Arc<dyn DecisionEngine>,
    sandbox: Arc<dyn SandboxEvaluator>,
    settings: MonitorSettings,
    bus: EventBus,
    supervisor: Supervisor,
    tx: mpsc::WeakUnboundedSender<MonitorMsg>,
    scheduler: WakeScheduler<MonitorMsg>,
    schema: Value,

    state: MonitorState,
    snapshots: SnapshotHistory,
    notifications: NotificationHistory,
    running: bool,
    continuous: Session,
    run: Option<ActiveRun>,
    queue: VecDeque<QueuedRun>,
    next_run_id: u64,
    in_flight: Option<InFlight>,
}

impl MonitorActor {
    /// 创建并启动 Actor；持续循环需另行 start
    pub fn spawn(
        id: impl Into<String>,
        collector: Arc<dyn Collector>,
        engine: Arc<dyn DecisionEngine>,
        sandbox: Arc<dyn SandboxEvaluator>,
        settings: MonitorSettings,
        bus: EventBus,
        parent: &CancellationToken,
    ) -> MonitorHandle {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::with_parent(parent);
        let callbacks = collector.callbacks();
        let callback_names = callbacks.names();

        let actor = MonitorActor {
            id: id.clone(),
            collector,
            callbacks,
            callback_names,
            engine,
            sandbox,
            snapshots: SnapshotHistory::new(settings.snapshot_cap),
            notifications: NotificationHistory::new(settings.notification_cap),
            settings,
            bus,
            scheduler: WakeScheduler::new(tx.downgrade(), supervisor.child_token()),
            supervisor,
            tx: tx.downgrade(),
            schema: monitor_action_schema(),
            state: MonitorState::default(),
            running: false,
            continuous: Session::default(),
            run: None,
            queue: VecDeque::new(),
            next_run_id: 1,
            in_flight: None,
        };
        tokio::spawn(actor.run(rx));
        MonitorHandle::new(id, tx)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<MonitorMsg>) {
        let token = self.supervisor.cancel_token();
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    self.teardown("cancelled");
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        if !self.handle(msg).await {
                            break;
                        }
                    }
                    None => {
                        self.teardown("closed");
                        break;
                    }
                },
            }
        }
        debug!(monitor_id = %self.id, "Monitor actor exited");
    }

    /// 处理一条消息；返回 false 表示 Actor 退出
    async fn handle(&mut self, msg: MonitorMsg) -> bool {
        match msg {
            MonitorMsg::Start { reply } => {
                let started = self.start_loop();
                let _ = reply.send(started);
            }
            MonitorMsg::Stop { reply } => {
                self.stop_loop("stopped");
                let _ = reply.send(());
            }
            MonitorMsg::Shutdown { reply } => {
                self.teardown("shutdown");
                let _ = reply.send(());
                return false;
            }
            MonitorMsg::Run(req) => self.enqueue_run(req),
            MonitorMsg::Status { reply } => {
                let _ = reply.send(self.status());
            }
            MonitorMsg::Snapshots {
                limit,
                offset,
                reply,
            } => {
                let _ = reply.send(self.snapshots.page_newest_first(limit, offset));
            }
            MonitorMsg::Notifications { reply } => {
                let _ = reply.send(self.notifications.to_vec());
            }
            MonitorMsg::Decided { call, cycle } => self.on_decided(call, cycle).await,
            MonitorMsg::Wake { wake } => self.on_wake(wake),
            MonitorMsg::RunDeadline { run } => self.on_run_deadline(run),
        }
        self.advance();
        true
    }

    fn emit(&self, event: HiveEvent) {
        self.bus.emit(event.meta("monitor_id", self.id.clone()));
    }

    fn status(&self) -> MonitorStatus {
        MonitorStatus {
            monitor_id: self.id.clone(),
            state: self.state,
            running: self.running,
            iteration: self
                .run
                .as_ref()
                .map(|r| r.session.iteration)
                .unwrap_or(self.continuous.iteration),
            analysis_active: self.run.is_some(),
            queued_runs: self.queue.len(),
            snapshot_count: self.snapshots.len(),
            notification_count: self.notifications.len(),
        }
    }

    fn start_loop(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.continuous = Session::fresh(prompt::window_kickoff(self.state));
        info!(monitor_id = %self.id, "Monitor loop started");
        self.emit(HiveEvent::new(EventName::MonitorStarted).meta("state", self.state.as_str()));
        true
    }

    fn stop_loop(&mut self, reason: &str) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(pause) = self.continuous.pause.take() {
            pause.wake().cancel();
        }
        if let Some(flight) = self.in_flight.take_if_target(Target::Continuous) {
            flight.call.cancel();
        }
        info!(monitor_id = %self.id, reason, "Monitor loop stopped");
        self.emit(HiveEvent::new(EventName::MonitorStopped).meta("reason", reason));
    }

    /// 取消一切在途工作并回复所有等待中的调用方
    fn teardown(&mut self, reason: &str) {
        self.supervisor.cancel();
        if let Some(flight) = self.in_flight.take() {
            flight.call.cancel();
        }
        if let Some(run) = self.run.take() {
            let _ = run.reply.send(Err(HiveError::Cancelled));
        }
        for queued in self.queue.drain(..) {
            let _ = queued
                .reply
                .send(Err(HiveError::MonitorNotRunning(self.id.clone())));
        }
        self.stop_loop(reason);
    }

    fn enqueue_run(&mut self, req: RunRequest) {
        let id = self.next_run_id;
        self.next_run_id += 1;
        let timeout = req.options.timeout.unwrap_or(self.settings.run_timeout);
        let max_iterations = req
            .options
            .max_iterations
            .unwrap_or(self.settings.run_max_iterations);
        // 超时从请求到达时开始计算（含排队时间）
        let deadline = self
            .scheduler
            .schedule(timeout, move |_| MonitorMsg::RunDeadline { run: id });
        debug!(monitor_id = %self.id, run = id, queued = self.queue.len(), "Analysis queued");
        self.queue.push_back(QueuedRun {
            id,
            trigger: req.trigger,
            max_iterations,
            timeout,
            deadline,
            reply: req.reply,
        });
    }

    fn start_next_run(&mut self) {
        while let Some(queued) = self.queue.pop_front() {
            if queued.reply.is_closed() {
                queued.deadline.cancel();
                continue;
            }
            info!(monitor_id = %self.id, run = queued.id, "Analysis started");
            self.run = Some(ActiveRun {
                id: queued.id,
                session: Session::fresh(prompt::run_kickoff(&queued.trigger, self.state)),
                max_iterations: queued.max_iterations,
                timeout: queued.timeout,
                produced: Vec::new(),
                deadline: queued.deadline,
                reply: queued.reply,
            });
            return;
        }
    }

    /// 没有在途调用时派发下一次决策：有界分析优先于持续循环
    fn advance(&mut self) {
        if self.in_flight.is_some() || self.supervisor.is_cancelled() {
            return;
        }
        if self.run.is_none() {
            self.start_next_run();
        }
        if let Some(run) = &self.run {
            if run.session.pause.is_none() {
                self.dispatch(Target::Run(run.id));
            }
            return;
        }
        if self.running && self.continuous.pause.is_none() {
            self.dispatch(Target::Continuous);
        }
    }

    fn dispatch(&mut self, target: Target) {
        let (mode, session) = match target {
            Target::Continuous => (Mode::Continuous, &self.continuous),
            Target::Run(_) => match &self.run {
                Some(run) => (Mode::Bounded, &run.session),
                None => return,
            },
        };
        let request = DecisionRequest {
            system_prompt: prompt::system_prompt(
                &self.id,
                self.collector.as_ref(),
                &self.callback_names,
                mode,
                self.state,
                session.iteration,
            ),
            turns: session.context.messages().to_vec(),
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
                    let _ = tx.send(MonitorMsg::Decided { call, cycle });
                }
            },
        );
        debug!(monitor_id = %self.id, mode = mode.as_str(), call = call.id().as_u64(), "Decision dispatched");
        self.in_flight = Some(InFlight { call, target });
    }

    async fn on_decided(&mut self, call: CallId, cycle: DecisionCycle) {
        let target = match &self.in_flight {
            Some(flight) if flight.call.id() == call => flight.target,
            _ => {
                debug!(monitor_id = %self.id, call = call.as_u64(), "Stale decision ignored");
                return;
            }
        };
        self.in_flight = None;

        match target {
            Target::Continuous => {
                if !self.running {
                    return;
                }
                let mut session = std::mem::take(&mut self.continuous);
                let outcome = self
                    .process(Mode::Continuous, &mut session, None, cycle)
                    .await;
                self.continuous = session;
                match outcome {
                    Outcome::Continue | Outcome::Done => {}
                    Outcome::Wait(delay) => {
                        let wake = self
                            .scheduler
                            .schedule(delay, |wake| MonitorMsg::Wake { wake });
                        self.continuous.pause = Some(Pause::Wait(wake));
                    }
                    Outcome::Backoff(delay) => {
                        let wake = self
                            .scheduler
                            .schedule(delay, |wake| MonitorMsg::Wake { wake });
                        self.continuous.pause = Some(Pause::Backoff(wake));
                    }
                    Outcome::Failed(err) => self.halt_loop(&err),
                }
            }
            Target::Run(id) => {
                let mut run = match self.run.take() {
                    Some(run) if run.id == id => run,
                    other => {
                        self.run = other;
                        return;
                    }
                };
                let outcome = self
                    .process(
                        Mode::Bounded,
                        &mut run.session,
                        Some(&mut run.produced),
                        cycle,
                    )
                    .await;
                match outcome {
                    Outcome::Continue | Outcome::Wait(_) => {
                        if run.session.iteration >= u64::from(run.max_iterations) {
                            info!(monitor_id = %self.id, run = run.id, "Analysis reached iteration cap");
                            self.finish_run(run);
                        } else {
                            self.run = Some(run);
                        }
                    }
                    Outcome::Done => self.finish_run(run),
                    Outcome::Backoff(delay) => {
                        let wake = self
                            .scheduler
                            .schedule(delay, |wake| MonitorMsg::Wake { wake });
                        run.session.pause = Some(Pause::Backoff(wake));
                        self.run = Some(run);
                    }
                    Outcome::Failed(err) => {
                        error!(monitor_id = %self.id, run = run.id, error = %err, "Analysis failed");
                        run.cancel_timers();
                        let _ = run.reply.send(Err(HiveError::Decision(err)));
                    }
                }
            }
        }
    }

    fn finish_run(&mut self, run: ActiveRun) {
        run.cancel_timers();
        info!(
            monitor_id = %self.id,
            run = run.id,
            notifications = run.produced.len(),
            "Analysis finished"
        );
        let _ = run.reply.send(Ok(run.produced));
    }

    fn halt_loop(&mut self, err: &DecisionError) {
        error!(monitor_id = %self.id, error = %err, "Monitor loop halted");
        self.emit(
            HiveEvent::new(EventName::LoopHalted)
                .measure("attempts", f64::from(self.continuous.failures))
                .meta("error", err.to_string())
                .meta("state", self.state.as_str()),
        );
        self.stop_loop("halted");
    }

    fn on_wake(&mut self, wake: WakeId) {
        let waited = match &self.continuous.pause {
            Some(Pause::Wait(w)) if w.id() == wake && self.running => Some(true),
            Some(pause) if pause.is_backoff(wake) => Some(false),
            _ => None,
        };
        match waited {
            Some(true) => {
                debug!(monitor_id = %self.id, "Wait finished, starting a fresh window");
                self.continuous = Session::fresh(prompt::window_kickoff(self.state));
            }
            Some(false) => self.continuous.pause = None,
            None => {}
        }
        if let Some(run) = &mut self.run {
            if matches!(&run.session.pause, Some(pause) if pause.is_backoff(wake)) {
                run.session.pause = None;
            }
        }
    }

    fn on_run_deadline(&mut self, run_id: u64) {
        if matches!(&self.run, Some(run) if run.id == run_id) {
            if let Some(flight) = self.in_flight.take_if_target(Target::Run(run_id)) {
                flight.call.cancel();
            }
            if let Some(run) = self.run.take() {
                run.cancel_timers();
                warn!(monitor_id = %self.id, run = run_id, timeout = ?run.timeout, "Analysis timed out");
                let _ = run.reply.send(Err(HiveError::RunTimeout(run.timeout)));
            }
            return;
        }
        if let Some(pos) = self.queue.iter().position(|q| q.id == run_id) {
            if let Some(queued) = self.queue.remove(pos) {
                warn!(monitor_id = %self.id, run = run_id, "Queued analysis timed out");
                let _ = queued.reply.send(Err(HiveError::RunTimeout(queued.timeout)));
            }
        }
    }

    async fn process(
        &mut self,
        mode: Mode,
        session: &mut Session,
        produced: Option<&mut Vec<Notification>>,
        cycle: DecisionCycle,
    ) -> Outcome {
        if let Some(turns) = cycle.compacted {
            let before = session.context.len();
            session.context.replace(turns);
            self.emit(
                HiveEvent::new(EventName::ContextCompacted)
                    .measure("turns_before", before as f64)
                    .measure("turns_after", session.context.len() as f64),
            );
        }
        match cycle.result {
            Ok(call) => {
                session.failures = 0;
                self.execute(mode, session, produced, call).await
            }
            Err(err) => self.on_failure(mode, session, err),
        }
    }

    fn on_failure(&mut self, mode: Mode, session: &mut Session, err: DecisionError) -> Outcome {
        session.failures += 1;
        let attempt = session.failures;
        let event = HiveEvent::new(EventName::DecisionError)
            .measure("attempt", f64::from(attempt))
            .meta("mode", mode.as_str())
            .meta("error", err.to_string());

        match self.settings.recovery.handle(&err, attempt) {
            RecoveryAction::Retry { delay, .. } => {
                warn!(monitor_id = %self.id, attempt, delay = ?delay, error = %err, "Decision failed, backing off");
                self.emit(event.measure("delay_ms", delay.as_millis() as f64));
                Outcome::Backoff(delay)
            }
            RecoveryAction::Halt { attempts } => {
                error!(monitor_id = %self.id, attempts, error = %err, "Decision retries exhausted");
                self.emit(event);
                Outcome::Failed(err)
            }
            RecoveryAction::Fail => {
                error!(monitor_id = %self.id, error = %err, "Decision failed, not retryable");
                self.emit(event);
                Outcome::Failed(err)
            }
        }
    }

    async fn execute(
        &mut self,
        mode: Mode,
        session: &mut Session,
        produced: Option<&mut Vec<Notification>>,
        call: ActionCall,
    ) -> Outcome {
        let action: MonitorAction = match decode_action(&call) {
            Ok(action) => action,
            Err(DecodeError::Unknown(name)) => {
                return self.on_failure(mode, session, DecisionError::UnknownAction(name))
            }
            Err(DecodeError::Invalid(message)) => {
                session
                    .context
                    .push(Message::assistant(serde_json::to_string(&call).unwrap_or_default()));
                session.iteration += 1;
                let err = ActionError::InvalidArguments {
                    action: call.action.clone(),
                    message,
                };
                self.reject(session, &call.action, &err);
                return Outcome::Continue;
            }
        };

        session
            .context
            .push(Message::assistant(serde_json::to_string(&call).unwrap_or_default()));
        session.iteration += 1;
        let name = action.name();

        match self.perform(mode, action, produced).await {
            Ok((result, outcome)) => {
                debug!(monitor_id = %self.id, action = name, "Action executed");
                session
                    .context
                    .push(Message::user(format!("Result of {}: {}", name, result)));
                self.emit(
                    HiveEvent::new(EventName::ActionExecuted)
                        .measure("iteration", session.iteration as f64)
                        .meta("action", name)
                        .meta("mode", mode.as_str()),
                );
                outcome
            }
            Err(err) => {
                self.reject(session, name, &err);
                Outcome::Continue
            }
        }
    }

    /// 校验失败：动作无副作用，错误回灌上下文
    fn reject(&self, session: &mut Session, action: &str, err: &ActionError) {
        warn!(monitor_id = %self.id, action, error = %err, "Action rejected");
        session.context.push(Message::user(
            json!({ "action": action, "error": err.to_string() }).to_string(),
        ));
        self.emit(
            HiveEvent::new(EventName::ValidationFailed)
                .meta("action", action)
                .meta("error", err.to_string()),
        );
    }

    async fn perform(
        &mut self,
        mode: Mode,
        action: MonitorAction,
        produced: Option<&mut Vec<Notification>>,
    ) -> Result<(Value, Outcome), ActionError> {
        match action {
            MonitorAction::SetState { state, reason } => {
                let previous = self.state;
                self.state = state;
                info!(monitor_id = %self.id, from = %previous, to = %state, reason = %reason, "State changed");
                self.emit(
                    HiveEvent::new(EventName::StateChanged)
                        .meta("from", previous.as_str())
                        .meta("to", state.as_str())
                        .meta("reason", reason),
                );
                Ok((json!({ "state": state, "previous": previous }), Outcome::Continue))
            }
            MonitorAction::SendNotification {
                anomaly_type,
                summary,
                severity,
                snapshot_ids,
            } => {
                let missing: Vec<String> = snapshot_ids
                    .iter()
                    .filter(|id| !self.snapshots.contains(id))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(ActionError::MissingReference {
                        kind: ReferenceKind::Snapshot,
                        missing,
                    });
                }
                let notification =
                    Notification::new(&self.id, anomaly_type, summary, severity, snapshot_ids)?;
                let id = notification.id.clone();
                self.notifications.push(notification.clone());
                if let Some(produced) = produced {
                    produced.push(notification.clone());
                }
                let delivered = self.bus.publish_notification(&notification);
                info!(
                    monitor_id = %self.id,
                    notification_id = %id,
                    severity = severity.as_str(),
                    anomaly_type = %notification.anomaly_type,
                    "Notification sent"
                );
                self.emit(
                    HiveEvent::new(EventName::NotificationSent)
                        .measure("subscribers", delivered as f64)
                        .measure("snapshot_refs", notification.snapshot_ids.len() as f64)
                        .meta("notification_id", id.clone())
                        .meta("severity", severity.as_str())
                        .meta("type", notification.anomaly_type.clone()),
                );
                Ok((json!({ "notification_id": id }), Outcome::Continue))
            }
            MonitorAction::TakeSnapshot {} => {
                let payload = self
                    .collector
                    .snapshot()
                    .map_err(|e| ActionError::Collector(format!("{:#}", e)))?;
                let snapshot = Snapshot::new(payload);
                let result = json!({
                    "snapshot_id": snapshot.id,
                    "captured_at": snapshot.captured_at,
                    "data": snapshot.payload,
                });
                if let Some(evicted) = self.snapshots.push(snapshot) {
                    debug!(monitor_id = %self.id, snapshot_id = %evicted.id, "Snapshot evicted");
                }
                Ok((result, Outcome::Continue))
            }
            MonitorAction::GetSnapshot { id } => {
                let result = match self.snapshots.get(&id) {
                    Some(snapshot) => serde_json::to_value(snapshot).unwrap_or_default(),
                    None => json!({ "status": "not_found", "id": id }),
                };
                Ok((result, Outcome::Continue))
            }
            MonitorAction::GetSnapshots { limit, offset } => {
                let page = self.snapshots.page_newest_first(limit, offset);
                Ok((
                    json!({ "total": self.snapshots.len(), "snapshots": page }),
                    Outcome::Continue,
                ))
            }
            MonitorAction::GetNotifications {} => Ok((
                json!({ "notifications": self.notifications.to_vec() }),
                Outcome::Continue,
            )),
            MonitorAction::Execute { script } => {
                let result = match self.sandbox.eval(&script, &self.callbacks).await {
                    Ok(value) => json!({ "ok": true, "result": value }),
                    Err(e) => {
                        debug!(monitor_id = %self.id, error = %e, "Script failed");
                        json!({ "ok": false, "error": { "kind": e.kind(), "message": e.to_string() } })
                    }
                };
                Ok((result, Outcome::Continue))
            }
            MonitorAction::Think { thought } => {
                debug!(monitor_id = %self.id, thought = %thought, "Think");
                Ok((json!({ "recorded": true }), Outcome::Continue))
            }
            MonitorAction::Wait { seconds } => {
                if mode != Mode::Continuous {
                    return Err(ActionError::ModeMismatch {
                        action: "wait".to_string(),
                        mode: mode.as_str(),
                    });
                }
                let delay = Duration::from_secs(seconds).min(self.settings.max_wait);
                Ok((json!({ "waiting_secs": delay.as_secs() }), Outcome::Wait(delay)))
            }
            MonitorAction::Done {} => {
                if mode != Mode::Bounded {
                    return Err(ActionError::ModeMismatch {
                        action: "done".to_string(),
                        mode: mode.as_str(),
                    });
                }
                Ok((json!({ "finished": true }), Outcome::Done))
            }
        }
    }
}

trait TakeIfTarget {
    fn take_if_target(&mut self, target: Target) -> Option<InFlight>;
}

impl TakeIfTarget for Option<InFlight> {
    fn take_if_target(&mut self, target: Target) -> Option<InFlight> {
        if matches!(self, Some(flight) if flight.target == target) {
            self.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ScriptedEngine;
    use crate::memory::referenced_ids;
    use crate::monitor::RunOptions;
    use crate::sandbox::CallScriptEvaluator;
    use serde_json::Map;
    use tokio::sync::oneshot;

    struct FakeCollector;

    impl Collector for FakeCollector {
        fn title(&self) -> &str {
            "Fake"
        }

        fn description(&self) -> &str {
            "Test subsystem"
        }

        fn system_prompt(&self) -> &str {
            ""
        }

        fn callback_docs(&self) -> &str {
            ""
        }

        fn snapshot(&self) -> anyhow::Result<Map<String, Value>> {
            let mut map = Map::new();
            map.insert("queue_depth".to_string(), json!(7));
            Ok(map)
        }

        fn callbacks(&self) -> Callbacks {
            Callbacks::new().with("depth", |_| Ok(json!(7)))
        }
    }

    fn spawn_with(engine: ScriptedEngine) -> (MonitorHandle, EventBus, CancellationToken) {
        let bus = EventBus::new(64);
        let root = CancellationToken::new();
        let handle = MonitorActor::spawn(
            "fake",
            Arc::new(FakeCollector),
            Arc::new(engine),
            Arc::new(CallScriptEvaluator::default()),
            MonitorSettings::default(),
            bus.clone(),
            &root,
        );
        (handle, bus, root)
    }

    fn last_snapshot_id(request: &DecisionRequest) -> String {
        referenced_ids(request.turns.iter().map(|m| m.content.as_str()))
            .into_iter()
            .filter(|id| id.starts_with("snap_"))
            .last()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_run_returns_notifications() {
        let engine = ScriptedEngine::new()
            .act("take_snapshot", json!({}))
            .dynamic(|req| {
                ActionCall::new(
                    "send_notification",
                    json!({
                        "type": "queue_backlog",
                        "summary": "queue depth 7",
                        "severity": "warning",
                        "snapshot_ids": [last_snapshot_id(req)]
                    }),
                )
            })
            .act("done", json!({}));
        let (handle, _bus, _root) = spawn_with(engine);

        let produced = handle.run("check queue", RunOptions::new()).await.unwrap();
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].anomaly_type, "queue_backlog");
        assert_eq!(produced[0].monitor_id, "fake");

        let status = handle.status().await.unwrap();
        assert!(!status.analysis_active);
        assert_eq!(status.snapshot_count, 1);
        assert_eq!(status.notification_count, 1);
    }

    #[tokio::test]
    async fn test_wait_rejected_in_bounded_run() {
        let engine = ScriptedEngine::new()
            .act("wait", json!({ "seconds": 10 }))
            .act("execute", json!({ "script": "depth()" }))
            .act("done", json!({}));
        let (handle, bus, _root) = spawn_with(engine);
        let mut events = bus.subscribe_events();

        let produced = handle.run("", RunOptions::new()).await.unwrap();
        assert!(produced.is_empty());

        let mut rejected = 0;
        while let Ok(event) = events.try_recv() {
            if event.name == EventName::ValidationFailed {
                rejected += 1;
                assert_eq!(event.meta_str("action"), Some("wait"));
            }
        }
        assert_eq!(rejected, 1);
    }

    #[tokio::test]
    async fn test_continuous_loop_pauses_on_wait() {
        let engine = ScriptedEngine::new()
            .act("take_snapshot", json!({}))
            .act("wait", json!({ "seconds": 3600 }));
        let (handle, _bus, _root) = spawn_with(engine);

        assert!(handle.start().await.unwrap());
        assert!(!handle.start().await.unwrap());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = handle.status().await.unwrap();
        assert!(status.running);
        assert_eq!(status.iteration, 2);
        assert_eq!(status.snapshot_count, 1);

        handle.stop().await.unwrap();
        assert!(!handle.status().await.unwrap().running);
    }

    #[tokio::test]
    async fn test_finished_run_cancels_its_timers() {
        let (tx, _rx) = mpsc::unbounded_channel::<MonitorMsg>();
        let token = CancellationToken::new();
        let mut scheduler = WakeScheduler::new(tx.downgrade(), token.clone());
        let deadline = scheduler.schedule(Duration::from_secs(300), |_| MonitorMsg::RunDeadline {
            run: 1,
        });
        let backoff = scheduler.schedule(Duration::from_secs(5), |wake| MonitorMsg::Wake { wake });
        let (reply, _reply_rx) = oneshot::channel();
        let run = ActiveRun {
            id: 1,
            session: Session {
                pause: Some(Pause::Backoff(backoff.clone())),
                ..Default::default()
            },
            max_iterations: 10,
            timeout: Duration::from_secs(300),
            produced: Vec::new(),
            deadline: deadline.clone(),
            reply,
        };

        run.cancel_timers();
        assert!(deadline.is_cancelled());
        assert!(backoff.is_cancelled());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_stop_after_wait_then_restart() {
        let engine = ScriptedEngine::new()
            .act("wait", json!({ "seconds": 3600 }))
            .act("wait", json!({ "seconds": 3600 }));
        let (handle, bus, _root) = spawn_with(engine);
        let mut events = bus.subscribe_events();

        assert!(handle.start().await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await.unwrap();
        assert!(handle.start().await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = handle.status().await.unwrap();
        assert!(status.running);
        assert_eq!(status.iteration, 1);
        let mut stopped = 0;
        while let Ok(event) = events.try_recv() {
            if event.name == EventName::MonitorStopped {
                stopped += 1;
                assert_eq!(event.meta_str("reason"), Some("stopped"));
            }
        }
        assert_eq!(stopped, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (handle, _bus, _root) = spawn_with(ScriptedEngine::new());
        handle.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            handle.status().await,
            Err(HiveError::MonitorNotRunning(_))
        ));
    }
}
