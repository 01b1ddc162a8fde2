//! ScriptedEngine：按预设步骤回放的确定性决策引擎（测试与演示用）

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::DecisionError;
use crate::decision::{ActionCall, DecisionEngine, DecisionRequest};
use crate::memory::Message;

pub type DynamicStep = Box<dyn Fn(&DecisionRequest) -> ActionCall + Send + Sync>;

/// 单个回放步骤
pub enum ScriptStep {
    /// 固定动作
    Act(ActionCall),
    /// 根据请求（通常是上下文中的 ID）动态构造动作
    Dynamic(DynamicStep),
    Fail(DecisionError),
    /// 在后台调用中 panic
    Panic(String),
    /// 永不返回（用于超时与取消）
    Hang,
}

pub struct ScriptedEngine {
    steps: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<DecisionRequest>>,
    summary: String,
    fail_when_exhausted: bool,
    summarize_calls: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            summary: "Earlier turns summarized.".to_string(),
            fail_when_exhausted: false,
            summarize_calls: AtomicUsize::new(0),
        }
    }

    pub fn step(self, step: ScriptStep) -> Self {
        self.push(step);
        self
    }

    pub fn act(self, action: &str, args: Value) -> Self {
        self.step(ScriptStep::Act(ActionCall::new(action, args)))
    }

    pub fn dynamic<F>(self, f: F) -> Self
    where
        F: Fn(&DecisionRequest) -> ActionCall + Send + Sync + 'static,
    {
        self.step(ScriptStep::Dynamic(Box::new(f)))
    }

    pub fn fail(self, err: DecisionError) -> Self {
        self.step(ScriptStep::Fail(err))
    }

    pub fn panic(self, message: &str) -> Self {
        self.step(ScriptStep::Panic(message.to_string()))
    }

    pub fn hang(self) -> Self {
        self.step(ScriptStep::Hang)
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    /// 步骤耗尽后返回 Transport 错误（默认永久挂起）
    pub fn fail_when_exhausted(mut self) -> Self {
        self.fail_when_exhausted = true;
        self
    }

    /// 运行中追加步骤
    pub fn push(&self, step: ScriptStep) {
        lock(&self.steps).push_back(step);
    }

    pub fn remaining(&self) -> usize {
        lock(&self.steps).len()
    }

    /// 已收到的 decide 请求（按顺序）
    pub fn requests(&self) -> Vec<DecisionRequest> {
        lock(&self.requests).clone()
    }

    pub fn decide_calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionEngine for ScriptedEngine {
    async fn decide(&self, request: &DecisionRequest) -> Result<ActionCall, DecisionError> {
        lock(&self.requests).push(request.clone());
        let next = lock(&self.steps).pop_front();
        match next {
            Some(ScriptStep::Act(call)) => Ok(call),
            Some(ScriptStep::Dynamic(f)) => Ok(f(request)),
            Some(ScriptStep::Fail(err)) => Err(err),
            Some(ScriptStep::Panic(message)) => panic!("{}", message),
            Some(ScriptStep::Hang) => std::future::pending().await,
            None if self.fail_when_exhausted => {
                Err(DecisionError::Transport("script exhausted".to_string()))
            }
            None => std::future::pending().await,
        }
    }

    async fn summarize(
        &self,
        _turns: &[Message],
        _instructions: &str,
    ) -> Result<String, DecisionError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.summary.clone())
    }
}
