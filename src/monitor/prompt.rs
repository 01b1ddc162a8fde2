//! Monitor 的 prompt 构建：system prompt 与每个分析窗口的起始轮次

use crate::collector::Collector;
use crate::model::MonitorState;

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 持续循环（以 wait 暂停）
    Continuous,
    /// 调用方请求的一次有界分析（以 done 结束）
    Bounded,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Continuous => "continuous",
            Mode::Bounded => "bounded",
        }
    }
}

pub fn system_prompt(
    monitor_id: &str,
    collector: &dyn Collector,
    callback_names: &[String],
    mode: Mode,
    state: MonitorState,
    iteration: u64,
) -> String {
    let mode_rules = match mode {
        Mode::Continuous => {
            "You run continuously. When nothing needs attention, use `wait` to pause; \
             the context is cleared when you resume. `done` is not available."
        }
        Mode::Bounded => {
            "You were asked for a single analysis. Call `done` when finished; \
             the notifications you sent during this analysis are returned to the caller. \
             `wait` is not available."
        }
    };

    format!(
        "You are the \"{id}\" monitor: {title}. {description}\n\n\
         {guidance}\n\n\
         ## Status\n\
         Current state: {state}. Iteration: {iteration}. Mode: {mode}.\n\n\
         ## Rules\n\
         - Choose exactly one action per turn.\n\
         - Every notification must reference the ids of snapshots you captured with `take_snapshot`.\n\
         - Use `think` to write down your reasoning before drawing conclusions.\n\
         - Errors from your actions are returned to you; correct the arguments and try again.\n\
         - {mode_rules}\n\n\
         ## Script callbacks for `execute`\n\
         Available: {callbacks}\n\
         {docs}",
        id = monitor_id,
        title = collector.title(),
        description = collector.description(),
        guidance = collector.system_prompt(),
        state = state,
        iteration = iteration,
        mode = mode.as_str(),
        mode_rules = mode_rules,
        callbacks = if callback_names.is_empty() {
            "(none)".to_string()
        } else {
            callback_names.join(", ")
        },
        docs = collector.callback_docs(),
    )
}

/// 持续模式下新分析窗口的第一条输入
pub fn window_kickoff(state: MonitorState) -> String {
    format!(
        "Begin a new analysis window. Current state: {}. Capture a snapshot before judging.",
        state
    )
}

/// 有界分析的第一条输入（含调用方的触发上下文）
pub fn run_kickoff(trigger: &str, state: MonitorState) -> String {
    format!(
        "Analysis requested. Current state: {}.\nTrigger context:\n{}",
        state,
        if trigger.trim().is_empty() {
            "(none)"
        } else {
            trigger
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::HostCollector;

    #[test]
    fn test_system_prompt_mentions_mode_rules() {
        let collector = HostCollector::new();
        let names = vec!["meminfo".to_string()];
        let continuous =
            system_prompt("host", &collector, &names, Mode::Continuous, MonitorState::Healthy, 0);
        assert!(continuous.contains("`wait`"));
        assert!(continuous.contains("meminfo"));
        let bounded =
            system_prompt("host", &collector, &[], Mode::Bounded, MonitorState::Warning, 3);
        assert!(bounded.contains("Current state: warning"));
        assert!(bounded.contains("(none)"));
    }

    #[test]
    fn test_run_kickoff_includes_trigger() {
        let text = run_kickoff("queue depth doubled", MonitorState::Observing);
        assert!(text.contains("queue depth doubled"));
        assert!(text.contains("observing"));
    }
}
