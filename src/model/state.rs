//! Monitor 健康状态（任意状态之间都可以切换，由决策引擎的 set_state 驱动）

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    #[default]
    Healthy,
    Observing,
    Warning,
    Critical,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorState::Healthy => "healthy",
            MonitorState::Observing => "observing",
            MonitorState::Warning => "warning",
            MonitorState::Critical => "critical",
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
