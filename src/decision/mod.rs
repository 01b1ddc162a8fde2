//! 决策层：决策引擎抽象、LLM 适配、确定性回放引擎、动作 Schema、后台调用派发

pub mod dispatch;
pub mod engine;
pub mod llm;
pub mod schema;
pub mod scripted;

pub use dispatch::{spawn_decision_cycle, CallId, DecisionCycle, InFlightCall};
pub use engine::{ActionCall, DecisionEngine, DecisionRequest};
pub use llm::{parse_action, LlmDecisionEngine};
pub use schema::{
    action_schema, coordinator_action_schema, decode_action, monitor_action_schema,
    ActionVocabulary, DecodeError,
};
pub use scripted::{DynamicStep, ScriptStep, ScriptedEngine};
