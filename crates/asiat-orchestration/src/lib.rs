//! Intent classification, approval gating and the assistant state machine.

pub mod approval;
pub mod assistant;
pub mod context;
pub mod intent;

pub use approval::{format_execution_result, ApprovalManager, ExecutionRecord};
pub use assistant::{Assistant, AssistantDeps, OrchestratorState, PendingAction};
pub use context::RuntimeContext;
pub use intent::{IntentKind, IntentParser, ParsedIntent};
