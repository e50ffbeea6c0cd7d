//! Tools, plans and project services used by the assistant.
//!
//! The five file/command tools live behind [`ToolRegistry`]. The remaining
//! modules hold the non-tool services: patch application, the code index,
//! git and package-script execution.

pub mod common;
pub mod create;
pub mod delete;
pub mod executor;
pub mod git_integration;
pub mod patch;
pub mod plan;
pub mod project_index;
pub mod read;
pub mod registry;
pub mod run;
pub mod write;

pub use common::{count_lines, format_kb, initialize_builtin_tools, truncate_text};
pub use registry::{
    into_value_result, parse_input, Tool, ToolContext, ToolDescriptor, ToolId, ToolRegistry,
    ToolResult, ToolStatus, ValidationResult,
};

pub use create::{CreateFileInput, CreateFileOutput, CreateFileTool};
pub use delete::{DeleteFileInput, DeleteFileOutput, DeleteFileTool};
pub use read::{ReadFileInput, ReadFileOutput, ReadFileTool};
pub use run::{RunCommandInput, RunCommandOutput, RunCommandTool};
pub use write::{WriteFileInput, WriteFileOutput, WriteFileTool};

pub use executor::{CommandExecutor, ExecutionResult};
pub use git_integration::{GitManager, GitStatus};
pub use patch::{FilePatch, Hunk, PatchEngine};
pub use plan::{ActionPlan, ActionStep, DangerLevel, PlanGenerator, StepSpec};
pub use project_index::{CodeIndex, IndexedFile};
