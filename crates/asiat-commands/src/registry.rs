use asiat_core::{AsiatError, Result};
use asiat_security::SandboxPolicy;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 60_000;

/// Closed set of tools the assistant can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    ReadFile,
    WriteFile,
    CreateFile,
    DeleteFile,
    RunCommand,
}

impl ToolId {
    pub const ALL: [ToolId; 5] = [
        ToolId::ReadFile,
        ToolId::WriteFile,
        ToolId::CreateFile,
        ToolId::DeleteFile,
        ToolId::RunCommand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::ReadFile => "read_file",
            ToolId::WriteFile => "write_file",
            ToolId::CreateFile => "create_file",
            ToolId::DeleteFile => "delete_file",
            ToolId::RunCommand => "run_command",
        }
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = AsiatError;

    fn from_str(s: &str) -> Result<Self> {
        ToolId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| AsiatError::tool(format!("Tool \"{}\" not found", s)))
    }
}

/// Static metadata describing a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: ToolId,
    pub description: String,
    pub category: String,
    pub requires_approval: bool,
    pub is_dangerous: bool,
}

impl ToolDescriptor {
    pub fn name(&self) -> &'static str {
        self.id.as_str()
    }
}

/// Context passed to tools during validation, preview and execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub project_root: PathBuf,
    pub current_dir: PathBuf,
    pub user_id: Option<String>,
    pub session_id: Option<Uuid>,
    /// Used by `run_command` when the input has no timeout
    pub command_timeout_ms: u64,
}

impl ToolContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            current_dir: project_root.clone(),
            project_root,
            user_id: None,
            session_id: None,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
        }
    }

    pub fn with_command_timeout(mut self, timeout_ms: u64) -> Self {
        self.command_timeout_ms = timeout_ms;
        self
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn sandbox(&self) -> SandboxPolicy {
        SandboxPolicy::new(&self.project_root)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self::from_parts(vec![error.into()], Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
    Pending,
    Cancelled,
}

/// Outcome of a tool execution or rollback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult<T = Value> {
    pub status: ToolStatus,
    pub data: Option<T>,
    pub error: Option<String>,
    pub metadata: Option<Value>,
}

impl<T> ToolResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: ToolStatus::Success,
            data: Some(data),
            error: None,
            metadata: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            data: None,
            error: Some(message.into()),
            metadata: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: ToolStatus::Cancelled,
            data: None,
            error: None,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Parse a tool's JSON input into its typed form.
pub fn parse_input<T: DeserializeOwned>(input: &Value) -> std::result::Result<T, String> {
    serde_json::from_value(input.clone()).map_err(|e| format!("Invalid input: {}", e))
}

/// Convert typed output into a registry-level result
pub fn into_value_result<T: Serialize>(result: ToolResult<T>) -> ToolResult {
    let data = match result.data {
        Some(data) => match serde_json::to_value(data) {
            Ok(value) => Some(value),
            Err(e) => {
                return ToolResult::error(format!("Failed to serialize tool output: {}", e));
            }
        },
        None => None,
    };

    ToolResult {
        status: result.status,
        data,
        error: result.error,
        metadata: result.metadata,
    }
}

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Check the input before any side effect. Never mutates anything.
    async fn validate(&self, input: &Value, context: &ToolContext) -> ValidationResult;

    /// Human-readable description of what `execute` would do. Safe on unvalidated input.
    async fn preview(&self, input: &Value, context: &ToolContext) -> String;

    async fn execute(&self, input: &Value, context: &ToolContext) -> ToolResult;

    fn supports_rollback(&self) -> bool {
        false
    }

    /// Undo a prior successful execution.
    async fn rollback(
        &self,
        _input: &Value,
        _context: &ToolContext,
        _prior: &ToolResult,
    ) -> ToolResult<()> {
        ToolResult::error(format!(
            "Rollback not supported for tool: {}",
            self.descriptor().name()
        ))
    }
}

/// Registry for managing tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<ToolId, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Refuses to replace an existing registration.
    pub async fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let id = tool.descriptor().id;
        let mut tools = self.tools.write().await;
        if tools.contains_key(&id) {
            return Err(AsiatError::tool(format!(
                "Tool \"{}\" is already registered",
                id
            )));
        }
        debug!(tool = %id, "Registered tool");
        tools.insert(id, tool);
        Ok(())
    }

    pub async fn get(&self, id: ToolId) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(&id).cloned()
    }

    pub async fn has(&self, id: ToolId) -> bool {
        self.tools.read().await.contains_key(&id)
    }

    /// Descriptors of all registered tools, in `ToolId::ALL` order.
    pub async fn list(&self) -> Vec<ToolDescriptor> {
        let tools = self.tools.read().await;
        ToolId::ALL
            .iter()
            .filter_map(|id| tools.get(id).map(|tool| tool.descriptor().clone()))
            .collect()
    }

    pub async fn list_by_category(&self, category: &str) -> Vec<ToolDescriptor> {
        self.list()
            .await
            .into_iter()
            .filter(|descriptor| descriptor.category == category)
            .collect()
    }

    pub async fn tool_names(&self) -> Vec<&'static str> {
        self.list()
            .await
            .iter()
            .map(|descriptor| descriptor.name())
            .collect()
    }

    /// Validate then execute. Failures come back as error results, never as `Err`.
    pub async fn execute(&self, id: ToolId, input: &Value, context: &ToolContext) -> ToolResult {
        let Some(tool) = self.get(id).await else {
            return ToolResult::error(format!("Tool \"{}\" not found", id));
        };

        let validation = tool.validate(input, context).await;
        if !validation.valid {
            warn!(tool = %id, errors = ?validation.errors, "Tool validation failed");
            let message = format!("Validation failed: {}", validation.errors.join(", "));
            return ToolResult::error(message).with_metadata(json!({ "validation": validation }));
        }

        for warning in &validation.warnings {
            warn!(tool = %id, "{}", warning);
        }

        tool.execute(input, context).await
    }

    /// Execute a tool addressed by its string name.
    pub async fn execute_by_name(
        &self,
        name: &str,
        input: &Value,
        context: &ToolContext,
    ) -> ToolResult {
        match name.parse::<ToolId>() {
            Ok(id) => self.execute(id, input, context).await,
            Err(_) => ToolResult::error(format!("Tool \"{}\" not found", name)),
        }
    }

    /// Preview without validation.
    pub async fn preview(&self, id: ToolId, input: &Value, context: &ToolContext) -> String {
        match self.get(id).await {
            Some(tool) => tool.preview(input, context).await,
            None => format!("❌ Tool \"{}\" not found", id),
        }
    }

    pub async fn validate(
        &self,
        id: ToolId,
        input: &Value,
        context: &ToolContext,
    ) -> ValidationResult {
        match self.get(id).await {
            Some(tool) => tool.validate(input, context).await,
            None => ValidationResult::invalid(format!("Tool \"{}\" not found", id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool {
        descriptor: ToolDescriptor,
    }

    impl EchoTool {
        fn new(id: ToolId) -> Self {
            Self {
                descriptor: ToolDescriptor {
                    id,
                    description: "Echo the input".to_string(),
                    category: "test".to_string(),
                    requires_approval: false,
                    is_dangerous: false,
                },
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn validate(&self, input: &Value, _context: &ToolContext) -> ValidationResult {
            if input.get("fail").is_some() {
                ValidationResult::from_parts(
                    vec!["first problem".to_string(), "second problem".to_string()],
                    Vec::new(),
                )
            } else {
                ValidationResult::from_parts(Vec::new(), Vec::new())
            }
        }

        async fn preview(&self, _input: &Value, _context: &ToolContext) -> String {
            "echo preview".to_string()
        }

        async fn execute(&self, input: &Value, _context: &ToolContext) -> ToolResult {
            ToolResult::success(input.clone())
        }
    }

    fn context() -> ToolContext {
        ToolContext::new("/tmp/asiat-registry-test")
    }

    #[tokio::test]
    async fn test_register_refuses_duplicates() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoTool::new(ToolId::ReadFile)))
            .await
            .unwrap();

        let err = registry
            .register(Arc::new(EchoTool::new(ToolId::ReadFile)))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Tool \"read_file\" is already registered"));
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry
            .execute(ToolId::DeleteFile, &json!({}), &context())
            .await;
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(
            result.error.as_deref(),
            Some("Tool \"delete_file\" not found")
        );

        let result = registry
            .execute_by_name("format_disk", &json!({}), &context())
            .await;
        assert_eq!(
            result.error.as_deref(),
            Some("Tool \"format_disk\" not found")
        );
    }

    #[tokio::test]
    async fn test_execute_short_circuits_on_validation_errors() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoTool::new(ToolId::ReadFile)))
            .await
            .unwrap();

        let result = registry
            .execute(ToolId::ReadFile, &json!({ "fail": true }), &context())
            .await;
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(
            result.error.as_deref(),
            Some("Validation failed: first problem, second problem")
        );
        let metadata = result.metadata.unwrap();
        assert_eq!(metadata["validation"]["valid"], json!(false));

        let ok = registry
            .execute(ToolId::ReadFile, &json!({ "value": 1 }), &context())
            .await;
        assert!(ok.is_success());
        assert_eq!(ok.data.unwrap()["value"], json!(1));
    }

    #[tokio::test]
    async fn test_preview_does_not_validate() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(EchoTool::new(ToolId::ReadFile)))
            .await
            .unwrap();

        let preview = registry
            .preview(ToolId::ReadFile, &json!({ "fail": true }), &context())
            .await;
        assert_eq!(preview, "echo preview");

        let missing = registry
            .preview(ToolId::RunCommand, &json!({}), &context())
            .await;
        assert_eq!(missing, "❌ Tool \"run_command\" not found");
    }

    #[test]
    fn test_tool_id_round_trip_names() {
        for id in ToolId::ALL {
            assert_eq!(id.as_str().parse::<ToolId>().unwrap(), id);
        }
        assert!("nope".parse::<ToolId>().is_err());
    }

    #[test]
    fn test_tool_id_display_honours_width() {
        assert_eq!(format!("{:<12}|", ToolId::ReadFile), "read_file   |");
        assert_eq!(format!("{}", ToolId::RunCommand), "run_command");
    }
}
