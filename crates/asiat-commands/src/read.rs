use crate::common::{count_lines, format_kb, unsupported_encoding};
use crate::registry::{
    into_value_result, parse_input, Tool, ToolContext, ToolDescriptor, ToolId, ToolResult,
    ValidationResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;

const LARGE_FILE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileInput {
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileOutput {
    pub content: String,
    pub encoding: String,
    pub size: u64,
    pub lines: usize,
}

/// Reads a file inside the project. Never needs approval.
pub struct ReadFileTool {
    descriptor: ToolDescriptor,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: ToolId::ReadFile,
                description: "Read the contents of a file".to_string(),
                category: "file".to_string(),
                requires_approval: false,
                is_dangerous: false,
            },
        }
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn validate(&self, input: &Value, context: &ToolContext) -> ValidationResult {
        let input: ReadFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return ValidationResult::invalid(e),
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let sandbox = context.sandbox();

        if let Some(error) = unsupported_encoding(input.encoding.as_deref()) {
            errors.push(error);
        }
        if input.file_path.is_empty() {
            errors.push("File path is required".to_string());
            return ValidationResult::from_parts(errors, warnings);
        }

        if !sandbox.is_path_safe(&input.file_path) {
            errors.push("File path is outside project directory".to_string());
        }

        match fs::metadata(sandbox.resolve(&input.file_path)).await {
            Ok(meta) if !meta.is_file() => errors.push("Path is not a file".to_string()),
            Ok(meta) => {
                if meta.len() > LARGE_FILE_BYTES {
                    warnings.push("File is very large (>10MB), may be slow to read".to_string());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                errors.push("File does not exist".to_string())
            }
            Err(e) => errors.push(format!("Cannot access file: {}", e)),
        }

        ValidationResult::from_parts(errors, warnings)
    }

    async fn preview(&self, input: &Value, context: &ToolContext) -> String {
        let file_path = input
            .get("filePath")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let sandbox = context.sandbox();
        let relative = sandbox.relative(file_path);

        match fs::metadata(sandbox.resolve(file_path)).await {
            Ok(meta) => format!("📖 Read file: {} ({} KB)", relative, format_kb(meta.len())),
            Err(_) => format!("📖 Read file: {}", relative),
        }
    }

    async fn execute(&self, input: &Value, context: &ToolContext) -> ToolResult {
        let input: ReadFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return ToolResult::error(e),
        };
        let path = context.sandbox().resolve(&input.file_path);

        let result = match fs::read_to_string(&path).await {
            Ok(content) => {
                let size = content.len() as u64;
                ToolResult::success(ReadFileOutput {
                    lines: count_lines(&content),
                    content,
                    encoding: "utf8".to_string(),
                    size,
                })
            }
            Err(e) => ToolResult::error(format!("Failed to read file: {}", e)),
        };

        into_value_result(result)
    }
}
