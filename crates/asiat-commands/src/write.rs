use crate::common::{count_lines, file_name_of, unsupported_encoding, with_suffix};
use crate::registry::{
    into_value_result, parse_input, Tool, ToolContext, ToolDescriptor, ToolId, ToolResult,
    ValidationResult,
};
use asiat_security::{is_critical_file, CRITICAL_WRITE_FILES};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use std::path::Path;
use tokio::fs;
use tracing::debug;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileInput {
    #[serde(default)]
    pub file_path: String,
    /// Required; an empty string is valid content
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default = "default_true")]
    pub create_backup: bool,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileOutput {
    pub bytes_written: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}

/// Overwrites an existing file, keeping a timestamped backup for rollback.
pub struct WriteFileTool {
    descriptor: ToolDescriptor,
}

impl WriteFileTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: ToolId::WriteFile,
                description: "Write content to an existing file".to_string(),
                category: "file".to_string(),
                requires_approval: true,
                is_dangerous: false,
            },
        }
    }
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Count inserted and deleted lines between two texts.
fn line_changes(old: &str, new: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .fold((0, 0), |(added, removed), change| match change.tag() {
            ChangeTag::Insert => (added + 1, removed),
            ChangeTag::Delete => (added, removed + 1),
            ChangeTag::Equal => (added, removed),
        })
}

async fn write_with_backup(
    path: &Path,
    content: &str,
    create_backup: bool,
) -> std::io::Result<Option<String>> {
    let backup_path = if create_backup {
        let backup = with_suffix(
            path,
            &format!(".backup-{}", chrono::Utc::now().timestamp_millis()),
        );
        fs::copy(path, &backup).await?;
        debug!(backup = %backup.display(), "Created backup before write");
        Some(backup.display().to_string())
    } else {
        None
    };

    fs::write(path, content).await?;
    Ok(backup_path)
}

#[async_trait]
impl Tool for WriteFileTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn validate(&self, input: &Value, context: &ToolContext) -> ValidationResult {
        let input: WriteFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return ValidationResult::invalid(e),
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let sandbox = context.sandbox();

        if input.file_path.is_empty() {
            errors.push("File path is required".to_string());
        }
        if input.content.is_none() {
            errors.push("Content is required".to_string());
        }
        if let Some(error) = unsupported_encoding(input.encoding.as_deref()) {
            errors.push(error);
        }
        if input.file_path.is_empty() {
            return ValidationResult::from_parts(errors, warnings);
        }

        if !sandbox.is_path_safe(&input.file_path) {
            errors.push("File path is outside project directory".to_string());
        }

        let path = sandbox.resolve(&input.file_path);
        match fs::metadata(&path).await {
            Ok(meta) if !meta.is_file() => {
                errors.push("Path exists but is not a file".to_string())
            }
            Ok(_) => {}
            Err(_) => {
                errors.push("File does not exist (use create_file tool instead)".to_string())
            }
        }

        let file_name = file_name_of(&path);
        if is_critical_file(&file_name, CRITICAL_WRITE_FILES) {
            warnings.push(format!("Modifying critical file: {}", file_name));
        }

        ValidationResult::from_parts(errors, warnings)
    }

    async fn preview(&self, input: &Value, context: &ToolContext) -> String {
        let input: WriteFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return format!("✏️ Write file: ({})", e),
        };
        let sandbox = context.sandbox();
        let relative = sandbox.relative(&input.file_path);

        let mut lines = vec![format!(
            "✏️ Write file: {}{}",
            relative,
            if input.create_backup {
                " (with backup)"
            } else {
                ""
            }
        )];

        if let Ok(current) = fs::read_to_string(sandbox.resolve(&input.file_path)).await {
            let content = input.content.as_deref().unwrap_or_default();
            let (added, removed) = line_changes(&current, content);
            lines.push(format!(
                "   Lines: {} → {}",
                count_lines(&current),
                count_lines(content)
            ));
            lines.push(format!(
                "   Size: {} → {} bytes",
                current.len(),
                content.len()
            ));
            lines.push(format!("   Changes: +{} -{}", added, removed));
        }

        lines.join("\n")
    }

    async fn execute(&self, input: &Value, context: &ToolContext) -> ToolResult {
        let input: WriteFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return ToolResult::error(e),
        };
        let Some(content) = input.content.as_deref() else {
            return ToolResult::error("Content is required");
        };
        let path = context.sandbox().resolve(&input.file_path);

        let result = match write_with_backup(&path, content, input.create_backup).await {
            Ok(backup_path) => ToolResult::success(WriteFileOutput {
                bytes_written: content.len(),
                backup_path,
            }),
            Err(e) => ToolResult::error(format!("Failed to write file: {}", e)),
        };

        into_value_result(result)
    }

    fn supports_rollback(&self) -> bool {
        true
    }

    async fn rollback(
        &self,
        input: &Value,
        context: &ToolContext,
        prior: &ToolResult,
    ) -> ToolResult<()> {
        let backup_path = prior
            .data
            .as_ref()
            .and_then(|data| data.get("backupPath"))
            .and_then(Value::as_str);
        let Some(backup_path) = backup_path else {
            return ToolResult::error("No backup available for rollback");
        };

        let input: WriteFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return ToolResult::error(e),
        };
        let path = context.sandbox().resolve(&input.file_path);

        let restored = async {
            fs::copy(backup_path, &path).await?;
            fs::remove_file(backup_path).await
        }
        .await;

        match restored {
            Ok(()) => ToolResult::success(()),
            Err(e) => ToolResult::error(format!("Failed to rollback: {}", e)),
        }
    }
}
