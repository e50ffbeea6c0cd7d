use crate::common::{file_name_of, format_kb, with_suffix};
use crate::registry::{
    into_value_result, parse_input, Tool, ToolContext, ToolDescriptor, ToolId, ToolResult,
    ValidationResult,
};
use asiat_security::{is_critical_file, CRITICAL_DELETE_FILES};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFileInput {
    #[serde(default)]
    pub file_path: String,
    #[serde(default = "default_true")]
    pub backup: bool,
    #[serde(default)]
    pub confirm_dangerous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFileOutput {
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}

/// Removes a single file. Critical project files need explicit confirmation.
pub struct DeleteFileTool {
    descriptor: ToolDescriptor,
}

impl DeleteFileTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: ToolId::DeleteFile,
                description: "Delete a file (a backup is kept by default)".to_string(),
                category: "file".to_string(),
                requires_approval: true,
                is_dangerous: true,
            },
        }
    }
}

impl Default for DeleteFileTool {
    fn default() -> Self {
        Self::new()
    }
}

async fn delete_with_backup(path: &Path, backup: bool) -> std::io::Result<Option<String>> {
    let backup_path = if backup {
        let target = with_suffix(
            path,
            &format!(".deleted-{}", chrono::Utc::now().timestamp_millis()),
        );
        fs::copy(path, &target).await?;
        Some(target.display().to_string())
    } else {
        None
    };

    fs::remove_file(path).await?;
    debug!(path = %path.display(), backup = ?backup_path, "Deleted file");
    Ok(backup_path)
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn validate(&self, input: &Value, context: &ToolContext) -> ValidationResult {
        let input: DeleteFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return ValidationResult::invalid(e),
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let sandbox = context.sandbox();

        if input.file_path.is_empty() {
            errors.push("File path is required".to_string());
            return ValidationResult::from_parts(errors, warnings);
        }

        if !sandbox.is_path_safe(&input.file_path) {
            errors.push("File path is outside project directory".to_string());
        }

        let path = sandbox.resolve(&input.file_path);
        match fs::metadata(&path).await {
            Ok(meta) if !meta.is_file() => {
                errors.push("Path is not a file (cannot delete directories)".to_string())
            }
            Ok(_) => {}
            Err(_) => errors.push("File does not exist".to_string()),
        }

        let file_name = file_name_of(&path);
        if is_critical_file(&file_name, CRITICAL_DELETE_FILES) {
            if input.confirm_dangerous {
                warnings.push(format!("⚠️ DANGEROUS: Deleting critical file: {}", file_name));
            } else {
                errors.push(format!(
                    "Deleting critical file \"{}\" requires confirmDangerous: true",
                    file_name
                ));
            }
        }

        ValidationResult::from_parts(errors, warnings)
    }

    async fn preview(&self, input: &Value, context: &ToolContext) -> String {
        let input: DeleteFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return format!("🗑️ Delete file: ({})", e),
        };
        let sandbox = context.sandbox();

        let mut lines = vec![format!(
            "🗑️ Delete file: {}{}",
            sandbox.relative(&input.file_path),
            if input.backup {
                " (will create backup)"
            } else {
                " ⚠️ NO BACKUP"
            }
        )];

        if let Ok(meta) = fs::metadata(sandbox.resolve(&input.file_path)).await {
            lines.push(format!("   Size: {} KB", format_kb(meta.len())));
        }

        lines.join("\n")
    }

    async fn execute(&self, input: &Value, context: &ToolContext) -> ToolResult {
        let input: DeleteFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return ToolResult::error(e),
        };
        let path = context.sandbox().resolve(&input.file_path);
        if !input.backup {
            warn!(path = %path.display(), "Deleting without backup");
        }

        let result = match delete_with_backup(&path, input.backup).await {
            Ok(backup_path) => ToolResult::success(DeleteFileOutput {
                deleted: true,
                backup_path,
            }),
            Err(e) => ToolResult::error(format!("Failed to delete file: {}", e)),
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

        let input: DeleteFileInput = match parse_input(input) {
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
            Err(e) => ToolResult::error(format!("Failed to rollback deletion: {}", e)),
        }
    }
}
