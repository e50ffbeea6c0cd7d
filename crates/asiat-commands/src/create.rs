use crate::common::count_lines;
use crate::registry::{
    into_value_result, parse_input, Tool, ToolContext, ToolDescriptor, ToolId, ToolResult,
    ValidationResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileInput {
    #[serde(default)]
    pub file_path: String,
    /// Required; an empty string is valid content
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub create_dirs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileOutput {
    pub created: bool,
    pub path: String,
}

pub struct CreateFileTool {
    descriptor: ToolDescriptor,
}

impl CreateFileTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: ToolId::CreateFile,
                description: "Create a new file with the given content".to_string(),
                category: "file".to_string(),
                requires_approval: true,
                is_dangerous: false,
            },
        }
    }
}

impl Default for CreateFileTool {
    fn default() -> Self {
        Self::new()
    }
}

async fn create(path: &Path, input: &CreateFileInput) -> std::io::Result<bool> {
    let existed = fs::try_exists(path).await.unwrap_or(false);

    if input.create_dirs {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
    }

    fs::write(path, input.content.as_deref().unwrap_or_default()).await?;
    debug!(path = %path.display(), overwritten = existed, "Created file");
    Ok(!existed)
}

#[async_trait]
impl Tool for CreateFileTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn validate(&self, input: &Value, context: &ToolContext) -> ValidationResult {
        let input: CreateFileInput = match parse_input(input) {
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
        if input.file_path.is_empty() {
            return ValidationResult::from_parts(errors, warnings);
        }

        if !sandbox.is_path_safe(&input.file_path) {
            errors.push("File path is outside project directory".to_string());
            return ValidationResult::from_parts(errors, warnings);
        }

        let path = sandbox.resolve(&input.file_path);
        if fs::try_exists(&path).await.unwrap_or(false) {
            if input.overwrite {
                warnings.push("Will overwrite existing file".to_string());
            } else {
                errors.push("File already exists (set overwrite: true to replace)".to_string());
            }
        }

        if let Some(parent) = path.parent() {
            match fs::metadata(parent).await {
                Ok(meta) if !meta.is_dir() => {
                    errors.push("Parent path exists but is not a directory".to_string())
                }
                Ok(_) => {}
                Err(_) if !input.create_dirs => errors
                    .push("Parent directory does not exist (set createDirs: true)".to_string()),
                Err(_) => {}
            }
        }

        ValidationResult::from_parts(errors, warnings)
    }

    async fn preview(&self, input: &Value, context: &ToolContext) -> String {
        let input: CreateFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return format!("📝 Create file: ({})", e),
        };
        let sandbox = context.sandbox();
        let content = input.content.as_deref().unwrap_or_default();
        let verb = if input.overwrite {
            "Create/Overwrite"
        } else {
            "Create"
        };

        [
            format!("📝 {} file: {}", verb, sandbox.relative(&input.file_path)),
            format!("   Lines: {}", count_lines(content)),
            format!("   Size: {} bytes", content.len()),
        ]
        .join("\n")
    }

    async fn execute(&self, input: &Value, context: &ToolContext) -> ToolResult {
        let input: CreateFileInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return ToolResult::error(e),
        };
        if input.content.is_none() {
            return ToolResult::error("Content is required");
        }
        let path = context.sandbox().resolve(&input.file_path);

        let result = match create(&path, &input).await {
            Ok(created) => ToolResult::success(CreateFileOutput {
                created,
                path: path.display().to_string(),
            }),
            Err(e) => ToolResult::error(format!("Failed to create file: {}", e)),
        };

        into_value_result(result)
    }

    fn supports_rollback(&self) -> bool {
        true
    }

    /// Only a file this tool brought into existence is removed.
    async fn rollback(
        &self,
        _input: &Value,
        _context: &ToolContext,
        prior: &ToolResult,
    ) -> ToolResult<()> {
        let output = prior
            .data
            .clone()
            .and_then(|data| serde_json::from_value::<CreateFileOutput>(data).ok());

        match output {
            Some(CreateFileOutput {
                created: true,
                path,
            }) => match fs::remove_file(&path).await {
                Ok(()) => ToolResult::success(()),
                Err(e) => ToolResult::error(format!("Failed to rollback file creation: {}", e)),
            },
            _ => ToolResult::error("File was not created, nothing to rollback"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::ReadFileTool;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_then_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let context = ToolContext::new(temp_dir.path());
        let content = "# Todo\n\n- ünïcode line\n- second\n";

        let create = CreateFileTool::new();
        let input = json!({ "filePath": "notes/todo.md", "content": content, "createDirs": true });
        assert!(create.validate(&input, &context).await.valid);
        let result = create.execute(&input, &context).await;
        assert!(result.is_success());
        assert_eq!(result.data.unwrap()["created"], json!(true));

        let read = ReadFileTool::new()
            .execute(&json!({ "filePath": "notes/todo.md" }), &context)
            .await;
        assert_eq!(read.data.unwrap()["content"], json!(content));
        assert_eq!(
            std::fs::read(temp_dir.path().join("notes/todo.md")).unwrap(),
            content.as_bytes()
        );
    }

    #[tokio::test]
    async fn test_path_outside_root_is_always_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let context = ToolContext::new(temp_dir.path());
        let tool = CreateFileTool::new();

        for input in [
            json!({ "filePath": "../escape.txt", "content": "x" }),
            json!({ "filePath": "../escape.txt", "content": "x", "overwrite": true, "createDirs": true }),
            json!({ "filePath": "/etc/asiat-test.txt" }),
            json!({ "filePath": "a/../../b.txt", "createDirs": true }),
        ] {
            let validation = tool.validate(&input, &context).await;
            assert!(!validation.valid);
            assert!(validation
                .errors
                .contains(&"File path is outside project directory".to_string()));
        }
    }

    #[tokio::test]
    async fn test_existing_file_and_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("exists.txt"), "x").unwrap();
        let context = ToolContext::new(temp_dir.path());
        let tool = CreateFileTool::new();

        let exists = tool
            .validate(&json!({ "filePath": "exists.txt", "content": "" }), &context)
            .await;
        assert_eq!(
            exists.errors,
            vec!["File already exists (set overwrite: true to replace)"]
        );

        let overwrite = tool
            .validate(&json!({ "filePath": "exists.txt", "overwrite": true, "content": "" }), &context)
            .await;
        assert!(overwrite.valid);
        assert_eq!(overwrite.warnings, vec!["Will overwrite existing file"]);

        let no_parent = tool
            .validate(&json!({ "filePath": "deep/dir/file.txt", "content": "" }), &context)
            .await;
        assert_eq!(
            no_parent.errors,
            vec!["Parent directory does not exist (set createDirs: true)"]
        );

        let parent_is_file = tool
            .validate(&json!({ "filePath": "exists.txt/child.txt", "content": "" }), &context)
            .await;
        assert_eq!(
            parent_is_file.errors,
            vec!["Parent path exists but is not a directory"]
        );
    }

    #[tokio::test]
    async fn test_missing_content_is_rejected_but_empty_is_allowed() {
        let temp_dir = TempDir::new().unwrap();
        let context = ToolContext::new(temp_dir.path());
        let tool = CreateFileTool::new();

        let missing = tool
            .validate(&json!({ "filePath": "blank.txt" }), &context)
            .await;
        assert_eq!(missing.errors, vec!["Content is required"]);

        let nothing = tool.validate(&json!({}), &context).await;
        assert_eq!(
            nothing.errors,
            vec!["File path is required", "Content is required"]
        );

        let result = tool
            .execute(&json!({ "filePath": "blank.txt" }), &context)
            .await;
        assert_eq!(result.error.as_deref(), Some("Content is required"));
        assert!(!temp_dir.path().join("blank.txt").exists());

        let empty = json!({ "filePath": "blank.txt", "content": "" });
        assert!(tool.validate(&empty, &context).await.valid);
        assert!(tool.execute(&empty, &context).await.is_success());
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("blank.txt")).unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn test_rollback_only_removes_created_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("kept.txt"), "old").unwrap();
        let context = ToolContext::new(temp_dir.path());
        let tool = CreateFileTool::new();

        let input = json!({ "filePath": "fresh.txt", "content": "new" });
        let created = tool.execute(&input, &context).await;
        assert!(tool.rollback(&input, &context, &created).await.is_success());
        assert!(!temp_dir.path().join("fresh.txt").exists());

        let input = json!({ "filePath": "kept.txt", "content": "new", "overwrite": true });
        let overwritten = tool.execute(&input, &context).await;
        assert_eq!(overwritten.data.as_ref().unwrap()["created"], json!(false));
        let rollback = tool.rollback(&input, &context, &overwritten).await;
        assert_eq!(
            rollback.error.as_deref(),
            Some("File was not created, nothing to rollback")
        );
        assert!(temp_dir.path().join("kept.txt").exists());
    }

    #[tokio::test]
    async fn test_preview() {
        let temp_dir = TempDir::new().unwrap();
        let context = ToolContext::new(temp_dir.path());
        let preview = CreateFileTool::new()
            .preview(
                &json!({ "filePath": "notes/todo.md", "content": "a\nb" }),
                &context,
            )
            .await;
        assert_eq!(
            preview,
            "📝 Create file: notes/todo.md\n   Lines: 2\n   Size: 3 bytes"
        );
    }
}
