use crate::common::count_lines;
use crate::registry::{ToolId, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DangerLevel {
    Safe,
    Caution,
    Dangerous,
}

impl DangerLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DangerLevel::Safe => "safe",
            DangerLevel::Caution => "caution",
            DangerLevel::Dangerous => "dangerous",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            DangerLevel::Safe => "✅",
            DangerLevel::Caution => "⚠️",
            DangerLevel::Dangerous => "🚨",
        }
    }
}

impl std::fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool invocation inside a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStep {
    pub id: String,
    pub tool: ToolId,
    pub description: String,
    pub input: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub required: bool,
}

impl ActionStep {
    fn new(tool: ToolId, description: impl Into<String>, input: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool,
            description: description.into(),
            input,
            depends_on: Vec::new(),
            required: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    pub id: String,
    pub title: String,
    pub description: String,
    pub steps: Vec<ActionStep>,
    /// Seconds
    pub estimated_duration: Option<u64>,
    pub danger_level: DangerLevel,
}

impl ActionPlan {
    fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<ActionStep>,
        danger_level: DangerLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            steps,
            estimated_duration: None,
            danger_level,
        }
    }

    /// True when any step touches files on disk
    pub fn modifies_files(&self) -> bool {
        self.steps.iter().any(|step| {
            matches!(
                step.tool,
                ToolId::CreateFile | ToolId::WriteFile | ToolId::DeleteFile
            )
        })
    }
}

/// Caller-supplied step for [`PlanGenerator::multi_step`]
#[derive(Debug, Clone)]
pub struct StepSpec {
    pub tool: ToolId,
    pub description: String,
    pub input: Value,
    pub depends_on: Vec<String>,
    pub required: bool,
}

impl StepSpec {
    pub fn new(tool: ToolId, description: impl Into<String>, input: Value) -> Self {
        Self {
            tool,
            description: description.into(),
            input,
            depends_on: Vec::new(),
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn depends_on(mut self, ids: Vec<String>) -> Self {
        self.depends_on = ids;
        self
    }
}

/// Builds action plans for each family of request.
pub struct PlanGenerator {
    registry: Arc<ToolRegistry>,
}

impl PlanGenerator {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn create_file(&self, path: &str, content: &str) -> ActionPlan {
        let step = ActionStep::new(
            ToolId::CreateFile,
            format!("Create {}", path),
            json!({ "filePath": path, "content": content, "createDirs": true }),
        );

        ActionPlan::new(
            format!("Create file: {}", path),
            format!(
                "Create a new file with {} lines of content",
                count_lines(content)
            ),
            vec![step],
            DangerLevel::Safe,
        )
    }

    pub fn modify_file(&self, path: &str, content: &str) -> ActionPlan {
        let step = ActionStep::new(
            ToolId::WriteFile,
            format!("Write to {}", path),
            json!({ "filePath": path, "content": content, "createBackup": true }),
        );

        ActionPlan::new(
            format!("Modify file: {}", path),
            "Update existing file with new content",
            vec![step],
            DangerLevel::Caution,
        )
    }

    pub fn delete_file(&self, path: &str, confirm_dangerous: bool) -> ActionPlan {
        let step = ActionStep::new(
            ToolId::DeleteFile,
            format!("Delete {}", path),
            json!({ "filePath": path, "backup": true, "confirmDangerous": confirm_dangerous }),
        );

        ActionPlan::new(
            format!("Delete file: {}", path),
            "Remove file from project (with backup)",
            vec![step],
            DangerLevel::Dangerous,
        )
    }

    pub fn run_command(&self, command: &str, args: &[String]) -> ActionPlan {
        let full_command = format!("{} {}", command, args.join(" "))
            .trim()
            .to_string();
        let step = ActionStep::new(
            ToolId::RunCommand,
            format!("Run: {}", full_command),
            json!({ "command": command, "args": args }),
        );

        let mut plan = ActionPlan::new(
            format!("Run command: {}", full_command),
            "Execute shell command",
            vec![step],
            DangerLevel::Dangerous,
        );
        plan.estimated_duration = Some(10);
        plan
    }

    /// Reads are optional: one missing file does not stop the rest.
    pub fn read_files(&self, paths: &[String]) -> ActionPlan {
        let steps = paths
            .iter()
            .map(|path| ActionStep {
                required: false,
                ..ActionStep::new(
                    ToolId::ReadFile,
                    format!("Read {}", path),
                    json!({ "filePath": path }),
                )
            })
            .collect();

        ActionPlan::new(
            format!("Read {} files", paths.len()),
            "Read multiple files from the project",
            steps,
            DangerLevel::Safe,
        )
    }

    pub fn create_files(&self, files: &[(String, String)]) -> ActionPlan {
        let steps = files
            .iter()
            .map(|(path, content)| {
                ActionStep::new(
                    ToolId::CreateFile,
                    format!("Create {}", path),
                    json!({ "filePath": path, "content": content, "createDirs": true }),
                )
            })
            .collect();

        ActionPlan::new(
            format!("Create {} files", files.len()),
            "Create multiple new files",
            steps,
            DangerLevel::Caution,
        )
    }

    /// Composite plan whose danger level comes from the tools it uses.
    pub async fn multi_step(
        &self,
        title: &str,
        description: &str,
        steps: Vec<StepSpec>,
    ) -> ActionPlan {
        let danger_level = self.derive_danger_level(&steps).await;
        let steps = steps
            .into_iter()
            .map(|spec| ActionStep {
                depends_on: spec.depends_on,
                required: spec.required,
                ..ActionStep::new(spec.tool, spec.description, spec.input)
            })
            .collect();

        ActionPlan::new(title, description, steps, danger_level)
    }

    async fn derive_danger_level(&self, steps: &[StepSpec]) -> DangerLevel {
        let descriptors = self.registry.list().await;
        let flags = |tool: ToolId| {
            descriptors
                .iter()
                .find(|descriptor| descriptor.id == tool)
                .map(|descriptor| (descriptor.is_dangerous, descriptor.requires_approval))
                .unwrap_or((false, false))
        };

        if steps.iter().any(|step| flags(step.tool).0) {
            DangerLevel::Dangerous
        } else if steps.iter().any(|step| flags(step.tool).1) {
            DangerLevel::Caution
        } else {
            DangerLevel::Safe
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::initialize_builtin_tools;

    async fn generator() -> PlanGenerator {
        PlanGenerator::new(Arc::new(initialize_builtin_tools().await.unwrap()))
    }

    fn read_step(path: &str) -> StepSpec {
        StepSpec::new(ToolId::ReadFile, "read", json!({ "filePath": path }))
    }

    #[tokio::test]
    async fn test_create_file_plan() {
        let plan = generator().await.create_file("notes/todo.md", "a\nb\nc");
        assert_eq!(plan.title, "Create file: notes/todo.md");
        assert_eq!(plan.description, "Create a new file with 3 lines of content");
        assert_eq!(plan.danger_level, DangerLevel::Safe);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool, ToolId::CreateFile);
        assert_eq!(plan.steps[0].input["createDirs"], json!(true));
        assert!(plan.modifies_files());
    }

    #[tokio::test]
    async fn test_single_family_levels() {
        let generator = generator().await;
        assert_eq!(
            generator.modify_file("a.rs", "").danger_level,
            DangerLevel::Caution
        );
        assert_eq!(
            generator.delete_file("a.rs", false).danger_level,
            DangerLevel::Dangerous
        );
        assert_eq!(
            generator.delete_file("a.rs", false).steps[0].input["confirmDangerous"],
            json!(false)
        );

        let run = generator.run_command("npm", &["test".to_string()]);
        assert_eq!(run.title, "Run command: npm test");
        assert_eq!(run.estimated_duration, Some(10));
        assert_eq!(run.danger_level, DangerLevel::Dangerous);
        assert!(!run.modifies_files());

        let reads = generator.read_files(&["a".to_string(), "b".to_string()]);
        assert_eq!(reads.danger_level, DangerLevel::Safe);
        assert!(reads.steps.iter().all(|step| !step.required));

        let creates = generator.create_files(&[("a".to_string(), "x".to_string())]);
        assert_eq!(creates.danger_level, DangerLevel::Caution);
    }

    #[tokio::test]
    async fn test_multi_step_danger_level_ignores_order() {
        let generator = generator().await;

        let reads_only = generator
            .multi_step("reads", "", vec![read_step("a"), read_step("b")])
            .await;
        assert_eq!(reads_only.danger_level, DangerLevel::Safe);

        let run = StepSpec::new(ToolId::RunCommand, "run", json!({ "command": "ls" }));
        let delete = StepSpec::new(ToolId::DeleteFile, "delete", json!({ "filePath": "a" }));
        for steps in [
            vec![read_step("a"), run.clone()],
            vec![run.clone(), read_step("a")],
            vec![delete.clone(), read_step("a")],
            vec![read_step("a"), read_step("b"), delete.clone()],
        ] {
            let plan = generator.multi_step("mixed", "", steps).await;
            assert_eq!(plan.danger_level, DangerLevel::Dangerous);
        }

        let write = StepSpec::new(ToolId::WriteFile, "write", json!({ "filePath": "a" }));
        let caution = generator
            .multi_step("write", "", vec![read_step("a"), write.optional()])
            .await;
        assert_eq!(caution.danger_level, DangerLevel::Caution);
        assert!(!caution.steps[1].required);
    }

    #[tokio::test]
    async fn test_step_ids_are_unique() {
        let plan = generator()
            .await
            .read_files(&["a".to_string(), "b".to_string(), "c".to_string()]);
        let mut ids: Vec<_> = plan.steps.iter().map(|step| step.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
