//! The assistant state machine: one message in, one reply out.

use crate::approval::{format_execution_result, ApprovalManager};
use crate::intent::{IntentKind, IntentParser, ParsedIntent};
use asiat_commands::executor::{CommandExecutor, ExecutionResult};
use asiat_commands::git_integration::GitManager;
use asiat_commands::patch::PatchEngine;
use asiat_commands::plan::{ActionPlan, PlanGenerator};
use asiat_commands::project_index::CodeIndex;
use asiat_commands::registry::{ToolContext, ToolId, ToolRegistry};
use asiat_core::memory::{MessageRole, SessionMemory};
use asiat_core::provider::{ProviderClient, ProviderMessage, ProviderRequest};
use asiat_core::{AsiatError, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const PERSONA: &str = "You are ASIAT, an adaptive software intelligence assistant comfortable working across all languages. Provide concise, actionable guidance grounded in the project context.";
const EXPLAIN_INSTRUCTION: &str = "Explain the referenced code to a developer. Focus on responsibilities, important APIs, and how the pieces interact.";
const REFACTOR_INSTRUCTION: &str = "Produce a unified diff (git apply format) that addresses the requested refactor. Do not include explanations outside the diff.";
const COMMIT_INSTRUCTION: &str =
    "Write a concise conventional commit-style subject line for these changes.";
const DRAFT_INSTRUCTION: &str = "Write the complete contents of the requested new file. Respond with the file content only, without explanations or code fences.";
const REWRITE_INSTRUCTION: &str = "Rewrite the file according to the instruction. Respond with the complete updated file content only, without explanations or code fences.";

const ACTION_PENDING: &str = "Another action is awaiting approval. Reply \"yes\" or \"no\" first.";
const PATCH_PENDING: &str =
    "A patch is awaiting approval. Reply \"apply patch\" or \"discard patch\" first.";

/// Memory turns included in a model request
const HISTORY_WINDOW: usize = 10;
const PATCH_PREVIEW_LINES: usize = 20;

/// A staged plan waiting for yes/no.
#[derive(Debug, Clone)]
pub struct PendingAction {
    pub kind: IntentKind,
    pub plan: ActionPlan,
    pub preview: String,
}

/// At most one thing is ever awaiting approval.
#[derive(Debug, Clone, Default)]
pub enum OrchestratorState {
    #[default]
    Idle,
    AwaitingAction(PendingAction),
    AwaitingPatch(String),
}

impl OrchestratorState {
    pub fn label(&self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::AwaitingAction(_) => "awaiting-action",
            OrchestratorState::AwaitingPatch(_) => "awaiting-patch",
        }
    }

    fn staging_refusal(&self) -> Option<&'static str> {
        match self {
            OrchestratorState::Idle => None,
            OrchestratorState::AwaitingAction(_) => Some(ACTION_PENDING),
            OrchestratorState::AwaitingPatch(_) => Some(PATCH_PENDING),
        }
    }
}

/// Collaborators the assistant drives.
pub struct AssistantDeps {
    pub intents: IntentParser,
    pub index: CodeIndex,
    pub git: GitManager,
    pub provider: Arc<dyn ProviderClient>,
    pub patches: PatchEngine,
    pub executor: CommandExecutor,
    pub memory: SessionMemory,
    pub registry: Arc<ToolRegistry>,
    pub approval: Arc<ApprovalManager>,
    pub tool_context: ToolContext,
}

pub struct Assistant {
    intents: IntentParser,
    index: CodeIndex,
    git: GitManager,
    provider: Arc<dyn ProviderClient>,
    patches: PatchEngine,
    executor: CommandExecutor,
    memory: SessionMemory,
    registry: Arc<ToolRegistry>,
    approval: Arc<ApprovalManager>,
    plans: PlanGenerator,
    tool_context: ToolContext,
    state: OrchestratorState,
}

impl Assistant {
    pub fn new(deps: AssistantDeps) -> Self {
        Self {
            plans: PlanGenerator::new(deps.registry.clone()),
            intents: deps.intents,
            index: deps.index,
            git: deps.git,
            provider: deps.provider,
            patches: deps.patches,
            executor: deps.executor,
            memory: deps.memory,
            registry: deps.registry,
            approval: deps.approval,
            tool_context: deps.tool_context,
            state: OrchestratorState::Idle,
        }
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    pub fn git(&self) -> &GitManager {
        &self.git
    }

    pub fn approval(&self) -> &Arc<ApprovalManager> {
        &self.approval
    }

    pub fn tool_context(&self) -> &ToolContext {
        &self.tool_context
    }

    pub fn index(&self) -> &CodeIndex {
        &self.index
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn reindex(&mut self) -> Result<usize> {
        self.index.index_project().await
    }

    /// What is awaiting approval, rendered for display.
    pub fn pending_summary(&self) -> Option<String> {
        match &self.state {
            OrchestratorState::Idle => None,
            OrchestratorState::AwaitingAction(pending) => Some(format!(
                "{}\nReply \"yes\" to proceed or \"no\" to cancel.",
                pending.preview
            )),
            OrchestratorState::AwaitingPatch(patch) => Some(format!(
                "Proposed patch:\n\n{}\n\nReply \"apply patch\" to apply or \"discard patch\" to cancel.",
                patch
            )),
        }
    }

    /// Handle one user message. Failures come back as reply text.
    #[instrument(skip(self, message), fields(state = self.state.label()))]
    pub async fn handle_message(&mut self, message: &str) -> String {
        self.memory.add(MessageRole::User, message);
        let reply = self.dispatch(message).await;
        self.memory.add(MessageRole::Assistant, reply.as_str());
        reply
    }

    async fn dispatch(&mut self, message: &str) -> String {
        if matches!(self.state, OrchestratorState::AwaitingAction(_)) {
            match message.trim().to_lowercase().as_str() {
                "yes" | "y" => return self.execute_pending_action().await,
                "no" | "n" | "cancel" => {
                    self.state = OrchestratorState::Idle;
                    info!("Pending action cancelled");
                    return "Cancelled pending action.".to_string();
                }
                _ => {}
            }
        }

        let intent = self.intents.parse(message);
        debug!(intent = %intent.kind, arguments = ?intent.arguments, "Classified message");

        match self.route(message, &intent).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(intent = %intent.kind, error = %e, "Message handling failed");
                format!("Error: {}", e)
            }
        }
    }

    async fn route(&mut self, message: &str, intent: &ParsedIntent) -> Result<String> {
        match intent.kind {
            IntentKind::Run => Ok(self.handle_run(message, intent).await),
            IntentKind::Git => Ok(self.handle_git(intent).await),
            IntentKind::ReadFile => Ok(self.handle_read_file(intent).await),
            IntentKind::CreateFile => {
                self.handle_create_file(message, intent.arg("path"), intent.arg("content"))
                    .await
            }
            IntentKind::ModifyFile => self.handle_modify_file(message, intent).await,
            IntentKind::DeleteFile => Ok(self.handle_delete_file(intent).await),
            IntentKind::RunCommand => Ok(self.handle_run_command(message, intent).await),
            IntentKind::Explain => self.handle_explain(message, intent).await,
            IntentKind::Refactor => self.handle_refactor(message, intent).await,
            IntentKind::ApplyPatch => Ok(self.apply_pending_patch().await),
            IntentKind::DiscardPatch => Ok(self.discard_pending_patch()),
            IntentKind::Unknown => match self.intents.creation_target(message) {
                Some(path) => {
                    let path = path.to_string();
                    self.handle_create_file(message, Some(&path), None).await
                }
                None => self.handle_general_conversation(message).await,
            },
        }
    }

    async fn handle_run(&self, message: &str, intent: &ParsedIntent) -> String {
        let outcome = match intent.arg("script") {
            Some(script) => match self.executor.resolve_script(script).await {
                Some(resolved) => self.executor.run_script(&resolved).await,
                None => {
                    let scripts = self.executor.list_scripts().await.unwrap_or_default();
                    let available = if scripts.is_empty() {
                        "none".to_string()
                    } else {
                        scripts.join(", ")
                    };
                    return format!(
                        "No script named \"{}\" is defined. Available scripts: {}",
                        script, available
                    );
                }
            },
            None => {
                let command = intent.arg("command").unwrap_or(message.trim());
                self.executor.run(command, &[]).await
            }
        };

        match outcome {
            Ok(result) => format_command_output(&result),
            Err(e) => format!("Failed to run command: {}", e),
        }
    }

    async fn handle_git(&self, intent: &ParsedIntent) -> String {
        match self.git_action(intent).await {
            Ok(reply) => reply,
            Err(AsiatError::Git { message }) => format!("Git command failed: {}", message),
            Err(e) => format!("Git command failed: {}", e),
        }
    }

    async fn git_action(&self, intent: &ParsedIntent) -> Result<String> {
        match intent.arg("action") {
            Some("create-branch") => {
                let Some(name) = intent.arg("name") else {
                    return Ok("Branch name is required.".to_string());
                };
                self.git.create_branch(name).await?;
                Ok(format!("Created and switched to branch {}.", name))
            }
            Some("commit") => {
                let Some(message) = intent.arg("message") else {
                    return Ok("Commit message is required.".to_string());
                };
                self.git.commit(message).await?;
                Ok(format!("Committed changes with message: {}", message))
            }
            Some("show-unstaged") => {
                let diff = self.git.unstaged_changes().await?;
                Ok(if diff.trim().is_empty() {
                    "No unstaged changes found.".to_string()
                } else {
                    diff
                })
            }
            Some("generate-commit-message") => {
                let staged = self.git.staged_diff().await?;
                let diff = if staged.trim().is_empty() {
                    self.git.diff(None).await?
                } else {
                    staged
                };
                if diff.trim().is_empty() {
                    return Ok("No changes detected to summarize.".to_string());
                }
                let reply = self.ask_model(COMMIT_INSTRUCTION, &diff).await?;
                Ok(non_empty_or(
                    reply,
                    "Language model did not return a commit message.",
                ))
            }
            _ => Ok(self.git.status().await?.summary()),
        }
    }

    async fn handle_read_file(&self, intent: &ParsedIntent) -> String {
        let Some(path) = intent.arg("path") else {
            return "Please specify the file to read.".to_string();
        };

        let input = json!({ "filePath": path });
        let result = self
            .registry
            .execute(ToolId::ReadFile, &input, &self.tool_context)
            .await;
        self.approval
            .record_execution(ToolId::ReadFile, &input, &result)
            .await;

        match (result.is_success(), result.data.as_ref()) {
            (true, Some(data)) => {
                let content = data.get("content").and_then(Value::as_str).unwrap_or("");
                let lines = data.get("lines").and_then(Value::as_u64).unwrap_or(0);
                format!("📄 {} ({} lines)\n\n{}", path, lines, content)
            }
            _ => format_execution_result(&result),
        }
    }

    async fn handle_create_file(
        &mut self,
        message: &str,
        path: Option<&str>,
        content: Option<&str>,
    ) -> Result<String> {
        if let Some(refusal) = self.state.staging_refusal() {
            return Ok(refusal.to_string());
        }

        let path = path
            .map(str::to_string)
            .unwrap_or_else(|| format!("notes/{}.md", Uuid::new_v4()));
        let content = match content {
            Some(content) => content.to_string(),
            None => self.draft_file_content(message, &path).await,
        };

        let plan = self.plans.create_file(&path, &content);
        Ok(self.stage(IntentKind::CreateFile, plan).await)
    }

    /// Model-drafted content, or the extension template when the model cannot help.
    async fn draft_file_content(&self, message: &str, path: &str) -> String {
        let prompt = format!("File path: {}\n\nRequest: {}", path, message);
        match self.ask_model(DRAFT_INSTRUCTION, &prompt).await {
            Ok(draft) => {
                let draft = strip_code_fences(&draft);
                if draft.is_empty() {
                    template_for(path)
                } else {
                    format!("{}\n", draft)
                }
            }
            Err(e) => {
                warn!(path, error = %e, "Drafting failed, using template");
                template_for(path)
            }
        }
    }

    async fn handle_modify_file(&mut self, message: &str, intent: &ParsedIntent) -> Result<String> {
        if let Some(refusal) = self.state.staging_refusal() {
            return Ok(refusal.to_string());
        }
        let Some(path) = intent.arg("path") else {
            return Ok("Please specify the file to modify.".to_string());
        };

        let read = self
            .registry
            .execute(
                ToolId::ReadFile,
                &json!({ "filePath": path }),
                &self.tool_context,
            )
            .await;
        let current = match (read.is_success(), read.data.as_ref()) {
            (true, Some(data)) => data
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            _ => return Ok(format_execution_result(&read)),
        };

        let instruction = intent.arg("instruction").unwrap_or(message.trim());
        let prompt = format!(
            "File: {}\nInstruction: {}\n\nCurrent content:\n{}",
            path, instruction, current
        );
        let rewritten = strip_code_fences(&self.ask_model(REWRITE_INSTRUCTION, &prompt).await?);
        if rewritten.is_empty() {
            return Ok("Model did not return updated content.".to_string());
        }

        let plan = self
            .plans
            .modify_file(path, &format!("{}\n", rewritten));
        Ok(self.stage(IntentKind::ModifyFile, plan).await)
    }

    async fn handle_delete_file(&mut self, intent: &ParsedIntent) -> String {
        if let Some(refusal) = self.state.staging_refusal() {
            return refusal.to_string();
        }
        let Some(path) = intent.arg("path") else {
            return "Please specify the file to delete.".to_string();
        };

        let plan = self.plans.delete_file(path, false);
        self.stage(IntentKind::DeleteFile, plan).await
    }

    async fn handle_run_command(&mut self, message: &str, intent: &ParsedIntent) -> String {
        if let Some(refusal) = self.state.staging_refusal() {
            return refusal.to_string();
        }

        let command = intent.arg("command").unwrap_or(message.trim());
        let plan = self.plans.run_command(command, &[]);
        self.stage(IntentKind::RunCommand, plan).await
    }

    async fn stage(&mut self, kind: IntentKind, plan: ActionPlan) -> String {
        let preview = self
            .approval
            .generate_plan_preview(&plan, &self.tool_context)
            .await;
        info!(kind = %kind, plan = %plan.title, danger = %plan.danger_level, "Staged action");

        let reply = format!("{}\nReply \"yes\" to proceed or \"no\" to cancel.", preview);
        self.state = OrchestratorState::AwaitingAction(PendingAction {
            kind,
            plan,
            preview,
        });
        reply
    }

    async fn execute_pending_action(&mut self) -> String {
        let OrchestratorState::AwaitingAction(pending) =
            std::mem::take(&mut self.state)
        else {
            return "No action is awaiting approval.".to_string();
        };

        let plan = pending.plan;
        let total = plan.steps.len();
        let mut lines = vec![format!("Executing plan: {}", plan.title)];
        let mut files_changed = false;

        for (i, step) in plan.steps.iter().enumerate() {
            let result = self
                .registry
                .execute(step.tool, &step.input, &self.tool_context)
                .await;
            let record = self
                .approval
                .record_execution(step.tool, &step.input, &result)
                .await;

            lines.push(format!("\n[{}/{}] {}", i + 1, total, step.description));
            lines.push(format_execution_result(&result));

            if result.is_success() {
                if step.tool == ToolId::RunCommand {
                    if let Some(output) = result.data.as_ref().and_then(command_output_block) {
                        lines.push(output);
                    }
                }
                if modifies_files(step.tool) {
                    files_changed = true;
                }
                if record.can_rollback {
                    lines.push(format!("   Rollback id: {}", record.id));
                }
            } else if step.required {
                warn!(step = %step.description, error = ?result.error, "Required step failed");
                lines.push("\nStopped: a required step failed.".to_string());
                break;
            }
        }

        if files_changed {
            if let Err(e) = self.index.index_project().await {
                warn!(error = %e, "Re-index after plan failed");
            }
        }

        lines.join("\n")
    }

    async fn handle_explain(&self, message: &str, intent: &ParsedIntent) -> Result<String> {
        let focus = intent.arg("path").unwrap_or(message);
        let related = self.index.search(focus, 4);
        if related.is_empty() {
            return Ok("No relevant files found to explain.".to_string());
        }

        let mut blocks = Vec::with_capacity(related.len());
        for file in &related {
            let summary = self.index.describe_file(&file.path, intent.arg("symbol")).await;
            blocks.push(format!(
                "File: {}\nSummary:\n{}\nExcerpt:\n{}",
                file.path,
                summary,
                excerpt(&file.content, 500)
            ));
        }

        let prompt = format!(
            "User request: {}\n\nCode context:\n{}",
            message,
            blocks.join("\n\n")
        );
        let reply = self.ask_model(EXPLAIN_INSTRUCTION, &prompt).await?;
        Ok(non_empty_or(reply, "No explanation available."))
    }

    async fn handle_refactor(&mut self, message: &str, intent: &ParsedIntent) -> Result<String> {
        if let Some(refusal) = self.state.staging_refusal() {
            return Ok(refusal.to_string());
        }

        let focus = intent.arg("path").unwrap_or(message);
        let related = self.index.search(focus, 4);
        if related.is_empty() {
            return Ok("No relevant files found to refactor.".to_string());
        }

        let mut blocks = Vec::with_capacity(related.len());
        for file in &related {
            let summary = self.index.describe_file(&file.path, None).await;
            blocks.push(format!(
                "File: {}\nSummary:\n{}\nExcerpt:\n{}",
                file.path,
                summary,
                excerpt(&file.content, 400)
            ));
        }

        let prompt = format!(
            "Refactor request: {}\n\nProject context:\n{}",
            message,
            blocks.join("\n\n")
        );
        let patch = self.ask_model(REFACTOR_INSTRUCTION, &prompt).await?;

        if !patch.contains("diff --git") {
            return Ok(non_empty_or(
                patch,
                "Model did not return a valid patch. Please refine the request.",
            ));
        }

        let reply = format!(
            "Proposed patch:\n\n{}\n\nReply \"apply patch\" to apply or \"discard patch\" to cancel.",
            patch
        );
        info!(bytes = patch.len(), "Staged patch");
        self.state = OrchestratorState::AwaitingPatch(patch);
        Ok(reply)
    }

    async fn apply_pending_patch(&mut self) -> String {
        let OrchestratorState::AwaitingPatch(patch) = &self.state else {
            return "No patch is awaiting approval.".to_string();
        };
        let patch = patch.clone();

        match self.patches.apply_unified_diff(&patch).await {
            Ok(files) => {
                info!(files = files.len(), "Applied patch");
                self.state = OrchestratorState::Idle;
                if let Err(e) = self.index.index_project().await {
                    warn!(error = %e, "Re-index after patch failed");
                }
                let preview: Vec<&str> = patch.lines().take(PATCH_PREVIEW_LINES).collect();
                format!("Patch applied successfully. Preview:\n{}", preview.join("\n"))
            }
            Err(e) => {
                warn!(error = %e, "Patch failed, keeping it pending");
                format!("Failed to apply patch: {}", e)
            }
        }
    }

    fn discard_pending_patch(&mut self) -> String {
        if !matches!(self.state, OrchestratorState::AwaitingPatch(_)) {
            return "No patch to discard.".to_string();
        }
        self.state = OrchestratorState::Idle;
        "Discarded pending patch.".to_string()
    }

    async fn handle_general_conversation(&self, message: &str) -> Result<String> {
        let related = self.index.search(message, 3);
        let mut blocks = Vec::with_capacity(related.len());
        for file in &related {
            let summary = self.index.describe_file(&file.path, None).await;
            blocks.push(format!("File: {}\nSummary:\n{}", file.path, summary));
        }

        let prompt = if blocks.is_empty() {
            format!("User request: {}", message)
        } else {
            format!(
                "User request: {}\n\nIndexed context:\n{}",
                message,
                blocks.join("\n\n")
            )
        };

        let reply = self.ask_model(PERSONA, &prompt).await?;
        Ok(non_empty_or(reply, "No response from language model."))
    }

    /// System instruction, the recent conversation, then the prompt. The
    /// current user turn is already in memory, so a trailing user entry is
    /// dropped in favor of `prompt`.
    fn build_messages(&self, system: &str, prompt: &str) -> Vec<ProviderMessage> {
        let mut history = self.memory.recent(HISTORY_WINDOW).to_vec();
        if history
            .last()
            .is_some_and(|entry| entry.role == MessageRole::User)
        {
            history.pop();
        }

        std::iter::once(ProviderMessage::system(system))
            .chain(history.into_iter().map(|entry| ProviderMessage {
                role: entry.role,
                content: entry.content,
            }))
            .chain(std::iter::once(ProviderMessage::user(prompt)))
            .collect()
    }

    #[instrument(skip_all, fields(provider = self.provider.name()))]
    async fn ask_model(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ProviderRequest::new(
            self.build_messages(system, prompt),
            self.provider.default_model(),
        );
        let response = self.provider.complete(request).await?;
        debug!(model = %response.model, usage = ?response.usage, "Model replied");
        Ok(response.content.trim().to_string())
    }
}

fn modifies_files(tool: ToolId) -> bool {
    matches!(
        tool,
        ToolId::CreateFile | ToolId::WriteFile | ToolId::DeleteFile
    )
}

fn non_empty_or(text: String, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

fn excerpt(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

/// Executor output as `command`, `stdout`, `stderr` and `exit code` blocks.
pub fn format_command_output(result: &ExecutionResult) -> String {
    let mut parts = vec![format!("command: {}", result.command)];
    if !result.stdout.trim().is_empty() {
        parts.push(format!("stdout:\n{}", result.stdout.trim()));
    }
    if !result.stderr.trim().is_empty() {
        parts.push(format!("stderr:\n{}", result.stderr.trim()));
    }
    parts.push(format!(
        "exit code: {}",
        result
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string())
    ));
    parts.join("\n\n")
}

fn command_output_block(data: &Value) -> Option<String> {
    let mut parts = Vec::new();
    for stream in ["stdout", "stderr"] {
        if let Some(text) = data.get(stream).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                parts.push(format!("{}:\n{}", stream, text.trim()));
            }
        }
    }
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

/// Remove a surrounding markdown code fence, if any.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim_end()
        .to_string()
}

/// Starter content used when no draft is available.
fn template_for(path: &str) -> String {
    let path = Path::new(path);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("md") => format!("# {}\n\n", stem),
        Some("rs") => format!("//! {}\n\npub fn run() {{}}\n", stem),
        Some("ts") | Some("js") => format!("// {}\n\nexport {{}};\n", file_name),
        Some("json") => "{}\n".to_string(),
        Some("py") => format!(
            "\"\"\"{}\"\"\"\n\n\ndef main():\n    pass\n\n\nif __name__ == \"__main__\":\n    main()\n",
            stem
        ),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asiat_commands::common::initialize_builtin_tools;
    use asiat_core::memory::MemoryEntry;
    use asiat_core::provider::ProviderResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies with queued answers and remembers every request.
    #[derive(Default)]
    struct ScriptedProvider {
        replies: Mutex<Vec<std::result::Result<String, String>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn with_replies(replies: Vec<std::result::Result<&str, &str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|reply| reply.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse> {
            let id = request.id;
            self.requests.lock().unwrap().push(request);
            match self.replies.lock().unwrap().pop() {
                Some(Ok(content)) => Ok(ProviderResponse {
                    id,
                    content,
                    model: "scripted-1".to_string(),
                    usage: None,
                }),
                Some(Err(message)) => Err(AsiatError::provider(message)),
                None => Err(AsiatError::provider("no scripted reply")),
            }
        }
    }

    async fn assistant(root: &Path, provider: Arc<dyn ProviderClient>) -> Assistant {
        let registry = Arc::new(initialize_builtin_tools().await.unwrap());
        Assistant::new(AssistantDeps {
            intents: IntentParser::new().unwrap(),
            index: CodeIndex::new(root, root.join(".asiat/index.json")),
            git: GitManager::new(root),
            provider,
            patches: PatchEngine::new(root),
            executor: CommandExecutor::new(root),
            memory: SessionMemory::new(),
            approval: Arc::new(ApprovalManager::new(registry.clone())),
            registry,
            tool_context: ToolContext::new(root),
        })
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```rust\nfn a() {}\n```"), "fn a() {}");
        assert_eq!(strip_code_fences("```\nplain\n```\n"), "plain");
        assert_eq!(strip_code_fences("  no fences \n"), "no fences");
        assert_eq!(strip_code_fences("```"), "");
    }

    #[test]
    fn test_templates_by_extension() {
        assert_eq!(template_for("notes/todo.md"), "# todo\n\n");
        assert!(template_for("src/util.rs").contains("pub fn run() {}"));
        assert_eq!(template_for("a/b.ts"), "// b.ts\n\nexport {};\n");
        assert_eq!(template_for("a/b.js"), "// b.js\n\nexport {};\n");
        assert_eq!(template_for("config.json"), "{}\n");
        assert!(template_for("tool.py").contains("def main():"));
        assert_eq!(template_for("data.csv"), "");
    }

    #[test]
    fn test_format_command_output() {
        let result = ExecutionResult {
            command: "npm run build".to_string(),
            exit_code: Some(1),
            stdout: "compiling\n".to_string(),
            stderr: "  ".to_string(),
        };
        assert_eq!(
            format_command_output(&result),
            "command: npm run build\n\nstdout:\ncompiling\n\nexit code: 1"
        );

        let killed = ExecutionResult {
            exit_code: None,
            stdout: String::new(),
            ..result
        };
        assert_eq!(format_command_output(&killed), "command: npm run build\n\nexit code: none");
    }

    #[tokio::test]
    async fn test_build_messages_drops_trailing_user_turn() {
        let temp_dir = TempDir::new().unwrap();
        let mut assistant = assistant(temp_dir.path(), ScriptedProvider::with_replies(vec![])).await;
        for i in 0..12 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            assistant.memory.add(role, format!("turn {}", i));
        }
        assistant.memory.add(MessageRole::User, "current");

        let messages = assistant.build_messages("system text", "prompt text");
        assert_eq!(messages.first().unwrap(), &ProviderMessage::system("system text"));
        assert_eq!(messages.last().unwrap(), &ProviderMessage::user("prompt text"));
        // 10 recent entries minus the trailing user turn
        assert_eq!(messages.len(), 1 + 9 + 1);
        assert_eq!(messages[1].content, "turn 3");
        assert!(!messages.iter().any(|m| m.content == "current"));
    }

    #[tokio::test]
    async fn test_memory_records_both_sides() {
        let temp_dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::with_replies(vec![Ok("hello back")]);
        let mut assistant = assistant(temp_dir.path(), provider.clone()).await;

        let reply = assistant.handle_message("hello there").await;
        assert_eq!(reply, "hello back");

        let entries: Vec<&MemoryEntry> = assistant.memory().list().iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, MessageRole::User);
        assert_eq!(entries[1].content, "hello back");

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].model, "scripted-1");
        assert_eq!(requests[0].messages[0].content, PERSONA);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].messages[1].content, "User request: hello there");
    }

    #[tokio::test]
    async fn test_create_file_with_content_stages_then_executes() {
        let temp_dir = TempDir::new().unwrap();
        let mut assistant = assistant(temp_dir.path(), ScriptedProvider::with_replies(vec![])).await;

        let reply = assistant
            .handle_message("create file notes/todo.md with content buy milk")
            .await;
        assert!(reply.contains("📋 ACTION PLAN: Create file: notes/todo.md"));
        assert!(reply.ends_with("Reply \"yes\" to proceed or \"no\" to cancel."));
        assert!(matches!(assistant.state(), OrchestratorState::AwaitingAction(_)));
        assert!(!temp_dir.path().join("notes/todo.md").exists());

        let reply = assistant.handle_message("  YES ").await;
        assert!(reply.contains("[1/1] Create notes/todo.md"), "{reply}");
        assert!(reply.contains("✅ SUCCESS"));
        assert!(matches!(assistant.state(), OrchestratorState::Idle));
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("notes/todo.md")).unwrap(),
            "buy milk"
        );
        assert_eq!(assistant.approval().history(None).await.len(), 1);
        assert!(assistant.index().files().iter().any(|f| f.path.ends_with("todo.md")));
    }

    #[tokio::test]
    async fn test_create_file_falls_back_to_template_on_model_failure() {
        let temp_dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::with_replies(vec![Err("connection refused")]);
        let mut assistant = assistant(temp_dir.path(), provider).await;

        assistant.handle_message("create file notes/plan.md").await;
        let OrchestratorState::AwaitingAction(pending) = assistant.state() else {
            panic!("expected a staged action");
        };
        assert_eq!(pending.kind, IntentKind::CreateFile);
        assert_eq!(pending.plan.steps[0].input["content"], json!("# plan\n\n"));
    }

    #[tokio::test]
    async fn test_create_file_uses_model_draft() {
        let temp_dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::with_replies(vec![Ok("```rust\npub fn add() {}\n```")]);
        let mut assistant = assistant(temp_dir.path(), provider).await;

        assistant.handle_message("new file src/add.rs").await;
        let OrchestratorState::AwaitingAction(pending) = assistant.state() else {
            panic!("expected a staged action");
        };
        assert_eq!(pending.plan.steps[0].input["content"], json!("pub fn add() {}\n"));
    }

    #[tokio::test]
    async fn test_other_input_keeps_pending_action_and_staging_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("old.txt"), "x").unwrap();
        let provider = ScriptedProvider::with_replies(vec![Ok("sure")]);
        let mut assistant = assistant(temp_dir.path(), provider).await;

        let reply = assistant.handle_message("delete file old.txt").await;
        assert!(reply.contains("🚨 DANGEROUS"));

        assert_eq!(assistant.handle_message("what is up").await, "sure");
        assert!(matches!(assistant.state(), OrchestratorState::AwaitingAction(_)));

        let refused = assistant
            .handle_message("create file notes/b.md with content b")
            .await;
        assert_eq!(refused, ACTION_PENDING);

        assert_eq!(assistant.handle_message("n").await, "Cancelled pending action.");
        assert!(matches!(assistant.state(), OrchestratorState::Idle));
        assert!(temp_dir.path().join("old.txt").exists());
    }

    #[tokio::test]
    async fn test_unknown_creation_request_routes_to_create_file() {
        let temp_dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::with_replies(vec![Ok("{\"debug\": true}")]);
        let mut assistant = assistant(temp_dir.path(), provider).await;

        let reply = assistant
            .handle_message("please write a small config file conf/app.json")
            .await;
        assert!(reply.contains("Create file: conf/app.json"));
        assert!(matches!(assistant.state(), OrchestratorState::AwaitingAction(_)));
    }

    #[tokio::test]
    async fn test_read_file_replies_with_content() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("README.md"), "# Demo\nline two").unwrap();
        let mut assistant = assistant(temp_dir.path(), ScriptedProvider::with_replies(vec![])).await;

        let reply = assistant.handle_message("read file README.md").await;
        assert_eq!(reply, "📄 README.md (2 lines)\n\n# Demo\nline two");
        assert_eq!(assistant.approval().history(None).await.len(), 1);

        let missing = assistant.handle_message("read file nope.md").await;
        assert!(missing.starts_with("❌ ERROR"), "{missing}");
    }

    #[tokio::test]
    async fn test_modify_file_model_failure_is_error_and_stays_idle() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.ts"), "let a = 1;\n").unwrap();
        let provider = ScriptedProvider::with_replies(vec![Err("HTTP 500")]);
        let mut assistant = assistant(temp_dir.path(), provider).await;

        let reply = assistant
            .handle_message("edit file a.ts to use const")
            .await;
        assert_eq!(reply, "Error: Provider error: HTTP 500");
        assert!(matches!(assistant.state(), OrchestratorState::Idle));
    }

    #[tokio::test]
    async fn test_modify_file_stages_rewrite() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.ts"), "let a = 1;\n").unwrap();
        let provider = ScriptedProvider::with_replies(vec![Ok("const a = 1;")]);
        let mut assistant = assistant(temp_dir.path(), provider.clone()).await;

        let reply = assistant
            .handle_message("edit file a.ts to use const")
            .await;
        assert!(reply.contains("Modify file: a.ts"));
        assert!(reply.contains("⚠️ CAUTION"));

        let prompt = provider.requests.lock().unwrap()[0]
            .messages
            .last()
            .unwrap()
            .content
            .clone();
        assert!(prompt.contains("Instruction: use const"));
        assert!(prompt.contains("let a = 1;"));

        assistant.handle_message("y").await;
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("a.ts")).unwrap(),
            "const a = 1;\n"
        );
    }

    #[tokio::test]
    async fn test_run_unknown_script_lists_available() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("package.json"),
            r#"{ "scripts": { "start": "node .", "compile": "tsc" } }"#,
        )
        .unwrap();
        let mut assistant = assistant(temp_dir.path(), ScriptedProvider::with_replies(vec![])).await;

        assert_eq!(
            assistant.handle_message("lint everything").await,
            "No script named \"lint\" is defined. Available scripts: compile, start"
        );
    }

    #[tokio::test]
    async fn test_explain_without_index_hits() {
        let temp_dir = TempDir::new().unwrap();
        let mut assistant = assistant(temp_dir.path(), ScriptedProvider::with_replies(vec![])).await;
        assert_eq!(
            assistant.handle_message("explain the parser").await,
            "No relevant files found to explain."
        );
    }

    #[tokio::test]
    async fn test_explain_sends_context_blocks() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("lib.rs"),
            "pub fn parse(input: &str) -> usize { input.len() }\n",
        )
        .unwrap();
        let provider = ScriptedProvider::with_replies(vec![Ok("  It parses.  ")]);
        let mut assistant = assistant(temp_dir.path(), provider.clone()).await;
        assistant.reindex().await.unwrap();

        let reply = assistant
            .handle_message("explain function parse in file lib.rs")
            .await;
        assert_eq!(reply, "It parses.");

        let requests = provider.requests.lock().unwrap();
        let prompt = &requests[0].messages.last().unwrap().content;
        assert_eq!(requests[0].messages[0].content, EXPLAIN_INSTRUCTION);
        assert!(prompt.starts_with("User request: explain function parse in file lib.rs"));
        assert!(prompt.contains("File: lib.rs\nSummary:\n"));
        assert!(prompt.contains("Excerpt:\npub fn parse"));
    }

    #[tokio::test]
    async fn test_patch_commands_without_pending_patch() {
        let temp_dir = TempDir::new().unwrap();
        let mut assistant = assistant(temp_dir.path(), ScriptedProvider::with_replies(vec![])).await;
        assert_eq!(
            assistant.handle_message("apply patch").await,
            "No patch is awaiting approval."
        );
        assert_eq!(
            assistant.handle_message("discard patch").await,
            "No patch to discard."
        );
    }
}
