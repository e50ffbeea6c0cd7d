//! Plan and action previews, execution history and rollback.

use asiat_commands::plan::ActionPlan;
use asiat_commands::registry::{ToolContext, ToolId, ToolRegistry, ToolResult, ToolStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const RULE_WIDTH: usize = 60;

fn heavy_rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn light_rule() -> String {
    "─".repeat(RULE_WIDTH)
}

/// One executed tool call. Kept in memory for the life of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tool: ToolId,
    pub input: Value,
    pub result: ToolResult,
    pub can_rollback: bool,
}

pub struct ApprovalManager {
    registry: Arc<ToolRegistry>,
    history: RwLock<Vec<ExecutionRecord>>,
}

impl ApprovalManager {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn generate_plan_preview(&self, plan: &ActionPlan, context: &ToolContext) -> String {
        let mut lines = vec![
            format!("\n{}", heavy_rule()),
            format!("📋 ACTION PLAN: {}", plan.title),
            heavy_rule(),
        ];

        if !plan.description.is_empty() {
            lines.push(format!("\n{}", plan.description));
        }

        lines.push(format!(
            "\n⚠️ Danger Level: {} {}",
            plan.danger_level.emoji(),
            plan.danger_level.as_str().to_uppercase()
        ));
        lines.push(format!("📊 Total Steps: {}", plan.steps.len()));
        if let Some(duration) = plan.estimated_duration.filter(|d| *d > 0) {
            lines.push(format!("⏱️ Estimated Duration: {}s", duration));
        }

        lines.push(format!("\n{}", light_rule()));
        lines.push("STEPS:".to_string());
        lines.push(format!("{}\n", light_rule()));

        let total = plan.steps.len();
        for (i, step) in plan.steps.iter().enumerate() {
            lines.push(format!("[{}/{}] {}", i + 1, total, step.description));

            let preview = self.registry.preview(step.tool, &step.input, context).await;
            lines.push(format!("      {}", preview.replace('\n', "\n      ")));

            if !step.depends_on.is_empty() {
                lines.push(format!("      📌 Depends on: {}", step.depends_on.join(", ")));
            }
            if !step.required {
                lines.push("      ℹ️ Optional step (failure won't stop plan)".to_string());
            }
            lines.push(String::new());
        }

        lines.push(format!("{}\n", heavy_rule()));
        lines.join("\n")
    }

    pub async fn generate_action_preview(
        &self,
        tool: ToolId,
        input: &Value,
        context: &ToolContext,
    ) -> String {
        let Some(tool) = self.registry.get(tool).await else {
            return format!("❌ Tool \"{}\" not found", tool);
        };
        let descriptor = tool.descriptor();

        let lines = [
            format!("\n{}", heavy_rule()),
            format!("🔧 {}", descriptor.name().to_uppercase()),
            heavy_rule(),
            format!("\n{}", descriptor.description),
            format!("\nCategory: {}", descriptor.category),
            format!(
                "Requires Approval: {}",
                if descriptor.requires_approval { "YES" } else { "NO" }
            ),
            format!(
                "Dangerous: {}",
                if descriptor.is_dangerous { "⚠️ YES" } else { "NO" }
            ),
            format!("\n{}", light_rule()),
            "PREVIEW:".to_string(),
            format!("{}\n", light_rule()),
            tool.preview(input, context).await,
            format!("\n{}\n", heavy_rule()),
        ];
        lines.join("\n")
    }

    /// Append a record. Rollback is offered only for successful runs of tools that support it.
    pub async fn record_execution(
        &self,
        tool: ToolId,
        input: &Value,
        result: &ToolResult,
    ) -> ExecutionRecord {
        let supports_rollback = match self.registry.get(tool).await {
            Some(tool) => tool.supports_rollback(),
            None => false,
        };

        let record = ExecutionRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tool,
            input: input.clone(),
            result: result.clone(),
            can_rollback: supports_rollback && result.is_success(),
        };
        debug!(record_id = %record.id, tool = %tool, status = ?result.status, "Recorded execution");

        self.history.write().await.push(record.clone());
        record
    }

    /// Newest first. `None` returns the whole history.
    pub async fn history(&self, limit: Option<usize>) -> Vec<ExecutionRecord> {
        let history = self.history.read().await;
        history
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub async fn get_record(&self, id: Uuid) -> Option<ExecutionRecord> {
        self.history
            .read()
            .await
            .iter()
            .find(|record| record.id == id)
            .cloned()
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }

    #[instrument(skip(self, context))]
    pub async fn rollback(&self, record_id: Uuid, context: &ToolContext) -> ToolResult<()> {
        let Some(record) = self.get_record(record_id).await else {
            return ToolResult::error("Execution record not found");
        };

        if !record.can_rollback {
            return ToolResult::error("This action cannot be rolled back");
        }

        let tool = match self.registry.get(record.tool).await {
            Some(tool) if tool.supports_rollback() => tool,
            _ => return ToolResult::error("Tool does not support rollback"),
        };

        let result = tool.rollback(&record.input, context, &record.result).await;
        if result.is_success() {
            info!(record_id = %record_id, tool = %record.tool, "Rolled back execution");
        } else {
            warn!(record_id = %record_id, error = ?result.error, "Rollback failed");
        }
        result
    }
}

/// Render a result as the status banner plus an optional metadata block.
pub fn format_execution_result<T>(result: &ToolResult<T>) -> String {
    let mut lines = Vec::new();

    match result.status {
        ToolStatus::Success => lines.push("✅ SUCCESS".to_string()),
        ToolStatus::Error => {
            lines.push("❌ ERROR".to_string());
            if let Some(error) = &result.error {
                lines.push(format!("   {}", error));
            }
        }
        ToolStatus::Cancelled => lines.push("🚫 CANCELLED".to_string()),
        ToolStatus::Pending => lines.push("⏳ PENDING".to_string()),
    }

    if let Some(metadata) = &result.metadata {
        lines.push("\n📊 Metadata:".to_string());
        lines.push(serde_json::to_string_pretty(metadata).unwrap_or_else(|_| metadata.to_string()));
    }

    lines.join("\n")
}
