use crate::registry::{
    into_value_result, parse_input, Tool, ToolContext, ToolDescriptor, ToolId, ToolResult,
    ValidationResult,
};
use asiat_security::detect_dangerous_command;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

const LONG_TIMEOUT_MS: i64 = 300_000;

/// Arguments for the run_command tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCommandInput {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory, resolved against the project root
    #[serde(default)]
    pub cwd: Option<String>,
    /// Timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

impl RunCommandInput {
    pub fn full_command(&self) -> String {
        format!("{} {}", self.command, self.args.join(" "))
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Wall-clock milliseconds
    pub duration: u64,
}

/// Runs a shell command in the project directory
pub struct RunCommandTool {
    descriptor: ToolDescriptor,
}

impl RunCommandTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                id: ToolId::RunCommand,
                description: "Execute a shell command in the project directory".to_string(),
                category: "command".to_string(),
                requires_approval: true,
                is_dangerous: true,
            },
        }
    }
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn validate(&self, input: &Value, _context: &ToolContext) -> ValidationResult {
        let input: RunCommandInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return ValidationResult::invalid(e),
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if input.command.trim().is_empty() {
            errors.push("Command is required".to_string());
        }

        // Dangerous patterns only warn; approval is the gate.
        let full_command = input.full_command();
        if !detect_dangerous_command(&full_command).is_empty() {
            warnings.push(format!("⚠️ DANGEROUS COMMAND DETECTED: {}", full_command));
        }

        match input.timeout {
            Some(timeout) if timeout < 0 => errors.push("Timeout must be positive".to_string()),
            Some(timeout) if timeout > LONG_TIMEOUT_MS => {
                warnings.push("Command timeout is very long (>5 minutes)".to_string())
            }
            _ => {}
        }

        ValidationResult::from_parts(errors, warnings)
    }

    async fn preview(&self, input: &Value, context: &ToolContext) -> String {
        let input: RunCommandInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return format!("⚡ Run command: ({})", e),
        };
        let cwd = match &input.cwd {
            Some(cwd) => cwd.clone(),
            None => context.project_root.display().to_string(),
        };

        let mut lines = vec![
            format!("⚡ Run command: {}", input.full_command()),
            format!("   Working directory: {}", cwd),
        ];
        if let Some(timeout) = input.timeout.filter(|t| *t != 0) {
            lines.push(format!("   Timeout: {}ms", timeout));
        }

        lines.join("\n")
    }

    async fn execute(&self, input: &Value, context: &ToolContext) -> ToolResult {
        let input: RunCommandInput = match parse_input(input) {
            Ok(input) => input,
            Err(e) => return ToolResult::error(e),
        };

        let full_command = input.full_command();
        let cwd = match &input.cwd {
            Some(cwd) => context.sandbox().resolve(cwd),
            None => context.project_root.clone(),
        };
        let timeout = Duration::from_millis(
            input
                .timeout
                .filter(|t| *t > 0)
                .map(|t| t as u64)
                .unwrap_or(context.command_timeout_ms),
        );

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&full_command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(env) = &input.env {
            cmd.envs(env);
        }

        debug!(command = %full_command, cwd = %cwd.display(), "Running command");
        let started = Instant::now();

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Err(_) => {
                warn!(command = %full_command, "Command timed out");
                return ToolResult::error("Command timed out").with_metadata(json!({
                    "stdout": "",
                    "stderr": "",
                    "duration": started.elapsed().as_millis() as u64,
                }));
            }
            Ok(Err(e)) => {
                return ToolResult::error(format!("Failed to execute command: {}", e))
                    .with_metadata(json!({
                        "stdout": "",
                        "stderr": "",
                        "duration": started.elapsed().as_millis() as u64,
                    }));
            }
            Ok(Ok(output)) => output,
        };

        let duration = started.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            return into_value_result(ToolResult::success(RunCommandOutput {
                stdout,
                stderr,
                exit_code: 0,
                duration,
            }));
        }

        // Killed by a signal reports no code.
        let exit_code = output.status.code().unwrap_or(1);
        ToolResult::error(format!("Command exited with code {}", exit_code)).with_metadata(json!({
            "stdout": stdout,
            "stderr": stderr,
            "exitCode": exit_code,
            "duration": duration,
        }))
    }
}
