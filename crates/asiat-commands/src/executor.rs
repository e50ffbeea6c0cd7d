use asiat_core::{AsiatError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Alternative script names tried when the requested one is not defined
const SCRIPT_ALIASES: &[(&str, &[&str])] = &[
    ("migrate", &["migrations", "db:migrate", "database:migrate"]),
    ("lint", &["lint:fix", "lint:ci"]),
    ("test", &["test:watch", "test:ci"]),
    ("build", &["compile"]),
    ("dev", &["start", "serve"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

/// Runs shell commands and package scripts in the project root.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    project_root: PathBuf,
    script_runner: String,
}

impl CommandExecutor {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            script_runner: "npm".to_string(),
        }
    }

    pub fn with_script_runner(mut self, runner: impl Into<String>) -> Self {
        self.script_runner = runner.into();
        self
    }

    /// Run through `sh -c`. A nonzero exit is a result, not an error.
    #[instrument(skip(self))]
    pub async fn run(&self, command: &str, args: &[String]) -> Result<ExecutionResult> {
        let full_command = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&full_command)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AsiatError::execution(format!("Failed to run {}: {}", full_command, e)))?;

        debug!(command = %full_command, status = %output.status, "Command finished");

        Ok(ExecutionResult {
            command: full_command,
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Script names from `package.json`, sorted. No manifest means no scripts.
    pub async fn list_scripts(&self) -> Result<Vec<String>> {
        let manifest_path = self.project_root.join("package.json");
        if !tokio::fs::try_exists(&manifest_path).await? {
            return Ok(Vec::new());
        }

        let raw = tokio::fs::read_to_string(&manifest_path).await?;
        let manifest: PackageManifest = serde_json::from_str(&raw)?;
        Ok(manifest.scripts.into_keys().collect())
    }

    pub async fn has_script(&self, name: &str) -> bool {
        self.list_scripts()
            .await
            .map(|scripts| scripts.iter().any(|script| script == name))
            .unwrap_or(false)
    }

    /// The defined script to run for `name`, trying known aliases.
    pub async fn resolve_script(&self, name: &str) -> Option<String> {
        let scripts = self.list_scripts().await.unwrap_or_default();
        if scripts.iter().any(|script| script == name) {
            return Some(name.to_string());
        }

        SCRIPT_ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .and_then(|(_, candidates)| {
                candidates
                    .iter()
                    .find(|candidate| scripts.iter().any(|script| script == *candidate))
            })
            .map(|candidate| candidate.to_string())
    }

    pub async fn run_script(&self, name: &str) -> Result<ExecutionResult> {
        self.run(&self.script_runner, &["run".to_string(), name.to_string()])
            .await
    }
}
