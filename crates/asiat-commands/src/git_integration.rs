use asiat_core::{AsiatError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Summary of `git status --porcelain=v2 --branch`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatus {
    pub branch: String,
    pub ahead: u32,
    pub behind: u32,
    /// Porcelain entries with the record-type prefix removed
    pub changes: Vec<String>,
}

impl GitStatus {
    /// Multi-line summary for display.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Branch: {}", self.branch),
            format!("Ahead: {}, Behind: {}", self.ahead, self.behind),
        ];
        if self.changes.is_empty() {
            lines.push("No pending changes.".to_string());
        } else {
            lines.push("Changes:".to_string());
            lines.extend(self.changes.iter().cloned());
        }
        lines.join("\n")
    }
}

/// Parse porcelain v2 output. Missing headers fall back to `unknown` and zero counts.
pub fn parse_status(porcelain: &str) -> GitStatus {
    let mut status = GitStatus {
        branch: "unknown".to_string(),
        ..GitStatus::default()
    };

    for line in porcelain.lines() {
        if let Some(head) = line.strip_prefix("# branch.head ") {
            status.branch = head.trim().to_string();
        } else if let Some(ab) = line.strip_prefix("# branch.ab ") {
            let mut parts = ab.split_whitespace();
            status.ahead = parts
                .next()
                .and_then(|a| a.trim_start_matches('+').parse().ok())
                .unwrap_or(0);
            status.behind = parts
                .next()
                .and_then(|b| b.trim_start_matches('-').parse().ok())
                .unwrap_or(0);
        } else if let Some(change) = line
            .strip_prefix("1 ")
            .or_else(|| line.strip_prefix("2 "))
            .or_else(|| line.strip_prefix("? "))
        {
            status.changes.push(change.to_string());
        }
    }

    status
}

/// Thin wrapper over the `git` binary, scoped to one working tree.
#[derive(Debug, Clone)]
pub struct GitManager {
    project_root: PathBuf,
}

impl GitManager {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<String> {
        debug!(?args, "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AsiatError::git(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AsiatError::git(if stderr.is_empty() {
                format!("git {} exited with {}", args.join(" "), output.status)
            } else {
                stderr
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn status(&self) -> Result<GitStatus> {
        let porcelain = self
            .run_git(&["status", "--porcelain=v2", "--branch"])
            .await?;
        Ok(parse_status(&porcelain))
    }

    pub async fn create_branch(&self, name: &str) -> Result<String> {
        self.run_git(&["checkout", "-b", name]).await?;
        Ok(name.to_string())
    }

    pub async fn checkout(&self, branch: &str) -> Result<()> {
        self.run_git(&["checkout", branch]).await?;
        Ok(())
    }

    /// Commit all tracked changes.
    pub async fn commit(&self, message: &str) -> Result<()> {
        self.run_git(&["commit", "-am", message]).await?;
        Ok(())
    }

    pub async fn diff(&self, pathspec: Option<&str>) -> Result<String> {
        match pathspec {
            Some(pathspec) => self.run_git(&["diff", "--", pathspec]).await,
            None => self.run_git(&["diff"]).await,
        }
    }

    pub async fn unstaged_changes(&self) -> Result<String> {
        self.diff(None).await
    }

    pub async fn staged_diff(&self) -> Result<String> {
        self.run_git(&["diff", "--cached"]).await
    }

    /// Push to `remote`, defaulting to the current branch.
    pub async fn push(&self, remote: &str, branch: Option<&str>) -> Result<String> {
        let branch = match branch {
            Some(branch) => branch.to_string(),
            None => self.status().await?.branch,
        };
        self.run_git(&["push", remote, &branch]).await
    }

    /// Top of the working tree, or the configured root when git cannot say.
    pub async fn root(&self) -> PathBuf {
        match self.run_git(&["rev-parse", "--show-toplevel"]).await {
            Ok(root) if !root.is_empty() => PathBuf::from(root),
            _ => self.project_root.clone(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}
