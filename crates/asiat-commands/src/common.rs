//! Shared helpers used across tool implementations.

use asiat_core::Result;
use std::path::Path;
use std::sync::Arc;

use crate::registry::ToolRegistry;
use crate::{
    create::CreateFileTool, delete::DeleteFileTool, read::ReadFileTool, run::RunCommandTool,
    write::WriteFileTool,
};

/// Build a registry holding the five built-in tools.
pub async fn initialize_builtin_tools() -> Result<ToolRegistry> {
    let registry = ToolRegistry::new();

    registry.register(Arc::new(ReadFileTool::new())).await?;
    registry.register(Arc::new(WriteFileTool::new())).await?;
    registry.register(Arc::new(CreateFileTool::new())).await?;
    registry.register(Arc::new(DeleteFileTool::new())).await?;
    registry.register(Arc::new(RunCommandTool::new())).await?;

    Ok(registry)
}

/// Size in kilobytes with two decimals, e.g. `1.50`.
pub fn format_kb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / 1024.0)
}

/// Line count where a trailing newline still counts as a line, matching `split('\n')`.
pub fn count_lines(content: &str) -> usize {
    content.split('\n').count()
}

/// Truncate to at most `max_chars` characters.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Text is read and written as UTF-8 only; any other requested encoding is an error.
pub fn unsupported_encoding(encoding: Option<&str>) -> Option<String> {
    match encoding.map(|e| e.trim().to_ascii_lowercase()) {
        None => None,
        Some(e) if e == "utf8" || e == "utf-8" => None,
        Some(e) => Some(format!("Unsupported encoding: {} (only utf8)", e)),
    }
}

/// Path with a suffix appended to its final component, e.g. `a.txt` → `a.txt.backup-1`.
pub fn with_suffix(path: &Path, suffix: &str) -> std::path::PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    raw.into()
}
