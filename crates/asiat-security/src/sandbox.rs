use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Resolves tool paths against the project root and checks containment.
///
/// Resolution is purely lexical: `.` and `..` components are folded without
/// touching the filesystem, so paths that do not exist yet can be checked.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    workspace_path: PathBuf,
}

impl SandboxPolicy {
    pub fn new(workspace_path: impl Into<PathBuf>) -> Self {
        let workspace_path = workspace_path.into();
        let absolute = if workspace_path.is_absolute() {
            workspace_path
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&workspace_path))
                .unwrap_or(workspace_path)
        };
        Self {
            workspace_path: normalize(&absolute),
        }
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    /// Join a relative path onto the workspace; absolute paths are kept.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.workspace_path.join(path))
        }
    }

    /// True when the resolved path stays inside the workspace.
    pub fn is_path_safe(&self, path: impl AsRef<Path>) -> bool {
        let resolved = self.resolve(path);
        let inside = resolved.starts_with(&self.workspace_path);
        if !inside {
            debug!(path = %resolved.display(), "Path escapes the workspace");
        }
        inside
    }

    /// Path relative to the workspace for display, or the full path when outside it.
    pub fn relative(&self, path: impl AsRef<Path>) -> String {
        let resolved = self.resolve(path);
        match resolved.strip_prefix(&self.workspace_path) {
            Ok(rel) => rel.display().to_string(),
            Err(_) => resolved.display().to_string(),
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                // Popping past the root leaves the root in place, like `path.resolve`.
                if !resolved.pop() && !resolved.has_root() {
                    resolved.push(component);
                }
            }
            Component::CurDir => {}
            other => resolved.push(other),
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let policy = SandboxPolicy::new("/work/project");
        assert_eq!(
            policy.resolve("src/main.rs"),
            PathBuf::from("/work/project/src/main.rs")
        );
        assert_eq!(policy.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(
            policy.resolve("./src/../README.md"),
            PathBuf::from("/work/project/README.md")
        );
    }

    #[test]
    fn test_path_traversal_is_outside() {
        let policy = SandboxPolicy::new("/work/project");

        for path in [
            "../../../etc/passwd",
            "subdir/../../etc/passwd",
            "./../sibling/file.txt",
            "/etc/passwd",
        ] {
            assert!(!policy.is_path_safe(path), "expected unsafe: {}", path);
        }

        assert!(policy.is_path_safe("notes/todo.md"));
        assert!(policy.is_path_safe("/work/project/Cargo.toml"));
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_outside() {
        let policy = SandboxPolicy::new("/work/project");
        assert!(!policy.is_path_safe("/work/project-other/file.txt"));
    }

    #[test]
    fn test_relative_display() {
        let temp = tempfile::tempdir().unwrap();
        let policy = SandboxPolicy::new(temp.path());
        assert_eq!(policy.relative("a/b.txt"), "a/b.txt");
        assert_eq!(policy.relative("/outside/x"), "/outside/x");
    }
}
