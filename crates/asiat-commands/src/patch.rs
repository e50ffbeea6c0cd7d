//! Minimal unified-diff applier.
//!
//! Hunks are applied by position only. Context and deletion lines are not
//! compared against the file, so a diff made against different content still
//! applies and silently produces whatever the positions dictate.

use asiat_core::{AsiatError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

const SECTION_SEPARATOR: &str = r"(?m)^diff --git .*$";
const HUNK_HEADER: &str = r"@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@";

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| AsiatError::patch(format!("Invalid pattern {}: {}", pattern, e)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub original_start: usize,
    pub new_start: usize,
    pub lines: Vec<String>,
}

/// One file's worth of changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub target: String,
    pub hunks: Vec<Hunk>,
}

/// Split a patch into per-file sections and parse their hunks.
pub fn parse_patch(patch: &str) -> Result<Vec<FilePatch>> {
    let separator = compile(SECTION_SEPARATOR)?;
    let hunk_header = compile(HUNK_HEADER)?;
    let sections: Vec<&str> = separator
        .split(patch)
        .map(str::trim)
        .filter(|section| !section.is_empty())
        .collect();

    if sections.is_empty() {
        return Err(AsiatError::patch("Invalid patch: no diff sections found"));
    }

    sections
        .into_iter()
        .map(|section| parse_section(section, &hunk_header))
        .collect()
}

fn parse_section(section: &str, hunk_header: &Regex) -> Result<FilePatch> {
    let lines: Vec<&str> = section.split('\n').collect();

    let target_line = lines
        .iter()
        .find(|line| line.starts_with("+++ "))
        .ok_or_else(|| AsiatError::patch("Invalid patch section: missing +++ header"))?;
    let target = target_line
        .replacen("+++ b/", "", 1)
        .replacen("+++ ", "", 1)
        .trim()
        .to_string();

    let hunk_lines = lines.into_iter().filter(|line| {
        line.starts_with("@@")
            || line.starts_with('+')
            || line.starts_with('-')
            || line.starts_with(' ')
    });

    Ok(FilePatch {
        target,
        hunks: parse_hunks(hunk_lines, hunk_header)?,
    })
}

fn parse_hunks<'a>(
    lines: impl Iterator<Item = &'a str>,
    hunk_header: &Regex,
) -> Result<Vec<Hunk>> {
    let mut hunks: Vec<Hunk> = Vec::new();

    for line in lines {
        if line.starts_with("@@") {
            let captures = hunk_header
                .captures(line)
                .ok_or_else(|| AsiatError::patch(format!("Invalid hunk header: {}", line)))?;
            let number = |idx: usize| {
                captures
                    .get(idx)
                    .and_then(|m| m.as_str().parse::<usize>().ok())
                    .unwrap_or(0)
            };
            hunks.push(Hunk {
                original_start: number(1),
                new_start: number(3),
                lines: Vec::new(),
            });
        } else if let Some(current) = hunks.last_mut() {
            current.lines.push(line.to_string());
        }
        // Anything before the first header (---, +++, index) is dropped.
    }

    Ok(hunks)
}

/// Apply hunks in order, shifting later hunks by the net line change of earlier ones.
pub fn apply_hunks(original: &[String], hunks: &[Hunk]) -> Vec<String> {
    let mut result = original.to_vec();
    let mut offset: isize = 0;

    for hunk in hunks {
        let mut index = hunk.original_start as isize - 1 + offset;

        for line in &hunk.lines {
            let Some(indicator) = line.chars().next() else {
                continue;
            };
            let value = &line[indicator.len_utf8()..];

            match indicator {
                ' ' => index += 1,
                '-' => {
                    if index >= 0 && (index as usize) < result.len() {
                        result.remove(index as usize);
                        offset -= 1;
                    }
                }
                '+' => {
                    // A `-0,0` header puts the index at -1; insert at the top rather
                    // than counting back from the end of the file.
                    let at = index.clamp(0, result.len() as isize) as usize;
                    result.insert(at, value.to_string());
                    index = at as isize + 1;
                    offset += 1;
                }
                _ => {}
            }
        }
    }

    result
}

/// Applies unified diffs to files under a project root.
#[derive(Debug, Clone)]
pub struct PatchEngine {
    project_root: PathBuf,
}

impl PatchEngine {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Relative paths join the root; absolute paths are taken as given.
    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// File content, or an empty string when the file does not exist.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let absolute = self.resolve(path);
        if !fs::try_exists(&absolute).await? {
            return Ok(String::new());
        }
        Ok(fs::read_to_string(&absolute).await?)
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let absolute = self.resolve(path);
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&absolute, content).await?;
        Ok(())
    }

    /// Apply every section of the patch and return the files written.
    #[instrument(skip(self, patch), fields(patch_len = patch.len()))]
    pub async fn apply_unified_diff(&self, patch: &str) -> Result<Vec<PathBuf>> {
        let file_patches = parse_patch(patch)?;
        let mut touched = Vec::with_capacity(file_patches.len());

        for file_patch in file_patches {
            let original: Vec<String> = self
                .read_file(&file_patch.target)
                .await?
                .split('\n')
                .map(str::to_string)
                .collect();
            let updated = apply_hunks(&original, &file_patch.hunks);

            self.write_file(&file_patch.target, &updated.join("\n"))
                .await?;
            debug!(
                target = %file_patch.target,
                hunks = file_patch.hunks.len(),
                "Applied patch section"
            );
            touched.push(self.resolve(&file_patch.target));
        }

        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn numbered(n: usize) -> String {
        (1..=n)
            .map(|i| format!("line{}", i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_two_hunks_shift_by_offset() {
        let temp_dir = TempDir::new().unwrap();
        let engine = PatchEngine::new(temp_dir.path());
        engine.write_file("ten.txt", &numbered(10)).await.unwrap();

        let patch = "diff --git a/ten.txt b/ten.txt
index 1111111..2222222 100644
--- a/ten.txt
+++ b/ten.txt
@@ -3,1 +3,0 @@
-line3
@@ -7,1 +6,2 @@
 line7
+inserted
";
        let touched = engine.apply_unified_diff(patch).await.unwrap();
        assert_eq!(touched, vec![temp_dir.path().join("ten.txt")]);

        let content = engine.read_file("ten.txt").await.unwrap();
        assert_eq!(
            content,
            "line1\nline2\nline4\nline5\nline6\nline7\ninserted\nline8\nline9\nline10"
        );
    }

    #[tokio::test]
    async fn test_new_file_and_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let engine = PatchEngine::new(temp_dir.path());

        let patch = "diff --git a/src/new.rs b/src/new.rs
new file mode 100644
--- /dev/null
+++ b/src/new.rs
@@ -0,0 +1,3 @@
+fn main() {
+    println!(\"hi\");
+}
";
        engine.apply_unified_diff(patch).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("src/new.rs")).unwrap(),
            "fn main() {\n    println!(\"hi\");\n}\n"
        );
    }

    #[tokio::test]
    async fn test_multiple_sections() {
        let temp_dir = TempDir::new().unwrap();
        let engine = PatchEngine::new(temp_dir.path());
        engine.write_file("a.txt", "a1\na2").await.unwrap();
        engine.write_file("b.txt", "b1\nb2").await.unwrap();

        let patch = "diff --git a/a.txt b/a.txt
+++ b/a.txt
@@ -1,2 +1,2 @@
-a1
+A1
 a2
diff --git a/b.txt b/b.txt
+++ b/b.txt
@@ -2 +2 @@
-b2
+B2
";
        let touched = engine.apply_unified_diff(patch).await.unwrap();
        assert_eq!(touched.len(), 2);
        assert_eq!(engine.read_file("a.txt").await.unwrap(), "A1\na2");
        assert_eq!(engine.read_file("b.txt").await.unwrap(), "b1\nB2");
    }

    #[tokio::test]
    async fn test_errors() {
        let engine = PatchEngine::new("/tmp/asiat-patch-errors");

        let err = engine
            .apply_unified_diff("diff --git a/x b/x\n")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid patch: no diff sections found");

        let err = engine.apply_unified_diff("just some text").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid patch section: missing +++ header");

        let err = engine.apply_unified_diff("   \n").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid patch: no diff sections found");

        let err = engine
            .apply_unified_diff("diff --git a/x b/x\n--- a/x\n@@ -1 +1 @@\n-a\n+b")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid patch section: missing +++ header");

        let err = parse_patch("diff --git a/x b/x\n+++ b/x\n@@ bogus @@\n+b").unwrap_err();
        assert_eq!(err.to_string(), "Invalid hunk header: @@ bogus @@");
    }

    #[test]
    fn test_target_without_b_prefix() {
        let parsed = parse_patch("diff --git x y\n+++ plain/path.txt\n@@ -1 +1 @@\n+z").unwrap();
        assert_eq!(parsed[0].target, "plain/path.txt");
        assert_eq!(parsed[0].hunks[0].original_start, 1);
    }

    #[test]
    fn test_zero_start_hunk_inserts_at_top() {
        let original = vec!["existing".to_string()];
        let hunks = parse_patch("diff --git a/f b/f\n+++ b/f\n@@ -0,0 +1,2 @@\n+first\n+second")
            .unwrap()
            .remove(0)
            .hunks;

        assert_eq!(
            apply_hunks(&original, &hunks),
            vec!["first", "second", "existing"]
        );
    }

    #[test]
    fn test_reapplying_is_not_idempotent() {
        let original: Vec<String> = numbered(5).split('\n').map(str::to_string).collect();
        let hunks = parse_patch("diff --git a/f b/f\n+++ b/f\n@@ -2,1 +2,0 @@\n-line2")
            .unwrap()
            .remove(0)
            .hunks;

        let once = apply_hunks(&original, &hunks);
        let twice = apply_hunks(&once, &hunks);
        assert_eq!(once, vec!["line1", "line3", "line4", "line5"]);
        // The second pass removes line3 even though the hunk names line2.
        assert_eq!(twice, vec!["line1", "line4", "line5"]);
    }

    proptest! {
        #[test]
        fn prop_mismatched_context_applies_positionally(
            lines in prop::collection::vec("[a-z]{1,8}", 3..20),
            target in 0usize..100,
            bogus_context in "[A-Z]{1,8}",
            bogus_removed in "[A-Z]{1,8}",
        ) {
            let target = target % (lines.len() - 1);
            let hunk = Hunk {
                original_start: target + 1,
                new_start: target + 1,
                lines: vec![
                    format!(" {}", bogus_context),
                    format!("-{}", bogus_removed),
                    "+replacement".to_string(),
                ],
            };

            let result = apply_hunks(&lines, &[hunk]);

            let mut expected = lines.clone();
            expected[target + 1] = "replacement".to_string();
            prop_assert_eq!(result, expected);
        }

        #[test]
        fn prop_offset_tracks_net_line_change(
            lines in prop::collection::vec("[a-z]{1,8}", 6..30),
            removed in 1usize..3,
        ) {
            // First hunk drops `removed` lines at the top, second hunk inserts before the last line.
            let first = Hunk {
                original_start: 1,
                new_start: 1,
                lines: (0..removed).map(|i| format!("-{}", lines[i])).collect(),
            };
            let last = lines.len();
            let second = Hunk {
                original_start: last,
                new_start: last - removed,
                lines: vec!["+marker".to_string()],
            };

            let result = apply_hunks(&lines, &[first, second]);

            prop_assert_eq!(result.len(), lines.len() - removed + 1);
            prop_assert_eq!(&result[result.len() - 2], "marker");
            prop_assert_eq!(&result[result.len() - 1], &lines[last - 1]);
        }
    }
}
