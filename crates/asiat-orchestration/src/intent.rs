//! Keyword and regex intent classification.
//!
//! Rules are tried in table order and the first rule with any matching
//! pattern wins. Overlapping keywords resolve by position in the table, so
//! reordering rows changes behavior.

use asiat_core::{AsiatError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentKind {
    Explain,
    Refactor,
    Run,
    Git,
    CreateFile,
    ModifyFile,
    DeleteFile,
    ReadFile,
    RunCommand,
    ApplyPatch,
    DiscardPatch,
    Unknown,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Explain => "explain",
            IntentKind::Refactor => "refactor",
            IntentKind::Run => "run",
            IntentKind::Git => "git",
            IntentKind::CreateFile => "create-file",
            IntentKind::ModifyFile => "modify-file",
            IntentKind::DeleteFile => "delete-file",
            IntentKind::ReadFile => "read-file",
            IntentKind::RunCommand => "run-command",
            IntentKind::ApplyPatch => "apply-patch",
            IntentKind::DiscardPatch => "discard-patch",
            IntentKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub kind: IntentKind,
    /// `None` when the intent matched but no argument pattern did
    pub arguments: Option<BTreeMap<String, String>>,
}

impl ParsedIntent {
    fn bare(kind: IntentKind) -> Self {
        Self {
            kind,
            arguments: None,
        }
    }

    fn with_args(kind: IntentKind, pairs: &[(&str, &str)]) -> Self {
        Self {
            kind,
            arguments: Some(
                pairs
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
            ),
        }
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.arguments
            .as_ref()
            .and_then(|args| args.get(key))
            .map(String::as_str)
    }
}

struct IntentRule {
    kind: IntentKind,
    patterns: Vec<Regex>,
}

/// Argument sub-patterns, compiled once alongside the rule table
struct Extractors {
    run_scripts: Vec<(Regex, &'static str)>,
    run_command: Regex,
    shell_command: Vec<Regex>,
    create_branch: Regex,
    commit_message: Regex,
    show_unstaged: Regex,
    generate_commit_message: Regex,
    create_path: Regex,
    create_content: Regex,
    read_path: Regex,
    modify_path: Regex,
    delete_path: Regex,
    explain_path: Regex,
    explain_symbol: Regex,
    refactor_path: Regex,
    creation_request: Regex,
}

fn ci(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| AsiatError::Config {
            message: format!("Invalid intent pattern {}: {}", pattern, e),
        })
}

fn rule(kind: IntentKind, patterns: &[&str]) -> Result<IntentRule> {
    Ok(IntentRule {
        kind,
        patterns: patterns.iter().map(|p| ci(p)).collect::<Result<_>>()?,
    })
}

fn capture<'a>(regex: &Regex, text: &'a str) -> Option<&'a str> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

pub struct IntentParser {
    rules: Vec<IntentRule>,
    extract: Extractors,
}

impl IntentParser {
    pub fn new() -> Result<Self> {
        let rules = vec![
            rule(IntentKind::Explain, &["explain", "what does", "describe"])?,
            rule(IntentKind::Refactor, &["refactor", "improve", "optimi[sz]e"])?,
            rule(IntentKind::RunCommand, &[r"^\$\s*\S", r"\bshell command\b"])?,
            rule(
                IntentKind::Run,
                &[r"(run|execute)\b", "test", "build", "lint", "dev", "migration"],
            )?,
            rule(IntentKind::Git, &["git", "commit", "branch", "push", "unstaged"])?,
            rule(IntentKind::CreateFile, &["create file", "new file", "write file"])?,
            rule(IntentKind::ReadFile, &[r"\b(read|show|open|view|cat) file\b"])?,
            rule(
                IntentKind::ModifyFile,
                &[r"\b(modify|edit|update|change) file\b"],
            )?,
            rule(IntentKind::DeleteFile, &[r"\b(delete|remove) file\b"])?,
            rule(IntentKind::ApplyPatch, &["apply patch", "accept patch"])?,
            rule(IntentKind::DiscardPatch, &["discard patch", "reject patch"])?,
        ];

        let extract = Extractors {
            run_scripts: vec![
                (ci(r"\bbuild\b")?, "build"),
                (ci(r"\bdev\b")?, "dev"),
                (ci(r"\btest\b")?, "test"),
                (ci(r"\blint\b")?, "lint"),
                (ci("migration")?, "migrate"),
            ],
            run_command: ci(r"(?:run|execute)\s+(.+)")?,
            shell_command: vec![ci(r"^\$\s*(.+)")?, ci(r"shell command:?\s+(.+)")?],
            create_branch: ci(r"create branch\s+([\w./-]+)")?,
            commit_message: ci(r"commit(?: with)? message:?\s+(.+)")?,
            show_unstaged: ci("show unstaged changes")?,
            generate_commit_message: ci("write commit message from diff")?,
            create_path: ci(r"(?:create|new|write) file\s+([\w./-]+)")?,
            create_content: ci(r"(?s)with content:?\s+(.+)$")?,
            read_path: ci(r"\b(?:read|show|open|view|cat) file\s+([\w./-]+)")?,
            modify_path: ci(
                r"(?s)\b(?:modify|edit|update|change) file\s+([\w./-]+)(?:\s+(?:to|with|so that)\s+(.+))?",
            )?,
            delete_path: ci(r"\b(?:delete|remove) file\s+([\w./-]+)")?,
            explain_path: ci(r"file\s+([\w./-]+\.\w+)")?,
            explain_symbol: ci(r"(?:function|class|symbol)\s+(\w+)")?,
            refactor_path: ci(r"refactor(?: the)?\s+file\s+([\w./-]+\.\w+)")?,
            creation_request: ci(r"\b(?:make|write|generate|add)\b.*\bfile\s+([\w./-]+\.\w+)")?,
        };

        Ok(Self { rules, extract })
    }

    pub fn parse(&self, input: &str) -> ParsedIntent {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return ParsedIntent::bare(IntentKind::Unknown);
        }

        let Some(kind) = self
            .rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|p| p.is_match(trimmed)))
            .map(|rule| rule.kind)
        else {
            return ParsedIntent::bare(IntentKind::Unknown);
        };

        self.extract_arguments(kind, trimmed)
            .unwrap_or_else(|| ParsedIntent::bare(kind))
    }

    /// Path named by a loosely phrased file-creation request such as
    /// "write a small config file app.json", if the text reads like one.
    pub fn creation_target<'a>(&self, input: &'a str) -> Option<&'a str> {
        capture(&self.extract.creation_request, input.trim())
    }

    fn extract_arguments(&self, kind: IntentKind, text: &str) -> Option<ParsedIntent> {
        let x = &self.extract;
        match kind {
            IntentKind::Run => {
                if let Some((_, script)) = x.run_scripts.iter().find(|(re, _)| re.is_match(text)) {
                    return Some(ParsedIntent::with_args(kind, &[("script", script)]));
                }
                capture(&x.run_command, text)
                    .map(|command| ParsedIntent::with_args(kind, &[("command", command)]))
            }
            IntentKind::RunCommand => x
                .shell_command
                .iter()
                .find_map(|re| capture(re, text))
                .map(|command| ParsedIntent::with_args(kind, &[("command", command)])),
            IntentKind::Git => {
                if let Some(name) = capture(&x.create_branch, text) {
                    return Some(ParsedIntent::with_args(
                        kind,
                        &[("action", "create-branch"), ("name", name)],
                    ));
                }
                // Checked before the commit pattern, which would otherwise swallow it.
                if x.generate_commit_message.is_match(text) {
                    return Some(ParsedIntent::with_args(
                        kind,
                        &[("action", "generate-commit-message")],
                    ));
                }
                if let Some(message) = capture(&x.commit_message, text) {
                    return Some(ParsedIntent::with_args(
                        kind,
                        &[("action", "commit"), ("message", message)],
                    ));
                }
                if x.show_unstaged.is_match(text) {
                    return Some(ParsedIntent::with_args(kind, &[("action", "show-unstaged")]));
                }
                None
            }
            IntentKind::CreateFile => {
                let path = capture(&x.create_path, text)?;
                match capture(&x.create_content, text) {
                    Some(content) => Some(ParsedIntent::with_args(
                        kind,
                        &[("path", path), ("content", content)],
                    )),
                    None => Some(ParsedIntent::with_args(kind, &[("path", path)])),
                }
            }
            IntentKind::ReadFile => capture(&x.read_path, text)
                .map(|path| ParsedIntent::with_args(kind, &[("path", path)])),
            IntentKind::DeleteFile => capture(&x.delete_path, text)
                .map(|path| ParsedIntent::with_args(kind, &[("path", path)])),
            IntentKind::ModifyFile => {
                let caps = x.modify_path.captures(text)?;
                let path = caps.get(1)?.as_str().trim();
                match caps.get(2).map(|m| m.as_str().trim()) {
                    Some(instruction) if !instruction.is_empty() => Some(ParsedIntent::with_args(
                        kind,
                        &[("path", path), ("instruction", instruction)],
                    )),
                    _ => Some(ParsedIntent::with_args(kind, &[("path", path)])),
                }
            }
            IntentKind::Explain => {
                let path = capture(&x.explain_path, text);
                let symbol = capture(&x.explain_symbol, text);
                let pairs: Vec<(&str, &str)> = [("path", path), ("symbol", symbol)]
                    .into_iter()
                    .filter_map(|(key, value)| value.map(|value| (key, value)))
                    .collect();
                (!pairs.is_empty()).then(|| ParsedIntent::with_args(kind, &pairs))
            }
            IntentKind::Refactor => capture(&x.refactor_path, text)
                .map(|path| ParsedIntent::with_args(kind, &[("path", path)])),
            IntentKind::ApplyPatch | IntentKind::DiscardPatch | IntentKind::Unknown => None,
        }
    }
}
