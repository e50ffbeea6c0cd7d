use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

/// Files whose deletion needs `confirmDangerous`.
pub const CRITICAL_DELETE_FILES: &[&str] = &[
    ".env",
    ".git",
    "package.json",
    "tsconfig.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "package-lock.json",
    "Cargo.toml",
    "Cargo.lock",
];

/// Files that produce a warning when overwritten.
pub const CRITICAL_WRITE_FILES: &[&str] = &[
    "package.json",
    ".env",
    "tsconfig.json",
    ".gitignore",
    "Cargo.toml",
    "Cargo.lock",
];

const DANGEROUS_COMMAND_PATTERNS: &[&str] = &[
    r"rm\s+-rf",
    r"sudo",
    r"chmod",
    r"chown",
    r"kill",
    r"shutdown",
    r"reboot",
    r"format",
    r"dd\s+if=",
    r">.*/dev/",
];

fn dangerous_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DANGEROUS_COMMAND_PATTERNS
            .iter()
            .filter_map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .ok()
                    .map(|re| (re, *pattern))
            })
            .collect()
    })
}

/// Every dangerous pattern the full command line matches, in table order.
pub fn detect_dangerous_command(command: &str) -> Vec<&'static str> {
    dangerous_patterns()
        .iter()
        .filter(|(re, _)| re.is_match(command))
        .map(|(_, pattern)| *pattern)
        .collect()
}

/// A file name is critical when it equals or ends with a listed name.
pub fn is_critical_file(file_name: &str, list: &[&str]) -> bool {
    list.iter()
        .any(|critical| file_name == *critical || file_name.ends_with(critical))
}
