//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep the painter crates honest:
//! - No blocking sleeps or blocking network I/O on the async runtime
//! - Errors are propagated, never unwrapped, in production code
//! - Library code logs through `tracing`, never stdout
//!
//! The helpers here walk `painter/*/src` and hand each production line to a
//! rule. Anything after a `#[cfg(test)]` marker, and the test-only
//! `testing.rs` module, is skipped.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["painter/core/src", "painter/daemon/src"];

/// A single offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Trimmed source text
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Code portion of a line, with `//` comments stripped
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Production lines of one file: everything before the first `#[cfg(test)]`
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(|(idx, line)| (idx + 1, line))
        .collect()
}

/// Run `rule` over every production line under `dirs`
///
/// Panics if a directory is missing so a moved crate can't silently pass.
pub fn scan<F>(dirs: &[&str], rule: F) -> Vec<Violation>
where
    F: Fn(&Path, &str) -> bool,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in dirs {
        let path = root.join(dir);
        assert!(path.exists(), "missing source directory {}", path.display());

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            let file = entry.path();
            if file.extension().and_then(|s| s.to_str()) != Some("rs")
                || file.file_name().and_then(|s| s.to_str()) == Some("testing.rs")
            {
                continue;
            }
            let Ok(content) = fs::read_to_string(file) else {
                continue;
            };
            for (line, text) in production_lines(&content) {
                if rule(file, code_part(text)) {
                    violations.push(Violation {
                        path: file.strip_prefix(&root).unwrap_or(file).to_path_buf(),
                        line,
                        text: text.trim().to_string(),
                    });
                }
            }
        }
    }

    violations
}

/// Print violations and fail the calling test
pub fn report(title: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s): {title}.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let src = "fn a() {}\n#[cfg(test)]\nmod tests { fn b() { x.unwrap() } }\n";
        let lines = production_lines(src);
        assert_eq!(lines, vec![(1, "fn a() {}")]);
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // .unwrap()"), "let x = 1; ");
        assert_eq!(code_part("//! println!(\"hi\")"), "");
    }
}
