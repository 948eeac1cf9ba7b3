//! Operator-facing errors for CLI commands
//!
//! Each error states what failed, the underlying cause, and what to try next.

use std::fmt;
use std::path::Path;

#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub cause: Option<String>,
    pub hints: Vec<String>,
}

impl HelpfulError {
    fn build(message: String, cause: Option<String>, hints: &[&str]) -> Self {
        Self {
            message,
            cause,
            hints: hints.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// Manifest could not be read, parsed, or validated
    pub fn manifest_unavailable(source: &str, err: &anyhow::Error) -> Self {
        Self::build(
            format!("Cannot use manifest: {}", source),
            Some(format!("{:#}", err)),
            &[
                "Pass a manifest file path or a manifest artifact address",
                "Targets must name one resource, e.g. apis/-/versions/-/specs/-/artifacts/lint",
                "$sourceN and $N placeholders count from 0",
            ],
        )
    }

    pub fn not_a_directory(path: &Path) -> Self {
        let mut err = Self::build(
            format!("Not a directory: {}", path.display()),
            Some("upload protos expects directories containing versioned .proto trees".to_string()),
            &["Point at the root that contains <api path>/<version>/*.proto"],
        );
        err.hints
            .insert(0, format!("Check that the path exists: ls -la {}", path.display()));
        err
    }

    pub fn invalid_label(arg: &str, reason: &str) -> Self {
        Self::build(
            format!("Invalid label argument: '{}'", arg),
            Some(reason.to_string()),
            &[
                "Set a label with key=value",
                "Remove a label with key-",
                "Add --overwrite to change an existing value",
            ],
        )
    }

    /// Registry snapshot could not be opened
    pub fn registry_unavailable(path: &Path, err: &anyhow::Error) -> Self {
        Self::build(
            format!("Cannot open registry snapshot: {}", path.display()),
            Some(format!("{:#}", err)),
            &[
                "Check that the file is valid JSON written by curator",
                "Use --registry to point at a different snapshot",
            ],
        )
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;
        if let Some(cause) = &self.cause {
            writeln!(f, "CONTEXT: {}", cause)?;
        }
        if !self.hints.is_empty() {
            writeln!(f)?;
        }
        for hint in &self.hints {
            writeln!(f, "  TRY: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_manifest_error_display() {
        let cause = anyhow::anyhow!("rule 0: unknown placeholder $source3");
        let display = HelpfulError::manifest_unavailable("lint.yaml", &cause).to_string();
        assert!(display.starts_with("ERROR: Cannot use manifest: lint.yaml\n"));
        assert!(display.contains("CONTEXT: rule 0: unknown placeholder $source3"));
        assert!(display.contains("  TRY: "));
    }

    #[test]
    fn test_not_a_directory_hints_listing_first() {
        let err = HelpfulError::not_a_directory(&PathBuf::from("/nonexistent/protos"));
        assert_eq!(err.hints[0], "Check that the path exists: ls -la /nonexistent/protos");
        assert_eq!(err.hints.len(), 2);
    }

    #[test]
    fn test_invalid_label() {
        let display = format!("{}", HelpfulError::invalid_label("a", "expected key=value or key-"));
        assert!(display.contains("'a'"));
        assert!(display.contains("key-"));
    }
}
