//! Action templates and runners.
//!
//! Placeholders in a rule's action:
//!
//! | placeholder           | replaced with                                   |
//! |-----------------------|-------------------------------------------------|
//! | `$sourceN`            | addresses of dependency N's candidates, space-joined |
//! | `$resource`           | the target address                              |
//! | `$resource.<relation>`| the target's ancestor of that kind              |
//! | `$N`                  | wildcard capture N of the target pattern        |
//!
//! Indices are zero-based. Rendering is pure substitution; execution belongs
//! to an [`ActionRunner`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use curator_protocol::{Address, Captures, ResourceKind};
use curator_worker::CancellationToken;
use serde::Serialize;
use std::fmt;
use std::process::Stdio;
use std::sync::Mutex;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::resolver::Resolution;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("action refers to $source{0} which has no candidates")]
    MissingSource(usize),

    #[error("action refers to ${0} which was not captured")]
    MissingCapture(usize),

    #[error("{target} has no {relation}")]
    MissingRelation { relation: ResourceKind, target: Address },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Source(usize),
    Capture(usize),
    Resource,
    Relation(ResourceKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTemplate {
    text: String,
    tokens: Vec<Token>,
}

fn leading_digits(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    &s[..end]
}

fn leading_word(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_lowercase()).unwrap_or(s.len());
    &s[..end]
}

impl ActionTemplate {
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("action is empty".to_string());
        }

        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(pos) = rest.find('$') {
            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            let (token, consumed) = if let Some(tail) = after.strip_prefix("source") {
                let digits = leading_digits(tail);
                if digits.is_empty() {
                    return Err(format!("'$source' needs an index in action '{}'", text));
                }
                let n = digits.parse().map_err(|_| format!("index too large in action '{}'", text))?;
                (Token::Source(n), "source".len() + digits.len())
            } else if let Some(tail) = after.strip_prefix("resource") {
                match tail.strip_prefix('.').map(leading_word) {
                    Some(word) if !word.is_empty() => {
                        let kind = ResourceKind::from_relation(word).ok_or_else(|| {
                            format!("unknown relation '$resource.{}' in action '{}'", word, text)
                        })?;
                        (Token::Relation(kind), "resource.".len() + word.len())
                    }
                    _ => (Token::Resource, "resource".len()),
                }
            } else {
                let digits = leading_digits(after);
                if digits.is_empty() {
                    return Err(format!("unknown placeholder in action '{}'", text));
                }
                let n = digits.parse().map_err(|_| format!("index too large in action '{}'", text))?;
                (Token::Capture(n), digits.len())
            };

            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(token);
            rest = &after[consumed..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            text: text.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn source_refs(&self) -> impl Iterator<Item = usize> + '_ {
        self.tokens.iter().filter_map(|t| match t {
            Token::Source(n) => Some(*n),
            _ => None,
        })
    }

    pub fn capture_refs(&self) -> impl Iterator<Item = usize> + '_ {
        self.tokens.iter().filter_map(|t| match t {
            Token::Capture(n) => Some(*n),
            _ => None,
        })
    }

    pub fn relation_refs(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.tokens.iter().filter_map(|t| match t {
            Token::Relation(kind) => Some(*kind),
            _ => None,
        })
    }

    pub fn render(
        &self,
        target: &Address,
        captures: &Captures,
        resolution: &Resolution,
    ) -> Result<String, ActionError> {
        let mut out = String::with_capacity(self.text.len());
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Source(n) => {
                    let candidates = resolution
                        .dependency(*n)
                        .filter(|c| !c.is_empty())
                        .ok_or(ActionError::MissingSource(*n))?;
                    let joined: Vec<String> = candidates.iter().map(|c| c.address.to_string()).collect();
                    out.push_str(&joined.join(" "));
                }
                Token::Capture(n) => {
                    out.push_str(captures.get(*n).ok_or(ActionError::MissingCapture(*n))?);
                }
                Token::Resource => out.push_str(&target.to_string()),
                Token::Relation(kind) => {
                    let ancestor = target.ancestor(*kind).ok_or_else(|| ActionError::MissingRelation {
                        relation: *kind,
                        target: target.clone(),
                    })?;
                    out.push_str(&ancestor.to_string());
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for ActionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A rendered action ready to hand to a runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedAction {
    pub rule: usize,
    pub target: Address,
    pub command: String,
}

impl fmt::Display for RenderedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[rule {}] {} <- {}", self.rule, self.target, self.command)
    }
}

#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(&self, action: &RenderedAction, cancel: &CancellationToken) -> Result<()>;
}

/// Logs actions instead of executing them, keeping a record for inspection.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    executed: Mutex<Vec<RenderedAction>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> Vec<RenderedAction> {
        match self.executed.lock() {
            Ok(executed) => executed.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ActionRunner for DryRunRunner {
    async fn run(&self, action: &RenderedAction, _cancel: &CancellationToken) -> Result<()> {
        info!(rule = action.rule, target = %action.target, "Would run: {}", action.command);
        match self.executed.lock() {
            Ok(mut executed) => executed.push(action.clone()),
            Err(poisoned) => poisoned.into_inner().push(action.clone()),
        }
        Ok(())
    }
}

/// Runs `<program> <words of the action>` as a subprocess.
///
/// A child that has started is never interrupted: cancellation stops the pool
/// from dispatching further actions, and a running action finishes so its
/// result can still be recorded.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
}

/// Bytes of stderr kept in a failure message.
const STDERR_TAIL: usize = 2048;

impl CommandRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ActionRunner for CommandRunner {
    async fn run(&self, action: &RenderedAction, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            bail!("cancelled before running '{}'", action.command);
        }
        debug!(program = %self.program, command = %action.command, "Spawning action");
        let child = Command::new(&self.program)
            .args(action.command.split_whitespace())
            .env("CURATOR_TARGET", action.target.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.program))?;

        let output = child.wait_with_output().await.context("Failed to wait for action")?;
        if cancel.is_cancelled() {
            debug!(target = %action.target, "Action finished after cancellation");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let tail = stderr.get(start..).unwrap_or(&stderr).trim();
            bail!("'{} {}' exited with {}: {}", self.program, action.command, output.status, tail);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use curator_protocol::{Labels, ResolvedResource};

    fn resolved(address: &str) -> ResolvedResource {
        ResolvedResource {
            address: Address::parse(address).unwrap(),
            mime_type: String::new(),
            labels: Labels::new(),
            revision: Utc::now(),
        }
    }

    fn captures(values: &[&str]) -> Captures {
        Captures::from(values.iter().map(|v| v.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_render_lint_action() {
        let template = ActionTemplate::parse("compute lint $source0 --linter x").unwrap();
        let target = Address::parse("projects/p/apis/a/versions/v/specs/s/artifacts/lint-x").unwrap();
        let resolution = Resolution::new(vec![vec![resolved("projects/p/apis/a/versions/v/specs/s")]]);

        let rendered = template
            .render(&target, &captures(&["p", "a", "v", "s"]), &resolution)
            .unwrap();
        assert_eq!(rendered, "compute lint projects/p/apis/a/versions/v/specs/s --linter x");
    }

    #[test]
    fn test_render_all_placeholder_kinds() {
        let template =
            ActionTemplate::parse("vocab $source0 -o $resource --api=$resource.api --id=$1$0").unwrap();
        let target = Address::parse("projects/p/apis/a/versions/v/artifacts/vocab").unwrap();
        let resolution = Resolution::new(vec![vec![
            resolved("projects/p/apis/a/versions/v/specs/one"),
            resolved("projects/p/apis/a/versions/v/specs/two"),
        ]]);

        let rendered = template
            .render(&target, &captures(&["a", "v"]), &resolution)
            .unwrap();
        assert_eq!(
            rendered,
            "vocab projects/p/apis/a/versions/v/specs/one projects/p/apis/a/versions/v/specs/two \
             -o projects/p/apis/a/versions/v/artifacts/vocab --api=projects/p/apis/a --id=va"
        );
    }

    #[test]
    fn test_placeholder_references() {
        let template = ActionTemplate::parse("x $source2 $0 $resource.spec $source0").unwrap();
        assert_eq!(template.source_refs().collect::<Vec<_>>(), [2, 0]);
        assert_eq!(template.capture_refs().collect::<Vec<_>>(), [0]);
        assert_eq!(template.relation_refs().collect::<Vec<_>>(), [ResourceKind::Spec]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(ActionTemplate::parse("").is_err());
        assert!(ActionTemplate::parse("run $source").is_err());
        assert!(ActionTemplate::parse("run $resource.organization").is_err());
        assert!(ActionTemplate::parse("cost is $dollars").is_err());
    }

    #[test]
    fn test_render_reports_missing_pieces() {
        let template = ActionTemplate::parse("x $source1").unwrap();
        let target = Address::parse("projects/p/artifacts/a").unwrap();
        let err = template
            .render(&target, &Captures::default(), &Resolution::default())
            .unwrap_err();
        assert_eq!(err, ActionError::MissingSource(1));

        let template = ActionTemplate::parse("x $resource.spec").unwrap();
        assert!(matches!(
            template.render(&target, &Captures::default(), &Resolution::default()),
            Err(ActionError::MissingRelation { relation: ResourceKind::Spec, .. })
        ));
    }

    #[tokio::test]
    async fn test_dry_run_records_actions() {
        let runner = DryRunRunner::new();
        let action = RenderedAction {
            rule: 0,
            target: Address::parse("projects/p/artifacts/a").unwrap(),
            command: "compute a".to_string(),
        };
        runner.run(&action, &CancellationToken::new()).await.unwrap();
        assert_eq!(runner.executed(), vec![action]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runner_reports_exit_status() {
        let target = Address::parse("projects/p/artifacts/a").unwrap();
        let ok = RenderedAction {
            rule: 0,
            target: target.clone(),
            command: "-c true".to_string(),
        };
        CommandRunner::new("sh")
            .run(&ok, &CancellationToken::new())
            .await
            .unwrap();

        let failing = RenderedAction {
            rule: 0,
            target,
            command: "-c false".to_string(),
        };
        let err = CommandRunner::new("sh")
            .run(&failing, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runner_finishes_started_child_on_cancel() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("done");
        let script = dir.path().join("slow.sh");
        std::fs::write(&script, format!("sleep 0.2\ntouch '{}'\n", marker.display())).unwrap();
        let action = RenderedAction {
            rule: 0,
            target: Address::parse("projects/p/artifacts/a").unwrap(),
            command: script.display().to_string(),
        };
        let cancel = CancellationToken::new();
        let run = {
            let cancel = cancel.clone();
            tokio::spawn(async move { CommandRunner::new("sh").run(&action, &cancel).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        run.await.unwrap().unwrap();
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_command_runner_refuses_after_cancel() {
        let action = RenderedAction {
            rule: 0,
            target: Address::parse("projects/p/artifacts/a").unwrap(),
            command: "-c true".to_string(),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = CommandRunner::new("sh").run(&action, &cancel).await.unwrap_err();
        assert!(err.to_string().contains("cancelled before running"));
    }
}
