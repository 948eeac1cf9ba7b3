//! Filter evaluation.
//!
//! The controller never interprets filter text itself; it hands the
//! expression and a candidate's metadata to a [`Predicate`].
//! [`BasicPredicate`] is the small evaluator used by the in-memory registry
//! and the CLI:
//!
//! ```text
//! clause  := field "contains" literal
//!          | field ".contains(" literal ")"
//!          | field "==" literal
//!          | field "!=" literal
//! filter  := clause ("&&" clause)*
//! field   := "name" | "mime_type" | "labels." key
//! literal := '...' | "..."
//! ```

use curator_protocol::ResolvedResource;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid filter '{expression}': {reason}")]
pub struct PredicateError {
    pub expression: String,
    pub reason: String,
}

impl PredicateError {
    fn new(expression: &str, reason: impl Into<String>) -> Self {
        Self {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

pub trait Predicate: Send + Sync {
    /// Evaluate `expression` against one resource. An empty expression passes.
    fn evaluate(&self, expression: &str, resource: &ResolvedResource) -> Result<bool, PredicateError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPredicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Contains,
    Eq,
    Ne,
}

impl Predicate for BasicPredicate {
    fn evaluate(&self, expression: &str, resource: &ResolvedResource) -> Result<bool, PredicateError> {
        if expression.trim().is_empty() {
            return Ok(true);
        }
        let clauses = split_clauses(expression)
            .and_then(|clauses| clauses.into_iter().map(parse_clause).collect::<Result<Vec<_>, _>>())
            .map_err(|reason| PredicateError::new(expression, reason))?;
        for (field, op, literal) in clauses {
            let value = field_value(field, resource)
                .ok_or_else(|| PredicateError::new(expression, format!("unknown field '{}'", field)))?;
            let pass = match op {
                Op::Contains => value.contains(literal),
                Op::Eq => value == literal,
                Op::Ne => value != literal,
            };
            if !pass {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Split on `&&` outside quoted literals.
fn split_clauses(expression: &str) -> Result<Vec<&str>, String> {
    let bytes = expression.as_bytes();
    let mut clauses = Vec::new();
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match (quote, bytes[i]) {
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b @ (b'\'' | b'"')) => quote = Some(b),
            (None, b'&') if bytes.get(i + 1) == Some(&b'&') => {
                clauses.push(expression[start..i].trim());
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    if quote.is_some() {
        return Err("unterminated string literal".to_string());
    }
    clauses.push(expression[start..].trim());
    Ok(clauses)
}

fn is_field_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')
}

fn parse_clause(clause: &str) -> Result<(&str, Op, &str), String> {
    if clause.is_empty() {
        return Err("empty clause".to_string());
    }

    let field_end = clause.find(|c: char| !is_field_char(c)).unwrap_or(clause.len());
    let (field, rest) = clause.split_at(field_end);
    let rest = rest.trim_start();

    if let (Some(field), Some(args)) = (field.strip_suffix(".contains"), rest.strip_prefix('(')) {
        let (literal, tail) = take_literal(args.trim_start())?;
        if tail.trim() != ")" {
            return Err(format!("unterminated call in '{}'", clause));
        }
        return Ok((field, Op::Contains, literal));
    }

    let (op, rest) = if let Some(rest) = rest.strip_prefix("==") {
        (Op::Eq, rest)
    } else if let Some(rest) = rest.strip_prefix("!=") {
        (Op::Ne, rest)
    } else if let Some(rest) = rest.strip_prefix("contains") {
        (Op::Contains, rest)
    } else {
        return Err(format!("unsupported clause '{}'", clause));
    };

    let (literal, tail) = take_literal(rest.trim_start())?;
    if !tail.trim().is_empty() {
        return Err(format!("unexpected text after literal in '{}'", clause));
    }
    Ok((field, op, literal))
}

/// Leading quoted literal and whatever follows its closing quote.
fn take_literal(text: &str) -> Result<(&str, &str), String> {
    let quote = text
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| format!("expected a quoted literal, got '{}'", text))?;
    let body = &text[1..];
    let end = body
        .find(quote)
        .ok_or_else(|| format!("unterminated literal {}", text))?;
    Ok((&body[..end], &body[end + 1..]))
}

fn field_value(field: &str, resource: &ResolvedResource) -> Option<String> {
    match field {
        "name" => Some(resource.address.to_string()),
        "mime_type" => Some(resource.mime_type.clone()),
        _ => field
            .strip_prefix("labels.")
            .filter(|key| !key.is_empty())
            .map(|key| resource.labels.get(key).cloned().unwrap_or_default()),
    }
}
