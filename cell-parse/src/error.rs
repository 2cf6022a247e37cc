use serde::{Deserialize, Serialize};

use crate::types::Span;

/// Errors that can occur during parsing.
///
/// `InvalidAttrs` never escapes the parser: a fence line whose attribute block
/// fails to parse is kept as plain text and reported as a diagnostic.
/// `Invariant` means the parser itself is broken, not the input.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid attribute syntax: {message}")]
    InvalidAttrs { message: String, offset: usize },

    #[error("Internal parser invariant violated at line {line}: {message}")]
    Invariant { line: usize, message: String },
}

/// A diagnostic message produced during parsing.
///
/// Diagnostics are non-fatal: the parser continues and produces a best-effort
/// result even when diagnostics are emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}
