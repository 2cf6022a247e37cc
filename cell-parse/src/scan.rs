//! Per-line classification.
//!
//! Everything here looks at exactly one line and never fails: anything that is
//! not confidently a fence comes back as text.

use crate::attrs::parse_attrs;
use crate::types::Attrs;

/// Minimum colon run for a fenced div.
pub const MIN_COLONS: usize = 3;

/// The one output class Quarto writes without braces (`::: cell-output-display`).
const BARE_OUTPUT_CLASS: &str = "cell-output-display";

/// Classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// `::: {.class ...}`
    Open { colons: usize, attrs: Attrs },
    /// `:::`
    Close { colons: usize },
    /// A colon run followed by text that is not an attribute block, such as a
    /// mkdocstrings `::: package.module` directive. Plain text.
    Directive { colons: usize },
    /// A colon run followed by a `{` that did not parse. Plain text.
    Malformed { colons: usize, message: String },
    /// Anything else.
    Text,
}

/// Classify one line of input.
pub fn classify(line: &str) -> LineKind {
    let trimmed = line.trim();
    let colons = trimmed.chars().take_while(|&c| c == ':').count();
    if colons < MIN_COLONS {
        return LineKind::Text;
    }

    let rest = &trimmed[colons..];
    if rest.is_empty() {
        return LineKind::Close { colons };
    }

    let rest = rest.trim_start();
    if rest.len() == trimmed.len() - colons {
        // `:::word` or `:::{...}` with no separating space: not a fence.
        return LineKind::Text;
    }

    if rest.starts_with('{') {
        return open_from_attrs(colons, rest);
    }

    if rest == BARE_OUTPUT_CLASS {
        return LineKind::Open {
            colons,
            attrs: Attrs {
                classes: vec![rest.to_string()],
                ..Attrs::default()
            },
        };
    }

    LineKind::Directive { colons }
}

/// `{...}` optionally followed by a closing colon run (`::: {.cell} :::`).
fn open_from_attrs(colons: usize, rest: &str) -> LineKind {
    let block = rest.trim_end_matches(':').trim_end();
    match parse_attrs(block) {
        Ok(attrs) => LineKind::Open { colons, attrs },
        Err(e) => LineKind::Malformed {
            colons,
            message: e.to_string(),
        },
    }
}

/// Rewrite `:::::: some.module` to `::: some.module`, keeping leading
/// indentation. Returns `None` when there is nothing to shorten.
pub fn normalize_directive(line: &str) -> Option<String> {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, body) = line.split_at(indent_len);
    let colons = body.chars().take_while(|&c| c == ':').count();
    if colons <= MIN_COLONS {
        return None;
    }
    Some(format!("{indent}:::{}", &body[colons..]))
}

// ------------------------------------------------------------------
// Code fences
// ------------------------------------------------------------------

/// An opening backtick or tilde fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFence {
    pub marker: char,
    pub len: usize,
    pub indent: usize,
    /// Info string after the marker run, trimmed.
    pub info: String,
}

impl CodeFence {
    /// Indentation plus marker run, e.g. "```".
    pub fn delimiter(&self) -> String {
        let mut out = " ".repeat(self.indent);
        out.extend(std::iter::repeat_n(self.marker, self.len));
        out
    }

    /// True if `line` closes this fence: same marker, at least as long,
    /// nothing but whitespace after.
    pub fn is_closed_by(&self, line: &str) -> bool {
        let Some((indent, after)) = split_indent(line) else {
            return false;
        };
        if indent > 3 {
            return false;
        }
        let run = after.chars().take_while(|&c| c == self.marker).count();
        run >= self.len && after[run..].trim().is_empty()
    }

    /// If the info string carries the `cell-code` marker, return the language
    /// tag (the first other token), e.g. `{.python .cell-code}` → `python`.
    pub fn cell_code_language(&self) -> Option<Option<String>> {
        let info = self.info.as_str();
        let tokens: Vec<String> = if info.starts_with('{') {
            match parse_attrs(info) {
                Ok(attrs) => attrs.classes,
                Err(_) => return None,
            }
        } else {
            info.split_whitespace()
                .map(|t| t.trim_start_matches('.').to_string())
                .collect()
        };

        if !tokens.iter().any(|t| t == "cell-code") {
            return None;
        }
        Some(tokens.into_iter().find(|t| t != "cell-code"))
    }
}

/// Recognise an opening code fence (0-3 spaces of indentation, 3+ backticks
/// or tildes). Backtick info strings may not contain backticks.
pub fn code_fence_open(line: &str) -> Option<CodeFence> {
    let (indent, after) = split_indent(line)?;
    if indent > 3 {
        return None;
    }
    let marker = after.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }
    let len = after.chars().take_while(|&c| c == marker).count();
    if len < 3 {
        return None;
    }
    let info = after[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some(CodeFence {
        marker,
        len,
        indent,
        info: info.to_string(),
    })
}

/// Leading spaces and the remainder. Tabs in the indentation disqualify the
/// line from being a fence.
fn split_indent(line: &str) -> Option<(usize, &str)> {
    let indent = line.chars().take_while(|&c| c == ' ').count();
    let after = &line[indent..];
    if after.starts_with('\t') {
        return None;
    }
    Some((indent, after))
}
