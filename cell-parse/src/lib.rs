//! `cell-parse`: rewrites Quarto cell blocks for MkDocs.
//!
//! `quarto render --to=markdown` wraps every executed cell and each of its
//! outputs in Pandoc fenced divs (`:::: {.cell}`, `::: {.cell-output-stdout}`).
//! MkDocs does not understand those, so this crate parses the divs with a
//! colon-length stack and rewrites them: the cell wrapper disappears, the
//! `cell-code` block becomes a plain fenced code block, and each output turns
//! into a collapsible Material admonition. Everything else, including
//! mkdocstrings `::: package.module` directives, passes through untouched.
//!
//! # Quick start
//!
//! ```
//! let input = ":::: {.cell}\n::: {.cell-output .cell-output-stdout}\nHello World\n:::\n::::\n";
//! let output = cell_parse::preprocess(input).unwrap();
//! assert_eq!(output, "???+ note \"output\"\n\n    Hello World\n\n");
//! ```

pub mod attrs;
pub mod error;
pub mod parse;
pub mod rewrite;
pub mod scan;
pub mod types;
pub mod validate;

pub use error::*;
pub use parse::{parse, parse_with, ParseResult};
pub use types::*;

impl CellDoc {
    /// Render this document as MkDocs-flavoured markdown.
    pub fn to_markdown(&self) -> String {
        rewrite::to_markdown(self)
    }

    /// Validate this document and return any diagnostics.
    pub fn validate(&self) -> Vec<Diagnostic> {
        validate::validate(self)
    }
}

/// Rewrite Quarto markdown with default options.
pub fn preprocess(input: &str) -> Result<String, ParseError> {
    preprocess_with(input, &PreprocessOptions::default())
}

/// Rewrite Quarto markdown.
///
/// Input anomalies never fail; see [`parse_with`].
pub fn preprocess_with(input: &str, options: &PreprocessOptions) -> Result<String, ParseError> {
    let result = parse_with(input, options)?;
    Ok(result.doc.to_markdown())
}
