//! Structural checks on a parsed document.
//!
//! Everything reported here is informational: the rewriter handles all of
//! these shapes, but they usually mean the renderer produced something odd.

use crate::error::{Diagnostic, Severity};
use crate::types::{Block, CellDoc};

/// Validate a parsed `CellDoc` and return any diagnostics.
pub fn validate(doc: &CellDoc) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for block in &doc.blocks {
        validate_block(block, &mut diagnostics);
    }
    diagnostics
}

fn validate_block(block: &Block, diagnostics: &mut Vec<Diagnostic>) {
    match block {
        Block::Cell { children, span, .. } => {
            let empty = children.iter().all(|child| match child {
                Block::Plain { lines, .. } => lines.iter().all(|l| l.trim().is_empty()),
                _ => false,
            });
            if empty {
                diagnostics.push(Diagnostic {
                    severity: Severity::Info,
                    message: "Cell contains no code or output".into(),
                    span: Some(*span),
                    code: Some("V001".into()),
                });
            }
            for child in children {
                validate_block(child, diagnostics);
            }
        }
        Block::Output {
            output,
            content,
            span,
            ..
        } => {
            if content.is_blank() {
                diagnostics.push(Diagnostic {
                    severity: Severity::Info,
                    message: format!("Empty {output:?} output block").to_lowercase(),
                    span: Some(*span),
                    code: Some("V002".into()),
                });
            }
        }
        Block::Div { children, .. } => {
            for child in children {
                validate_block(child, diagnostics);
            }
        }
        Block::Plain { .. } | Block::CodeCell { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn codes(input: &str) -> Vec<String> {
        let doc = parse(input).unwrap().doc;
        validate(&doc).into_iter().filter_map(|d| d.code).collect()
    }

    #[test]
    fn well_formed_cell_is_clean() {
        let input = ":::: {.cell}\n``` {.python .cell-code}\n1\n```\n::: {.cell-output-stdout}\n1\n:::\n::::\n";
        assert!(codes(input).is_empty());
    }

    #[test]
    fn empty_cell_reported() {
        assert_eq!(codes(":::: {.cell}\n\n::::\n"), vec!["V001"]);
    }

    #[test]
    fn empty_output_reported_inside_div() {
        let input = "::::: {.panel}\n:::: {.cell}\n::: {.cell-output-stderr}\n\n:::\n::::\n:::::\n";
        assert_eq!(codes(input), vec!["V002"]);
    }

    #[test]
    fn empty_output_message_names_kind() {
        let doc = parse("::: {.cell-output-stderr}\n:::\n").unwrap().doc;
        let diagnostics = validate(&doc);
        assert_eq!(diagnostics[0].message, "empty stderr output block");
    }
}
