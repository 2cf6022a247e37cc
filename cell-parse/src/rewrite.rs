//! Markdown rewriter.
//!
//! Turns a `CellDoc` back into markdown that MkDocs Material renders: cell
//! wrappers disappear, `cell-code` blocks become ordinary fenced code, and
//! outputs become collapsible `???+` admonitions.

use crate::types::{Block, CellDoc, Opaque};

/// Indentation of admonition bodies.
const ADMONITION_INDENT: &str = "    ";

/// Render a `CellDoc` as markdown.
///
/// Lines carry their own `\r` when the input was CRLF, so generated lines
/// follow the ending of the document's first line.
pub fn to_markdown(doc: &CellDoc) -> String {
    let cr = match doc.blocks.first().and_then(first_line) {
        Some(line) if line.ends_with('\r') => "\r",
        _ => "",
    };
    let mut lines: Vec<String> = Vec::new();

    for block in &doc.blocks {
        render_block(block, cr, &mut lines);
    }

    let mut out = lines.join("\n");
    if doc.trailing_newline {
        out.push('\n');
    }
    out
}

fn first_line(block: &Block) -> Option<&str> {
    match block {
        Block::Plain { lines, .. } => lines.first().map(String::as_str),
        Block::Cell { fence, .. } | Block::Output { fence, .. } | Block::Div { fence, .. } => {
            Some(fence.raw.as_str())
        }
        Block::CodeCell { .. } => None,
    }
}

fn render_block(block: &Block, cr: &str, out: &mut Vec<String>) {
    match block {
        Block::Plain { lines, .. } => out.extend(lines.iter().cloned()),

        Block::Cell { children, .. } => {
            for child in children {
                render_block(child, cr, out);
            }
        }

        Block::CodeCell {
            delimiter,
            language,
            body,
            close,
            ..
        } => {
            let lang = language.as_deref().unwrap_or("");
            out.push(format!("{delimiter}{lang}{cr}"));
            out.extend(body.lines().map(str::to_string));
            out.push(close.clone().unwrap_or_else(|| format!("{delimiter}{cr}")));
        }

        Block::Output {
            output, content, ..
        } => match output.admonition() {
            Some((kind, label)) => render_admonition(kind, label, content, cr, out),
            None => out.extend(content.lines().map(str::to_string)),
        },

        Block::Div {
            fence,
            children,
            close,
            ..
        } => {
            out.push(fence.raw.clone());
            for child in children {
                render_block(child, cr, out);
            }
            if let Some(close) = close {
                out.push(close.clone());
            }
        }
    }
}

/// `???+ kind "label"`, a blank line, the body indented, a blank line.
///
/// Blank body lines stay empty rather than becoming four spaces.
fn render_admonition(kind: &str, label: &str, content: &Opaque, cr: &str, out: &mut Vec<String>) {
    out.push(format!("???+ {kind} \"{label}\"{cr}"));
    out.push(cr.to_string());
    for line in content.lines() {
        if line.trim().is_empty() {
            out.push(cr.to_string());
        } else {
            out.push(format!("{ADMONITION_INDENT}{line}"));
        }
    }
    out.push(cr.to_string());
}
