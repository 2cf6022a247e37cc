use tracing::{debug, warn};

use crate::error::{Diagnostic, ParseError, Severity};
use crate::scan::{self, CodeFence, LineKind};
use crate::types::{Block, CellDoc, Fence, Opaque, OutputKind, PreprocessOptions, Span};

/// Result of parsing a document.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// The parsed document.
    pub doc: CellDoc,
    /// Non-fatal diagnostics collected during parsing.
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse Quarto markdown with default options.
pub fn parse(input: &str) -> Result<ParseResult, ParseError> {
    parse_with(input, &PreprocessOptions::default())
}

/// Parse Quarto markdown into a block tree.
///
/// Malformed input never fails: unmatched fences, bad attributes and
/// unterminated blocks produce diagnostics and a best-effort tree. An `Err`
/// means the parser's own stack bookkeeping went wrong.
pub fn parse_with(input: &str, options: &PreprocessOptions) -> Result<ParseResult, ParseError> {
    let (body, trailing_newline) = match input.strip_suffix('\n') {
        Some(body) => (body, true),
        None => (input, false),
    };

    let mut parser = Parser::new(options);
    for (idx, line) in body.split('\n').enumerate() {
        parser.feed(line, idx + 1)?;
    }
    let line_count = body.split('\n').count();
    let blocks = parser.finish(line_count)?;

    Ok(ParseResult {
        doc: CellDoc {
            blocks,
            trailing_newline,
        },
        diagnostics: parser.diagnostics,
    })
}

// ------------------------------------------------------------------
// Parser state
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Cell,
    Output(OutputKind),
    Div,
}

/// An open fenced div on the nesting stack.
struct Frame {
    fence: Fence,
    kind: FrameKind,
    children: Vec<Block>, // Cell and Div
    content: Opaque,      // Output
    start_line: usize,
}

impl Frame {
    fn into_block(self, close: Option<&str>, end_line: usize) -> Block {
        let span = Span {
            start_line: self.start_line,
            end_line,
        };
        match self.kind {
            FrameKind::Cell => Block::Cell {
                fence: self.fence,
                children: self.children,
                span,
            },
            FrameKind::Output(output) => Block::Output {
                output,
                fence: self.fence,
                content: self.content,
                span,
            },
            FrameKind::Div => Block::Div {
                fence: self.fence,
                children: self.children,
                close: close.map(str::to_string),
                span,
            },
        }
    }
}

/// A backtick/tilde code block currently being read.
struct OpenCode {
    fence: CodeFence,
    /// `Some` when the block is a `cell-code` block being captured; otherwise
    /// the lines go straight into the surrounding plain text.
    capture: Option<(Option<String>, Opaque)>,
    start_line: usize,
}

struct Parser<'o> {
    options: &'o PreprocessOptions,
    stack: Vec<Frame>,
    blocks: Vec<Block>,
    code: Option<OpenCode>,
    diagnostics: Vec<Diagnostic>,
}

impl<'o> Parser<'o> {
    fn new(options: &'o PreprocessOptions) -> Self {
        Self {
            options,
            stack: Vec::new(),
            blocks: Vec::new(),
            code: None,
            diagnostics: Vec::new(),
        }
    }

    /// One decision per line.
    fn feed(&mut self, line: &str, line_no: usize) -> Result<(), ParseError> {
        if self.code.is_some() {
            return self.feed_code(line, line_no);
        }

        // Output bodies are opaque: only a long-enough bare close ends them.
        if let Some(frame) = self.stack.last_mut()
            && matches!(frame.kind, FrameKind::Output(_))
        {
            if let LineKind::Close { colons } = scan::classify(line)
                && colons >= frame.fence.colons
            {
                return self.close_frame(self.stack.len() - 1, line, line_no);
            }
            frame.content.push(line);
            return Ok(());
        }

        match scan::classify(line) {
            LineKind::Open { colons, attrs } => {
                let kind = frame_kind(&attrs.classes);
                debug!(line = line_no, colons, ?kind, "open fence");
                if kind == FrameKind::Output(OutputKind::Unknown) {
                    self.diagnostics.push(Diagnostic {
                        severity: Severity::Info,
                        message: format!(
                            "Unrecognised output kind {:?}, rendering as plain output",
                            attrs.classes
                        ),
                        span: Some(Span::line(line_no)),
                        code: Some("W004".into()),
                    });
                }
                self.stack.push(Frame {
                    fence: Fence {
                        colons,
                        attrs,
                        raw: line.to_string(),
                    },
                    kind,
                    children: Vec::new(),
                    content: Opaque::new(),
                    start_line: line_no,
                });
                Ok(())
            }

            LineKind::Close { colons } => {
                // Innermost frame whose opening run is not longer than this one.
                match self.stack.iter().rposition(|f| f.fence.colons <= colons) {
                    Some(pos) => self.close_frame(pos, line, line_no),
                    None => {
                        let severity = if self.stack.is_empty() {
                            Severity::Info
                        } else {
                            Severity::Warning
                        };
                        self.diagnostics.push(Diagnostic {
                            severity,
                            message: format!(
                                "Closing fence of {colons} colons matches no open block, kept as text"
                            ),
                            span: Some(Span::line(line_no)),
                            code: Some("W003".into()),
                        });
                        self.push_plain(line, line_no)
                    }
                }
            }

            LineKind::Directive { .. } => {
                if self.options.normalize_directives
                    && let Some(normalized) = scan::normalize_directive(line)
                {
                    debug!(line = line_no, "normalized directive {:?}", normalized);
                    return self.push_plain(&normalized, line_no);
                }
                self.push_plain(line, line_no)
            }

            LineKind::Malformed { message, .. } => {
                self.diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    message: format!("Invalid attributes on fence, kept as text: {message}"),
                    span: Some(Span::line(line_no)),
                    code: Some("W002".into()),
                });
                self.push_plain(line, line_no)
            }

            LineKind::Text => match scan::code_fence_open(line) {
                Some(fence) => self.open_code(fence, line, line_no),
                None => self.push_plain(line, line_no),
            },
        }
    }

    fn open_code(&mut self, fence: CodeFence, line: &str, line_no: usize) -> Result<(), ParseError> {
        // `cell-code` blocks are only special inside a fenced div.
        let capture = if self.stack.is_empty() {
            None
        } else {
            fence
                .cell_code_language()
                .map(|language| (language, Opaque::new()))
        };
        if capture.is_none() {
            self.push_plain(line, line_no)?;
        } else {
            debug!(line = line_no, "cell-code block");
        }
        self.code = Some(OpenCode {
            fence,
            capture,
            start_line: line_no,
        });
        Ok(())
    }

    fn feed_code(&mut self, line: &str, line_no: usize) -> Result<(), ParseError> {
        let Some(code) = self.code.as_mut() else {
            return Err(ParseError::Invariant {
                line: line_no,
                message: "code block state vanished".into(),
            });
        };

        if !code.fence.is_closed_by(line) {
            if let Some((_, body)) = code.capture.as_mut() {
                body.push(line);
                return Ok(());
            }
            return self.push_plain(line, line_no);
        }

        match self.code.take() {
            Some(code) => self.finish_code(code, Some(line), line_no),
            None => Ok(()),
        }
    }

    fn finish_code(
        &mut self,
        code: OpenCode,
        close: Option<&str>,
        line_no: usize,
    ) -> Result<(), ParseError> {
        match code.capture {
            Some((language, body)) => {
                let block = Block::CodeCell {
                    delimiter: code.fence.delimiter(),
                    language,
                    body,
                    close: close.map(str::to_string),
                    span: Span {
                        start_line: code.start_line,
                        end_line: line_no,
                    },
                };
                self.sink(line_no)?.push(block);
                Ok(())
            }
            None => match close {
                Some(line) => self.push_plain(line, line_no),
                None => Ok(()),
            },
        }
    }

    /// Close the frame at `pos`, flushing anything opened after it.
    fn close_frame(&mut self, pos: usize, line: &str, line_no: usize) -> Result<(), ParseError> {
        while self.stack.len() > pos + 1 {
            let Some(orphan) = self.stack.pop() else {
                break;
            };
            self.report_unterminated(&orphan, line_no);
            let block = orphan.into_block(None, line_no.saturating_sub(1));
            self.sink(line_no)?.push(block);
        }

        let Some(frame) = self.stack.pop() else {
            return Err(ParseError::Invariant {
                line: line_no,
                message: format!("no open block at stack position {pos}"),
            });
        };
        debug!(line = line_no, colons = frame.fence.colons, kind = ?frame.kind, "close fence");
        let block = frame.into_block(Some(line), line_no);
        self.sink(line_no)?.push(block);
        Ok(())
    }

    /// Flush whatever is still open at end of input.
    fn finish(&mut self, last_line: usize) -> Result<Vec<Block>, ParseError> {
        if let Some(code) = self.code.take() {
            self.diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                message: format!(
                    "Unclosed code block opened at line {}",
                    code.start_line
                ),
                span: Some(Span {
                    start_line: code.start_line,
                    end_line: last_line,
                }),
                code: Some("W005".into()),
            });
            self.finish_code(code, None, last_line)?;
        }

        while let Some(frame) = self.stack.pop() {
            self.report_unterminated(&frame, last_line);
            let block = frame.into_block(None, last_line);
            self.sink(last_line)?.push(block);
        }

        Ok(std::mem::take(&mut self.blocks))
    }

    fn report_unterminated(&mut self, frame: &Frame, end_line: usize) {
        warn!(
            line = frame.start_line,
            colons = frame.fence.colons,
            "unterminated fenced div"
        );
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            message: format!(
                "Unclosed fenced div '{}' opened at line {}",
                frame.fence.raw.trim(),
                frame.start_line
            ),
            span: Some(Span {
                start_line: frame.start_line,
                end_line,
            }),
            code: Some("W001".into()),
        });
    }

    /// Where finished blocks go: the innermost open div, or the top level.
    fn sink(&mut self, line_no: usize) -> Result<&mut Vec<Block>, ParseError> {
        match self.stack.last_mut() {
            None => Ok(&mut self.blocks),
            Some(frame) if matches!(frame.kind, FrameKind::Output(_)) => {
                Err(ParseError::Invariant {
                    line: line_no,
                    message: "attempted to nest a block inside an output".into(),
                })
            }
            Some(frame) => Ok(&mut frame.children),
        }
    }

    /// Append a line to the current plain run, starting a new one if needed.
    fn push_plain(&mut self, line: &str, line_no: usize) -> Result<(), ParseError> {
        let sink = self.sink(line_no)?;
        if let Some(Block::Plain { lines, span }) = sink.last_mut() {
            lines.push(line.to_string());
            span.end_line = line_no;
        } else {
            sink.push(Block::Plain {
                lines: vec![line.to_string()],
                span: Span::line(line_no),
            });
        }
        Ok(())
    }
}

fn frame_kind(classes: &[String]) -> FrameKind {
    if classes.iter().any(|c| c == "cell") {
        return FrameKind::Cell;
    }
    match OutputKind::from_classes(classes) {
        Some(kind) => FrameKind::Output(kind),
        None => FrameKind::Div,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn blocks(input: &str) -> Vec<Block> {
        parse(input).unwrap().doc.blocks
    }

    fn codes(result: &ParseResult) -> Vec<&str> {
        result
            .diagnostics
            .iter()
            .filter_map(|d| d.code.as_deref())
            .collect()
    }

    #[test]
    fn parse_empty_input() {
        let result = parse("").unwrap();
        assert!(!result.doc.trailing_newline);
        assert!(result.diagnostics.is_empty());
        assert_eq!(
            result.doc.blocks,
            vec![Block::Plain {
                lines: vec![String::new()],
                span: Span::line(1),
            }]
        );
    }

    #[test]
    fn parse_plain_markdown() {
        let result = parse("# Hello\n\nSome text here.\n").unwrap();
        assert!(result.doc.trailing_newline);
        assert_eq!(result.doc.blocks.len(), 1);
        match &result.doc.blocks[0] {
            Block::Plain { lines, span } => {
                assert_eq!(lines, &["# Hello", "", "Some text here."]);
                assert_eq!(span.start_line, 1);
                assert_eq!(span.end_line, 3);
            }
            other => panic!("Expected Plain block, got {other:?}"),
        }
    }

    #[test]
    fn parse_cell_with_code_and_output() {
        let input = concat!(
            ":::: {.cell execution_count=\"1\"}\n",
            "``` {.python .cell-code}\n",
            "print(\"Hello World\")\n",
            "```\n",
            "\n",
            "::: {.cell-output .cell-output-stdout}\n",
            "    Hello World\n",
            ":::\n",
            "::::\n",
        );
        let result = parse(input).unwrap();
        assert!(result.diagnostics.is_empty(), "diagnostics: {:?}", result.diagnostics);
        assert_eq!(result.doc.blocks.len(), 1);

        let Block::Cell { fence, children, span } = &result.doc.blocks[0] else {
            panic!("Expected Cell, got {:?}", result.doc.blocks[0]);
        };
        assert_eq!(fence.colons, 4);
        assert_eq!(fence.attrs.get("execution_count"), Some("1"));
        assert_eq!(span.start_line, 1);
        assert_eq!(span.end_line, 9);
        assert_eq!(children.len(), 3);

        match &children[0] {
            Block::CodeCell {
                delimiter,
                language,
                body,
                close,
                ..
            } => {
                assert_eq!(delimiter, "```");
                assert_eq!(language.as_deref(), Some("python"));
                assert_eq!(body.lines().collect::<Vec<_>>(), vec!["print(\"Hello World\")"]);
                assert_eq!(close.as_deref(), Some("```"));
            }
            other => panic!("Expected CodeCell, got {other:?}"),
        }
        assert!(matches!(&children[1], Block::Plain { lines, .. } if lines == &[""]));
        match &children[2] {
            Block::Output { output, content, .. } => {
                assert_eq!(*output, OutputKind::Stdout);
                assert_eq!(content.lines().collect::<Vec<_>>(), vec!["    Hello World"]);
            }
            other => panic!("Expected Output, got {other:?}"),
        }
    }

    #[test]
    fn parse_inner_close_does_not_close_outer() {
        let input = ":::: {.cell}\n::: {.cell-output-stderr}\nwarn\n:::\nafter\n::::\n";
        let result = parse(input).unwrap();
        assert!(result.diagnostics.is_empty(), "diagnostics: {:?}", result.diagnostics);
        let Block::Cell { children, .. } = &result.doc.blocks[0] else {
            panic!("Expected Cell");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[0], Block::Output { output: OutputKind::Stderr, .. }));
        assert!(matches!(&children[1], Block::Plain { lines, .. } if lines == &["after"]));
    }

    #[test]
    fn parse_output_content_is_opaque() {
        let input = concat!(
            "::::: {.cell}\n",
            ":::: {.cell-output .cell-output-error}\n",
            "::: {.cell}\n",
            "Traceback: ::: bad\n",
            ":::\n",
            "::::\n",
            ":::::\n",
        );
        let result = parse(input).unwrap();
        let Block::Cell { children, .. } = &result.doc.blocks[0] else {
            panic!("Expected Cell");
        };
        assert_eq!(children.len(), 1);
        match &children[0] {
            Block::Output { output, content, .. } => {
                assert_eq!(*output, OutputKind::Error);
                assert_eq!(
                    content.lines().collect::<Vec<_>>(),
                    vec!["::: {.cell}", "Traceback: ::: bad", ":::"]
                );
            }
            other => panic!("Expected Output, got {other:?}"),
        }
    }

    #[test]
    fn parse_directive_is_plain() {
        let input = ":::: {.cell}\n::: some.module.path\n::::\n::: other.module\n";
        let result = parse(input).unwrap();
        assert_eq!(result.doc.blocks.len(), 2);
        let Block::Cell { children, .. } = &result.doc.blocks[0] else {
            panic!("Expected Cell");
        };
        assert!(matches!(&children[0], Block::Plain { lines, .. } if lines == &["::: some.module.path"]));
        assert!(
            matches!(&result.doc.blocks[1], Block::Plain { lines, .. } if lines == &["::: other.module"])
        );
    }

    #[test]
    fn parse_short_close_inside_longer_frame_is_text() {
        let input = ":::: {.cell}\n:::\n::::\n";
        let result = parse(input).unwrap();
        assert_eq!(codes(&result), vec!["W003"]);
        let Block::Cell { children, .. } = &result.doc.blocks[0] else {
            panic!("Expected Cell");
        };
        assert!(matches!(&children[0], Block::Plain { lines, .. } if lines == &[":::"]));
    }

    #[test]
    fn parse_stray_top_level_close_is_plain() {
        let result = parse("text\n::::::\nmore\n").unwrap();
        assert_eq!(codes(&result), vec!["W003"]);
        assert_eq!(result.diagnostics[0].severity, Severity::Info);
        assert_eq!(result.doc.blocks.len(), 1);
    }

    #[test]
    fn parse_long_close_closes_innermost() {
        let input = ":::: {.cell}\n::: {.cell-output-stdout}\nx\n::::::\nrest\n";
        let result = parse(input).unwrap();
        // The output closes; the cell is left open and flushed at EOF.
        assert_eq!(codes(&result), vec!["W001"]);
        let Block::Cell { children, .. } = &result.doc.blocks[0] else {
            panic!("Expected Cell");
        };
        assert!(matches!(&children[0], Block::Output { .. }));
        assert!(matches!(&children[1], Block::Plain { lines, .. } if lines == &["rest"]));
    }

    #[test]
    fn parse_close_flushes_deeper_frames() {
        let input = "::: {.cell}\n::::: {.panel}\ninside\n::::\n";
        let result = parse(input).unwrap();
        assert_eq!(codes(&result), vec!["W001"]);
        assert_eq!(result.doc.blocks.len(), 1);
        let Block::Cell { children, .. } = &result.doc.blocks[0] else {
            panic!("Expected Cell");
        };
        match &children[0] {
            Block::Div { close, children, .. } => {
                assert!(close.is_none());
                assert!(matches!(&children[0], Block::Plain { lines, .. } if lines == &["inside"]));
            }
            other => panic!("Expected Div, got {other:?}"),
        }
    }

    #[test]
    fn parse_unterminated_frames_flush() {
        let input = ":::: {.cell}\n::: {.cell-output-stdout}\nHello\n";
        let result = parse(input).unwrap();
        assert_eq!(codes(&result), vec!["W001", "W001"]);
        let Block::Cell { children, span, .. } = &result.doc.blocks[0] else {
            panic!("Expected Cell");
        };
        assert_eq!(span.end_line, 3);
        assert!(matches!(&children[0], Block::Output { content, .. } if content.len() == 1));
    }

    #[test]
    fn parse_opaque_div_keeps_fences() {
        let input = "::: {.callout-note}\nNote body\n:::\n";
        let result = parse(input).unwrap();
        match &result.doc.blocks[0] {
            Block::Div {
                fence,
                children,
                close,
                ..
            } => {
                assert_eq!(fence.raw, "::: {.callout-note}");
                assert_eq!(close.as_deref(), Some(":::"));
                assert_eq!(children.len(), 1);
            }
            other => panic!("Expected Div, got {other:?}"),
        }
    }

    #[test]
    fn parse_fences_inside_code_blocks_are_text() {
        let input = "```markdown\n:::: {.cell}\n::::\n```\n";
        let result = parse(input).unwrap();
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.doc.blocks.len(), 1);
        assert!(matches!(&result.doc.blocks[0], Block::Plain { lines, .. } if lines.len() == 4));
    }

    #[test]
    fn parse_plain_code_block_inside_cell() {
        let input = ":::: {.cell}\n```text\n:::\n```\n::::\n";
        let result = parse(input).unwrap();
        assert!(result.diagnostics.is_empty(), "diagnostics: {:?}", result.diagnostics);
        let Block::Cell { children, .. } = &result.doc.blocks[0] else {
            panic!("Expected Cell");
        };
        assert!(matches!(&children[0], Block::Plain { lines, .. } if lines == &["```text", ":::", "```"]));
    }

    #[test]
    fn parse_unclosed_cell_code() {
        let input = ":::: {.cell}\n``` {.python .cell-code}\nx = 1\n";
        let result = parse(input).unwrap();
        assert_eq!(codes(&result), vec!["W005", "W001"]);
        let Block::Cell { children, .. } = &result.doc.blocks[0] else {
            panic!("Expected Cell");
        };
        assert!(matches!(&children[0], Block::CodeCell { close: None, .. }));
    }

    #[test]
    fn parse_malformed_attrs_reported() {
        let result = parse("::: {.cell\ntext\n").unwrap();
        assert_eq!(codes(&result), vec!["W002"]);
        assert!(matches!(&result.doc.blocks[0], Block::Plain { lines, .. } if lines.len() == 2));
    }

    #[test]
    fn parse_unknown_output_kind_reported() {
        let result = parse("::: {.cell-output .cell-output-markdown}\nx\n:::\n").unwrap();
        assert_eq!(codes(&result), vec!["W004"]);
        assert!(matches!(
            &result.doc.blocks[0],
            Block::Output { output: OutputKind::Unknown, .. }
        ));
    }

    #[test]
    fn parse_normalizes_directives_when_asked() {
        let options = PreprocessOptions {
            normalize_directives: true,
        };
        let result = parse_with("::::: pathlib.Path\n", &options).unwrap();
        assert!(matches!(&result.doc.blocks[0], Block::Plain { lines, .. } if lines == &["::: pathlib.Path"]));

        let untouched = parse("::::: pathlib.Path\n").unwrap();
        assert!(matches!(&untouched.doc.blocks[0], Block::Plain { lines, .. } if lines == &["::::: pathlib.Path"]));
    }

    #[test]
    fn parse_block_tree_serializes() {
        let result = parse(":::: {.cell}\n::: {.cell-output-stdout}\nhi\n:::\n::::\n").unwrap();
        let json = serde_json::to_value(&result.doc).unwrap();
        assert_eq!(json["blocks"][0]["kind"], "cell");
        assert_eq!(json["blocks"][0]["children"][0]["output"], "stdout");
        assert_eq!(json["blocks"][0]["children"][0]["content"][0], "hi");
    }

    #[test]
    fn parse_bare_output_words_are_plain() {
        for kind in ["stdout", "stderr", "error"] {
            let input = format!("::: cell-output-{kind}\nHello\n:::\n");
            assert_eq!(
                blocks(&input),
                vec![Block::Plain {
                    lines: vec![format!("::: cell-output-{kind}"), "Hello".into(), ":::".into()],
                    span: Span {
                        start_line: 1,
                        end_line: 3,
                    },
                }]
            );
        }
    }

    #[test]
    fn parse_bare_display_opens_output() {
        let parsed = blocks("::: cell-output-display\ntable\n:::\n");
        assert!(matches!(
            &parsed[0],
            Block::Output { output: OutputKind::Display, content, .. } if content.len() == 1
        ));
    }

    #[test]
    fn parse_attrs_without_space_are_plain() {
        let parsed = blocks(":::{.cell}\nbody\n:::\n");
        assert_eq!(parsed.len(), 1);
        assert!(matches!(&parsed[0], Block::Plain { lines, .. } if lines == &[":::{.cell}", "body", ":::"]));
    }
}
