use serde::{Deserialize, Serialize};

/// A parsed Quarto markdown document.
#[derive(Debug, Clone, Serialize)]
pub struct CellDoc {
    /// Ordered sequence of top-level blocks.
    pub blocks: Vec<Block>,
    /// Whether the source ended with a newline.
    pub trailing_newline: bool,
}

/// Source location of a block (1-based, inclusive line numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
}

impl Span {
    pub fn line(line: usize) -> Self {
        Self {
            start_line: line,
            end_line: line,
        }
    }
}

/// Knobs for the rewrite pass.
#[derive(Debug, Clone, Default)]
pub struct PreprocessOptions {
    /// Collapse `:::::: some.module` (Quarto re-wraps mkdocstrings directives
    /// in extra colons when nesting) back to `::: some.module`.
    pub normalize_directives: bool,
}

/// A Pandoc attribute block: `{#id .class1 .class2 key="value"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Class names without the leading dot, in source order.
    pub classes: Vec<String>,
    /// Key/value pairs in source order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pairs: Vec<(String, String)>,
}

impl Attrs {
    pub fn has_class(&self, name: &str) -> bool {
        self.classes.iter().any(|c| c == name)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The opening line of a fenced div.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fence {
    /// Length of the colon run.
    pub colons: usize,
    pub attrs: Attrs,
    /// The line exactly as it appeared in the source.
    pub raw: String,
}

/// Kind of a `cell-output-*` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Stdout,
    Stderr,
    Error,
    Display,
    /// A `cell-output` class we do not have a rendering for.
    Unknown,
}

impl OutputKind {
    /// Pick the output kind from a div's class list.
    ///
    /// Returns `None` when no class belongs to the `cell-output` family.
    pub fn from_classes(classes: &[String]) -> Option<Self> {
        let mut family = false;
        for class in classes {
            match class.as_str() {
                "cell-output-stdout" => return Some(Self::Stdout),
                "cell-output-stderr" => return Some(Self::Stderr),
                "cell-output-error" => return Some(Self::Error),
                "cell-output-display" => return Some(Self::Display),
                other if other == "cell-output" || other.starts_with("cell-output-") => {
                    family = true;
                }
                _ => {}
            }
        }
        family.then_some(Self::Unknown)
    }

    /// Admonition `(type, label)` for this kind, or `None` when the content is
    /// emitted as-is.
    pub fn admonition(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Stdout => Some(("note", "output")),
            Self::Stderr => Some(("warning", "stderr")),
            Self::Error => Some(("danger", "error")),
            Self::Display => None,
            Self::Unknown => Some(("note", "output")),
        }
    }
}

/// Lines the parser captured without scanning them for structure.
///
/// Output bodies and `cell-code` bodies live here, so a literal `:::` in an
/// error message can never be mistaken for a fence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Opaque(Vec<String>);

impl Opaque {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: &str) {
        self.0.push(line.to_string());
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every captured line is blank.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|l| l.trim().is_empty())
    }
}

impl<S: Into<String>> FromIterator<S> for Opaque {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A parsed block in the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    /// Ordinary lines, emitted unchanged.
    Plain { lines: Vec<String>, span: Span },
    /// A `.cell` wrapper. Only its children survive rewriting.
    Cell {
        fence: Fence,
        children: Vec<Block>,
        span: Span,
    },
    /// A code block tagged `cell-code`.
    CodeCell {
        /// Indentation plus the backtick/tilde run of the opening line.
        delimiter: String,
        language: Option<String>,
        body: Opaque,
        /// Closing line, `None` if the input ended first.
        close: Option<String>,
        span: Span,
    },
    /// A `.cell-output-*` block.
    Output {
        output: OutputKind,
        fence: Fence,
        content: Opaque,
        span: Span,
    },
    /// A fenced div with no recognised class, passed through.
    Div {
        fence: Fence,
        children: Vec<Block>,
        /// Closing fence line, `None` if the input ended first.
        close: Option<String>,
        span: Span,
    },
}

impl Block {
    pub fn span(&self) -> Span {
        match self {
            Block::Plain { span, .. }
            | Block::Cell { span, .. }
            | Block::CodeCell { span, .. }
            | Block::Output { span, .. }
            | Block::Div { span, .. } => *span,
        }
    }
}
