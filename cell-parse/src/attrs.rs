use crate::error::ParseError;
use crate::types::Attrs;

/// Parse a Pandoc attribute block into `Attrs`.
///
/// Accepted format: `{#id .class key=value key2="quoted with spaces" k3='single'}`.
/// Surrounding braces are required. Tokens are whitespace separated and may
/// appear in any order; a second `#id` replaces the first.
pub fn parse_attrs(input: &str) -> Result<Attrs, ParseError> {
    let trimmed = input.trim();

    let inner = match trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(inner) => inner,
        None => return Err(invalid("attribute block must be wrapped in braces", 0)),
    };

    let chars: Vec<char> = inner.chars().collect();
    let len = chars.len();
    let mut pos = 0;
    let mut attrs = Attrs::default();

    while pos < len {
        // Skip whitespace.
        while pos < len && chars[pos].is_whitespace() {
            pos += 1;
        }
        if pos >= len {
            break;
        }

        match chars[pos] {
            '.' | '#' => {
                let sigil = chars[pos];
                pos += 1;
                let start = pos;
                while pos < len && is_name_char(chars[pos]) {
                    pos += 1;
                }
                if pos == start {
                    return Err(invalid(format!("empty name after '{sigil}'"), pos));
                }
                if pos < len && !chars[pos].is_whitespace() {
                    return Err(invalid(
                        format!("unexpected character '{}' in name", chars[pos]),
                        pos,
                    ));
                }
                let name: String = chars[start..pos].iter().collect();
                if sigil == '.' {
                    attrs.classes.push(name);
                } else {
                    attrs.id = Some(name);
                }
            }
            _ => {
                let key_start = pos;
                while pos < len && is_name_char(chars[pos]) {
                    pos += 1;
                }
                if pos == key_start {
                    return Err(invalid(
                        format!("unexpected character '{}'", chars[pos]),
                        pos,
                    ));
                }
                let key: String = chars[key_start..pos].iter().collect();

                if pos >= len || chars[pos] != '=' {
                    return Err(invalid(format!("expected '=' after key '{key}'"), pos));
                }
                pos += 1; // consume `=`

                let value = if pos < len && (chars[pos] == '"' || chars[pos] == '\'') {
                    let quote = chars[pos];
                    pos += 1; // consume opening quote
                    let mut value = String::new();
                    while pos < len && chars[pos] != quote {
                        if chars[pos] == '\\' && pos + 1 < len {
                            let next = chars[pos + 1];
                            if next == quote || next == '\\' {
                                value.push(next);
                                pos += 2;
                                continue;
                            }
                        }
                        value.push(chars[pos]);
                        pos += 1;
                    }
                    if pos >= len {
                        return Err(invalid(
                            format!("unterminated quoted value for key '{key}'"),
                            key_start,
                        ));
                    }
                    pos += 1; // consume closing quote
                    value
                } else {
                    // Unquoted value: read until whitespace.
                    let val_start = pos;
                    while pos < len && !chars[pos].is_whitespace() {
                        pos += 1;
                    }
                    chars[val_start..pos].iter().collect()
                };
                attrs.pairs.push((key, value));
            }
        }
    }

    Ok(attrs)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

fn invalid(message: impl Into<String>, offset: usize) -> ParseError {
    ParseError::InvalidAttrs {
        message: message.into(),
        offset,
    }
}
