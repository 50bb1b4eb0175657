//! Lexical normalization and tokenization of SQL text.
//!
//! Normalization blanks out comments and string literals so that structural
//! checks and token matching only see executable SQL. Every blanked byte is
//! replaced by a space (line breaks are kept), so the normalized text has the
//! same byte length as the input and offsets can be mapped back directly.

/// Lexer state while scanning SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    StringLiteral,
}

/// Removes comments and single-quoted string literals from SQL.
///
/// - `-- ...` runs to the end of the line.
/// - `/* ... */` is non-greedy and may span lines.
/// - `'...'` literals use `''` as an escaped quote.
///
/// Unterminated comments and literals swallow the rest of the input rather
/// than failing.
pub fn normalize(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut state = State::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::BlockComment;
                }
                '\'' => {
                    out.push(' ');
                    state = State::StringLiteral;
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' || c == '\r' {
                    out.push(c);
                    state = State::Code;
                } else {
                    blank(&mut out, c);
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else {
                    blank(&mut out, c);
                }
            }
            State::StringLiteral => {
                if c == '\'' {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        out.push_str("  ");
                    } else {
                        out.push(' ');
                        state = State::Code;
                    }
                } else {
                    blank(&mut out, c);
                }
            }
        }
    }

    out
}

/// Pushes one space per UTF-8 byte of `c`, keeping line breaks intact.
fn blank(out: &mut String, c: char) {
    if c == '\n' || c == '\r' {
        out.push(c);
    } else {
        out.extend(std::iter::repeat(' ').take(c.len_utf8()));
    }
}

/// Splits text into lowercase tokens.
///
/// A token is a maximal run of letters, digits, or underscores; everything
/// else separates tokens and is discarded.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Returns true for characters that can be part of a token.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
