//! Splitting SQL scripts into executable statements.
//!
//! Scripts hold one statement per line-terminating semicolon. Compound
//! creation blocks and anonymous blocks are sent whole and keep their final
//! semicolon, which PL/SQL compilation needs; ordinary statements lose it.

use super::classifier::{is_anonymous_block, is_compound_creation_block};
use super::lexer::{normalize, tokenize};

/// One statement ready to be sent to the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub sql: String,
    /// Returns rows (SELECT / WITH) rather than an affected-row count.
    pub is_query: bool,
}

impl PreparedStatement {
    fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let sql = if keeps_trailing_semicolon(trimmed) {
            if trimmed.ends_with(';') {
                trimmed.to_string()
            } else {
                format!("{trimmed};")
            }
        } else {
            trimmed.trim_end_matches(';').trim_end().to_string()
        };

        let first = tokenize(&normalize(&sql)).into_iter().next();
        let is_query = matches!(first.as_deref(), Some("select") | Some("with"));

        Self { sql, is_query }
    }
}

/// Reports whether the statement must keep its trailing semicolon.
pub fn keeps_trailing_semicolon(sql: &str) -> bool {
    is_compound_creation_block(sql) || is_anonymous_block(&normalize(sql))
}

/// Reports whether the whole text must be executed as one statement.
pub fn is_single_statement_block(sql: &str) -> bool {
    keeps_trailing_semicolon(sql)
}

/// Splits a script into statements.
///
/// Line endings are normalized to `\n`. Split points are semicolons that end a
/// line (trailing spaces and tabs allowed); they are located on the
/// normalized text so literals and comments never split a statement.
pub fn prepare_statements(sql: &str) -> Vec<PreparedStatement> {
    let text = sql.replace("\r\n", "\n").replace('\r', "\n");
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if is_single_statement_block(text) {
        return vec![PreparedStatement::new(text)];
    }

    split_at_line_terminators(text)
        .into_iter()
        .map(PreparedStatement::new)
        .filter(|stmt| !stmt.sql.is_empty())
        .collect()
}

fn split_at_line_terminators(text: &str) -> Vec<&str> {
    let normalized = normalize(text);
    let bytes = normalized.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;

    for (idx, byte) in bytes.iter().enumerate() {
        if *byte != b';' {
            continue;
        }
        let rest = &bytes[idx + 1..];
        let ws = rest.iter().take_while(|b| **b == b' ' || **b == b'\t').count();
        if rest.get(ws) == Some(&b'\n') {
            // `;` is ASCII and normalization keeps byte offsets, so idx is a char boundary in text.
            let segment = text[start..=idx].trim();
            if !segment.is_empty() {
                segments.push(segment);
            }
            start = idx + 1 + ws + 1;
        }
    }

    let tail = text[start.min(text.len())..].trim();
    if !tail.is_empty() {
        segments.push(tail);
    }
    segments
}

/// Removes trailing lines consisting only of `/` (the SQL*Plus run command).
pub fn strip_trailing_slash_lines(text: &str) -> &str {
    let mut s = text;
    loop {
        s = s.trim_end_matches(['\r', '\n']);
        match s.rfind('\n') {
            Some(pos) if s[pos + 1..].trim() == "/" => s = &s[..pos],
            Some(_) => return s,
            None if s.trim() == "/" => return "",
            None => return s,
        }
    }
}
