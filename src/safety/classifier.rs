//! SQL classification logic.
//!
//! Works purely on lexical structure: there is no SQL parser behind this, so
//! the checks are deliberately simple and lean toward asking for confirmation.

use super::lexer::{is_word_char, normalize, tokenize};
use super::{ClassificationResult, DangerKeywordConfig, StatementType, DDL_VERBS};

/// SQL classifier bound to a danger keyword configuration.
#[derive(Debug, Clone)]
pub struct SqlClassifier {
    config: DangerKeywordConfig,
}

impl SqlClassifier {
    /// Creates a new classifier for the given keyword configuration.
    pub fn new(config: DangerKeywordConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DangerKeywordConfig {
        &self.config
    }

    /// Classifies a SQL text.
    pub fn classify(&self, sql: &str) -> ClassificationResult {
        let normalized = normalize(sql);
        let tokens = tokenize(&normalized);

        let is_compound_creation_block = is_compound_creation_block(sql);
        let is_anonymous_block = is_anonymous_block(&normalized);
        let is_multi_statement =
            is_multi_statement(&normalized, is_compound_creation_block || is_anonymous_block);
        let contains_plsql_block = !is_compound_creation_block && contains_plsql_block(&tokens);

        let first = tokens.first().map(String::as_str);
        let is_ddl = first.is_some_and(|token| DDL_VERBS.contains(&token));
        let statement_type = StatementType::from_first_token(first);

        let matched_keywords = self.config.match_mode().matcher().find_matches(
            self.config.keywords(),
            sql,
            &tokens,
        );

        ClassificationResult {
            original_text: sql.to_string(),
            normalized_text: normalized,
            is_dangerous: !matched_keywords.is_empty(),
            matched_keywords,
            tokens,
            is_ddl,
            is_multi_statement,
            contains_plsql_block,
            is_compound_creation_block,
            is_anonymous_block,
            statement_type,
        }
    }
}

/// Reports whether the text is a CREATE PROCEDURE/FUNCTION/PACKAGE ... END unit.
///
/// Scanning starts at the first "create" so that leading comments and blank
/// lines do not hide the statement.
pub fn is_compound_creation_block(sql: &str) -> bool {
    let lower = sql.trim().trim_start_matches('\u{feff}').to_lowercase();
    let Some(start) = lower.find("create") else {
        return false;
    };
    let stmt = lower[start..].trim_end();

    let has_unit = ["procedure", "function", "package"]
        .iter()
        .any(|word| contains_word(stmt, word));
    has_unit && has_terminating_end(stmt)
}

/// Reports whether the text is an anonymous BEGIN ... END or DECLARE ... END block.
pub fn is_anonymous_block(sql: &str) -> bool {
    let trimmed = sql.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();
    let opens = starts_with_word(&lower, "begin") || starts_with_word(&lower, "declare");
    opens && (lower.ends_with(" end") || lower.ends_with("\nend") || contains_interior_end(&lower))
}

/// Multi-statement detection on normalized text.
fn is_multi_statement(normalized: &str, single_unit: bool) -> bool {
    let trimmed = normalized.trim();
    if !trimmed.contains(';') || single_unit {
        return false;
    }
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
    body.contains(';')
}

/// DECLARE anywhere, or BEGIN followed later by END.
fn contains_plsql_block(tokens: &[String]) -> bool {
    if tokens.iter().any(|t| t == "declare") {
        return true;
    }
    tokens
        .iter()
        .position(|t| t == "begin")
        .is_some_and(|begin| tokens[begin + 1..].iter().any(|t| t == "end"))
}

/// An "end" preceded by whitespace and followed by whitespace, `;`, or end of text.
fn has_terminating_end(text: &str) -> bool {
    text.match_indices("end").any(|(idx, _)| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + 3..].chars().next();
        let starts_line = before.map_or(true, char::is_whitespace);
        let ends_word = after.map_or(true, |c| c.is_whitespace() || c == ';');
        starts_line && ends_word
    })
}

/// An interior " end " surrounded by whitespace.
fn contains_interior_end(text: &str) -> bool {
    text.match_indices("end").any(|(idx, _)| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + 3..].chars().next();
        before.is_some_and(char::is_whitespace) && after.is_some_and(char::is_whitespace)
    })
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.strip_prefix(word)
        .is_some_and(|rest| !rest.starts_with(is_word_char))
}

/// Whole-word containment: the match is not part of a longer identifier.
fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(idx, _)| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + word.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}
