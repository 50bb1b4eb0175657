//! Danger keyword matching strategies.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use super::lexer::tokenize;

/// Which text the danger keywords are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Case-insensitive substring search over the raw SQL, including
    /// comments, string literals, and identifiers.
    #[default]
    WholeText,
    /// Exact token (or consecutive token run) match over the normalized SQL.
    Tokens,
}

impl MatchMode {
    /// Parses a mode name ("whole_text" or "tokens").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "whole_text" => Some(Self::WholeText),
            "tokens" => Some(Self::Tokens),
            _ => None,
        }
    }

    /// Parses a configured mode, falling back to `WholeText` when unset or invalid.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::WholeText,
            Some(raw) => Self::parse(raw).unwrap_or_else(|| {
                warn!("Unknown danger keyword match mode '{raw}', using whole_text");
                Self::WholeText
            }),
        }
    }

    /// Returns the strategy implementing this mode.
    pub fn matcher(&self) -> &'static dyn KeywordMatcher {
        match self {
            Self::WholeText => &WholeTextMatcher,
            Self::Tokens => &TokenMatcher,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WholeText => "whole_text",
            Self::Tokens => "tokens",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A danger keyword matching policy.
///
/// Implementations return the matched keywords in the order they appear in
/// `keywords`, without duplicates. Keywords are already lower-cased.
pub trait KeywordMatcher: Send + Sync {
    fn find_matches(&self, keywords: &[String], original: &str, tokens: &[String]) -> Vec<String>;
}

/// Substring search over the original, un-stripped SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeTextMatcher;

impl KeywordMatcher for WholeTextMatcher {
    fn find_matches(&self, keywords: &[String], original: &str, _tokens: &[String]) -> Vec<String> {
        let lower = original.to_lowercase();
        let mut matched: Vec<String> = Vec::new();
        for keyword in keywords {
            if !keyword.is_empty() && lower.contains(keyword.as_str()) && !matched.contains(keyword)
            {
                matched.push(keyword.clone());
            }
        }
        matched
    }
}

/// Token match over the normalized SQL.
///
/// Single-word keywords must equal a whole token; multi-word keywords must
/// appear as a consecutive run of tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenMatcher;

impl KeywordMatcher for TokenMatcher {
    fn find_matches(&self, keywords: &[String], _original: &str, tokens: &[String]) -> Vec<String> {
        let mut matched: Vec<String> = Vec::new();
        for keyword in keywords {
            if matched.contains(keyword) {
                continue;
            }
            let keyword_tokens = tokenize(keyword);
            if keyword_tokens.is_empty() || keyword_tokens.len() > tokens.len() {
                continue;
            }
            let found = tokens
                .windows(keyword_tokens.len())
                .any(|window| window == keyword_tokens.as_slice());
            if found {
                matched.push(keyword.clone());
            }
        }
        matched
    }
}
