//! Query safety classification module.
//!
//! Lexically analyzes SQL to find configured danger keywords, schema-altering
//! statements, multi-statement scripts, and PL/SQL blocks. The result decides
//! whether a human has to confirm execution.

mod classifier;
mod lexer;
mod matcher;
pub mod script;

pub use classifier::{is_anonymous_block, is_compound_creation_block, SqlClassifier};
pub use lexer::{normalize, tokenize};
pub use matcher::{KeywordMatcher, MatchMode, TokenMatcher, WholeTextMatcher};

use serde::Serialize;
use std::fmt;

/// Verbs that make a statement schema-altering (DDL).
pub const DDL_VERBS: [&str; 8] = [
    "create", "drop", "alter", "truncate", "rename", "comment", "grant", "revoke",
];

/// The leading verb of a SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Truncate,
    Grant,
    Revoke,
    Rename,
    Comment,
    /// Any other leading token, stored upper-cased.
    Other(String),
    /// No tokens at all.
    Unknown,
}

impl StatementType {
    /// Maps the first token of a statement to its statement type.
    pub fn from_first_token(token: Option<&str>) -> Self {
        let Some(token) = token else {
            return Self::Unknown;
        };
        match token.to_lowercase().as_str() {
            "select" => Self::Select,
            "insert" => Self::Insert,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "create" => Self::Create,
            "drop" => Self::Drop,
            "alter" => Self::Alter,
            "truncate" => Self::Truncate,
            "grant" => Self::Grant,
            "revoke" => Self::Revoke,
            "rename" => Self::Rename,
            "comment" => Self::Comment,
            other => Self::Other(other.to_uppercase()),
        }
    }

    /// Returns true for schema or privilege altering verbs.
    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Drop
                | Self::Alter
                | Self::Truncate
                | Self::Rename
                | Self::Comment
                | Self::Grant
                | Self::Revoke
        )
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Create => write!(f, "CREATE"),
            Self::Drop => write!(f, "DROP"),
            Self::Alter => write!(f, "ALTER"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Grant => write!(f, "GRANT"),
            Self::Revoke => write!(f, "REVOKE"),
            Self::Rename => write!(f, "RENAME"),
            Self::Comment => write!(f, "COMMENT"),
            Self::Other(verb) => write!(f, "{verb}"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl Serialize for StatementType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Danger keyword list and the policy used to match it.
///
/// Keywords are trimmed, lower-cased, and de-duplicated once at construction;
/// configuration order is kept and becomes the order of reported matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DangerKeywordConfig {
    keywords: Vec<String>,
    match_mode: MatchMode,
}

impl DangerKeywordConfig {
    /// Builds a keyword config from raw configured phrases.
    pub fn new<I, S>(keywords: I, match_mode: MatchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !normalized.contains(&keyword) {
                normalized.push(keyword);
            }
        }
        Self {
            keywords: normalized,
            match_mode,
        }
    }

    /// The normalized keyword phrases in configuration order.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }
}

/// Result of classifying one SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    /// The SQL exactly as submitted.
    pub original_text: String,
    /// The SQL with comments and string literals blanked (same byte length).
    pub normalized_text: String,
    /// Lower-cased tokens of the normalized text.
    pub tokens: Vec<String>,
    /// Danger keywords found under the active match policy, in config order.
    pub matched_keywords: Vec<String>,
    pub is_dangerous: bool,
    /// The first token is a schema-altering verb.
    pub is_ddl: bool,
    pub is_multi_statement: bool,
    /// Generic PL/SQL block (DECLARE, or BEGIN ... END); never set for creation blocks.
    pub contains_plsql_block: bool,
    /// CREATE PROCEDURE/FUNCTION/PACKAGE ... END executed as one unit.
    pub is_compound_creation_block: bool,
    /// BEGIN ... END / DECLARE ... END executed as one unit.
    pub is_anonymous_block: bool,
    pub statement_type: StatementType,
}

impl ClassificationResult {
    /// Returns true if the text must be sent to the database as one unit.
    pub fn is_single_unit_block(&self) -> bool {
        self.is_compound_creation_block || self.is_anonymous_block
    }
}
