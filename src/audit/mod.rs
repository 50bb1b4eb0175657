//! Append-only audit trail of SQL execution decisions.
//!
//! One record is written per terminal outcome of an execution attempt. A
//! record is a fixed block of `AUDIT_*` fields, the full SQL text, and a
//! sentinel line, so records with embedded newlines split unambiguously.
//! SQL lines that would read as the sentinel get one extra leading `\`:
//!
//! ```text
//! AUDIT_TIME=2025-01-31T10:15:00+01:00
//! AUDIT_CONNECTION=source
//! AUDIT_KEYWORDS=drop
//! AUDIT_APPROVED=true
//! AUDIT_ACTION=SUCCESS
//! AUDIT_SQL=
//! DROP TABLE tmp_import
//! ######AUDIT_END######
//! ```

mod reader;
mod rotation;

pub use reader::{parse_records, read_records};
pub use rotation::RotatingFile;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};

use crate::error::{Result, SqlGateError};

/// Line terminating every record.
pub const RECORD_SENTINEL: &str = "######AUDIT_END######";

/// Written when no keyword matched.
pub const NO_KEYWORDS: &str = "none";

/// Written when the connection name is empty.
pub const DEFAULT_CONNECTION: &str = "default";

/// Outcome tag of an audited request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditAction {
    Success,
    UserRejected,
    ExecutionError(String),
    ConfirmError(String),
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::UserRejected => write!(f, "USER_REJECTED"),
            Self::ExecutionError(detail) => write!(f, "EXECUTION_ERROR: {}", single_line(detail)),
            Self::ConfirmError(detail) => write!(f, "CONFIRM_ERROR: {}", single_line(detail)),
        }
    }
}

impl FromStr for AuditAction {
    type Err = SqlGateError;

    fn from_str(s: &str) -> Result<Self> {
        let detail = |rest: &str| rest.trim_start().to_string();
        match s {
            "SUCCESS" => Ok(Self::Success),
            "USER_REJECTED" => Ok(Self::UserRejected),
            _ => {
                if let Some(rest) = s.strip_prefix("EXECUTION_ERROR:") {
                    Ok(Self::ExecutionError(detail(rest)))
                } else if let Some(rest) = s.strip_prefix("CONFIRM_ERROR:") {
                    Ok(Self::ConfirmError(detail(rest)))
                } else {
                    Err(SqlGateError::audit(format!("Unknown audit action: {s}")))
                }
            }
        }
    }
}

/// Whether `line` is the sentinel behind zero or more `\` escapes.
fn is_sentinel_line(line: &str) -> bool {
    line.trim_start_matches('\\') == RECORD_SENTINEL
}

/// Prefixes SQL lines that could be read as the sentinel with one `\`.
fn escape_sql(sql: &str) -> String {
    sql.split('\n')
        .map(|line| {
            if is_sentinel_line(line) {
                format!("\\{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reverses `escape_sql`.
fn unescape_sql(sql: &str) -> String {
    sql.split('\n')
        .map(|line| match line.strip_prefix('\\') {
            Some(rest) if is_sentinel_line(rest) => rest,
            _ => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keeps field values on one line so the field block stays parseable.
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One audited execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub connection: String,
    pub matched_keywords: Vec<String>,
    pub approved: bool,
    pub action: AuditAction,
    /// The SQL exactly as submitted.
    pub sql: String,
}

impl AuditRecord {
    /// Creates a record stamped with the current local time.
    pub fn new(
        sql: impl Into<String>,
        matched_keywords: &[String],
        approved: bool,
        action: AuditAction,
        connection: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: DateTime::<FixedOffset>::from(Local::now()),
            connection: connection.into(),
            matched_keywords: matched_keywords.to_vec(),
            approved,
            action,
            sql: sql.into(),
        }
    }

    /// Renders the record in its on-disk form.
    pub fn render(&self) -> String {
        let connection = match single_line(&self.connection) {
            name if name.trim().is_empty() => DEFAULT_CONNECTION.to_string(),
            name => name,
        };
        let keywords = if self.matched_keywords.is_empty() {
            NO_KEYWORDS.to_string()
        } else {
            self.matched_keywords.join(",")
        };

        // Exactly one newline separates the SQL from the sentinel line.
        format!(
            "AUDIT_TIME={}\nAUDIT_CONNECTION={}\nAUDIT_KEYWORDS={}\nAUDIT_APPROVED={}\nAUDIT_ACTION={}\nAUDIT_SQL=\n{}\n{}\n",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            connection,
            keywords,
            self.approved,
            self.action,
            escape_sql(&self.sql),
            RECORD_SENTINEL,
        )
    }
}

/// Thread-safe audit writer over a size-rotated file.
///
/// Writes are serialized by a mutex and flushed to disk before `log` returns.
#[derive(Debug)]
pub struct AuditTrail {
    file: Mutex<RotatingFile>,
}

impl AuditTrail {
    /// Opens the trail, reusing the newest rotation file under `max_bytes`.
    pub fn open(base_path: &Path, max_bytes: u64) -> Result<Self> {
        let file = RotatingFile::open(base_path, max_bytes)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RotatingFile> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends one record.
    pub fn log(&self, record: &AuditRecord) -> Result<()> {
        self.lock().append(record.render().as_bytes())
    }

    /// The file currently written to.
    pub fn current_path(&self) -> PathBuf {
        self.lock().path().to_path_buf()
    }
}
