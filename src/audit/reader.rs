//! Reading audit files back into records.

use std::path::Path;

use chrono::DateTime;

use super::{unescape_sql, AuditAction, AuditRecord, NO_KEYWORDS, RECORD_SENTINEL};
use crate::error::{Result, SqlGateError};

/// Reads every record from one audit file.
pub fn read_records(path: &Path) -> Result<Vec<AuditRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        SqlGateError::audit(format!("Failed to read audit file {}: {e}", path.display()))
    })?;
    parse_records(&content)
}

/// Parses records from audit file content.
///
/// Only a whole line equal to the sentinel ends a record. The single newline
/// the writer adds before the sentinel is removed from the SQL text.
pub fn parse_records(content: &str) -> Result<Vec<AuditRecord>> {
    let mut records = Vec::new();
    let mut chunk_start = 0;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line.strip_suffix('\n').unwrap_or(line) == RECORD_SENTINEL {
            let chunk = &content[chunk_start..line_start];
            if !chunk.trim().is_empty() {
                records.push(parse_record(chunk)?);
            }
            chunk_start = offset;
        }
    }

    let rest = &content[chunk_start..];
    if !rest.trim().is_empty() {
        records.push(parse_record(rest)?);
    }
    Ok(records)
}

fn parse_record(chunk: &str) -> Result<AuditRecord> {
    let (header, sql) = chunk
        .split_once("AUDIT_SQL=\n")
        .ok_or_else(|| malformed("missing AUDIT_SQL field"))?;
    let sql = sql.strip_suffix('\n').unwrap_or(sql);

    let mut timestamp = None;
    let mut connection = None;
    let mut keywords = None;
    let mut approved = None;
    let mut action = None;

    for line in header.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "AUDIT_TIME" => {
                timestamp = Some(
                    DateTime::parse_from_rfc3339(value)
                        .map_err(|e| malformed(&format!("bad AUDIT_TIME '{value}': {e}")))?,
                )
            }
            "AUDIT_CONNECTION" => connection = Some(value.to_string()),
            "AUDIT_KEYWORDS" => {
                keywords = Some(if value == NO_KEYWORDS {
                    Vec::new()
                } else {
                    value.split(',').map(str::to_string).collect()
                })
            }
            "AUDIT_APPROVED" => {
                approved = Some(
                    value
                        .parse::<bool>()
                        .map_err(|_| malformed(&format!("bad AUDIT_APPROVED '{value}'")))?,
                )
            }
            "AUDIT_ACTION" => action = Some(value.parse::<AuditAction>()?),
            _ => {}
        }
    }

    Ok(AuditRecord {
        timestamp: timestamp.ok_or_else(|| malformed("missing AUDIT_TIME"))?,
        connection: connection.ok_or_else(|| malformed("missing AUDIT_CONNECTION"))?,
        matched_keywords: keywords.ok_or_else(|| malformed("missing AUDIT_KEYWORDS"))?,
        approved: approved.ok_or_else(|| malformed("missing AUDIT_APPROVED"))?,
        action: action.ok_or_else(|| malformed("missing AUDIT_ACTION"))?,
        sql: unescape_sql(sql),
    })
}

fn malformed(detail: &str) -> SqlGateError {
    SqlGateError::audit(format!("Malformed audit record: {detail}"))
}
