//! Audit trail integration tests.
//!
//! Concurrent writers, rotation across several files, and reuse on restart.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use sqlgate::audit::{read_records, AuditAction, AuditRecord, AuditTrail, RECORD_SENTINEL};
use tempfile::TempDir;

fn audit_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("audit_") && n.ends_with(".log"))
        })
        .collect();
    files.sort();
    files
}

fn all_records(dir: &Path) -> Vec<AuditRecord> {
    audit_files(dir)
        .iter()
        .flat_map(|path| read_records(path).unwrap())
        .collect()
}

#[test]
fn test_concurrent_writers_rotate_without_loss() {
    let dir = TempDir::new().unwrap();
    let trail = Arc::new(AuditTrail::open(&dir.path().join("audit.log"), 2048).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|writer| {
            let trail = Arc::clone(&trail);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let sql = format!("UPDATE accounts\nSET balance = 0\nWHERE id = {writer}_{i}");
                    let record = AuditRecord::new(
                        sql,
                        &["update".to_string()],
                        true,
                        AuditAction::Success,
                        format!("db{writer}"),
                    );
                    trail.log(&record).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let files = audit_files(dir.path());
    assert!(files.len() > 1, "expected rotation, got {files:?}");
    for file in &files {
        assert!(std::fs::metadata(file).unwrap().len() < 2048);
    }

    let records = all_records(dir.path());
    assert_eq!(records.len(), 200);
    let unique: BTreeSet<String> = records.iter().map(|r| r.sql.clone()).collect();
    assert_eq!(unique.len(), 200);
    assert!(records.iter().all(|r| r.sql.starts_with("UPDATE accounts\nSET balance = 0\n")));
}

#[test]
fn test_restart_appends_to_newest_file() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("audit.log");

    let first_path = {
        let trail = AuditTrail::open(&base, 1024 * 1024).unwrap();
        trail
            .log(&AuditRecord::new("SELECT 1", &[], true, AuditAction::Success, "main"))
            .unwrap();
        trail.current_path()
    };

    let trail = AuditTrail::open(&base, 1024 * 1024).unwrap();
    assert_eq!(trail.current_path(), first_path);
    trail
        .log(&AuditRecord::new(
            "DROP TABLE t",
            &["drop".to_string()],
            false,
            AuditAction::UserRejected,
            "",
        ))
        .unwrap();

    let records = read_records(&first_path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].connection, "default");
    assert_eq!(records[1].matched_keywords, vec!["drop"]);
    assert_eq!(records[1].action, AuditAction::UserRejected);
}

#[test]
fn test_sql_containing_sentinel_like_text_stays_intact() {
    let dir = TempDir::new().unwrap();
    let trail = AuditTrail::open(&dir.path().join("audit.log"), 1024 * 1024).unwrap();
    let sql = format!("SELECT '{RECORD_SENTINEL}' FROM dual");

    trail
        .log(&AuditRecord::new(sql.clone(), &[], true, AuditAction::Success, "main"))
        .unwrap();

    let records = read_records(&trail.current_path()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sql, sql);
}

#[test]
fn test_error_detail_is_single_line() {
    let dir = TempDir::new().unwrap();
    let trail = AuditTrail::open(&dir.path().join("audit.log"), 1024 * 1024).unwrap();

    trail
        .log(&AuditRecord::new(
            "INSERT INTO t VALUES (1)",
            &[],
            true,
            AuditAction::ExecutionError("ORA-00001: unique constraint\n(APP.PK_T) violated".to_string()),
            "target",
        ))
        .unwrap();

    let content = std::fs::read_to_string(trail.current_path()).unwrap();
    assert!(content.contains(
        "AUDIT_ACTION=EXECUTION_ERROR: ORA-00001: unique constraint (APP.PK_T) violated\n"
    ));
    let records = read_records(&trail.current_path()).unwrap();
    assert_eq!(
        records[0].action,
        AuditAction::ExecutionError("ORA-00001: unique constraint (APP.PK_T) violated".to_string())
    );
}

#[test]
fn test_sql_is_read_back_verbatim() {
    let dir = TempDir::new().unwrap();
    let trail = AuditTrail::open(&dir.path().join("audit.log"), 1024 * 1024).unwrap();
    let statements = [
        "DELETE FROM t;\n".to_string(),
        format!("-- {RECORD_SENTINEL}\nSELECT 1 FROM dual"),
        format!("BEGIN\n  NULL;\nEND;\n{RECORD_SENTINEL}\n/\n"),
    ];

    for sql in &statements {
        trail
            .log(&AuditRecord::new(sql.clone(), &[], true, AuditAction::Success, "main"))
            .unwrap();
    }

    let records = read_records(&trail.current_path()).unwrap();
    let read: Vec<&str> = records.iter().map(|r| r.sql.as_str()).collect();
    assert_eq!(read, statements.iter().map(String::as_str).collect::<Vec<_>>());
}
