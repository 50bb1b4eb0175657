//! Gateway integration tests.
//!
//! Drives requests through classification, confirmation, execution and audit
//! against real SQLite files.

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use sqlgate::audit::{read_records, AuditAction, AuditTrail};
use sqlgate::config::ConnectionTarget;
use sqlgate::confirm::{ConfirmationGate, ConfirmationRequest, Confirmer, MockConfirmer};
use sqlgate::connection::ConnectionRouter;
use sqlgate::db::{SqlxConnector, Value};
use sqlgate::error::{Result, SqlGateError};
use sqlgate::gateway::{ExecutionOutcome, SqlGateway, SqlRequest};
use sqlgate::query::DDL_WARNING;
use sqlgate::safety::{DangerKeywordConfig, MatchMode, SqlClassifier};
use tempfile::TempDir;

/// Answers by looking at the SQL: `-- reject` declines, `-- broken` fails.
struct ScriptedConfirmer;

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<bool> {
        if request.sql.contains("-- broken") {
            return Err(SqlGateError::confirmation("dialog process crashed"));
        }
        Ok(!request.sql.contains("-- reject"))
    }
}

fn sqlite_target(dir: &TempDir, name: &str) -> ConnectionTarget {
    let path = dir.path().join(format!("{name}.db"));
    ConnectionTarget::parse(name, &format!("sqlite://{}?mode=rwc", path.display())).unwrap()
}

async fn sqlite_gateway(
    dir: &TempDir,
    names: &[&str],
    confirmer: Arc<dyn Confirmer>,
    match_mode: MatchMode,
) -> SqlGateway {
    let targets = names.iter().map(|name| sqlite_target(dir, name)).collect();
    let router = ConnectionRouter::connect(Arc::new(SqlxConnector), targets)
        .await
        .unwrap();
    let classifier = SqlClassifier::new(DangerKeywordConfig::new(
        ["truncate", "drop", "delete"],
        match_mode,
    ));
    let audit = AuditTrail::open(&dir.path().join("audit.log"), 10 * 1024 * 1024).unwrap();
    SqlGateway::new(
        Arc::new(router),
        classifier,
        ConfirmationGate::new(confirmer, true),
        Some(audit),
    )
}

fn executed(outcome: ExecutionOutcome) -> sqlgate::db::QueryResult {
    match outcome {
        ExecutionOutcome::Executed(result) => result,
        other => panic!("expected execution, got {other:?}"),
    }
}

#[tokio::test]
async fn test_script_runs_against_sqlite() {
    let dir = TempDir::new().unwrap();
    let gateway = sqlite_gateway(&dir, &["local"], Arc::new(ScriptedConfirmer), MatchMode::Tokens).await;

    let script = "CREATE TABLE users (id INTEGER, name TEXT);\n\
                  INSERT INTO users VALUES (1, 'alice');\n\
                  INSERT INTO users VALUES (2, 'bob');\n";
    let result = executed(gateway.execute_sql(SqlRequest::new(script)).await.unwrap());
    assert_eq!(result.statement_type, "CREATE");
    assert_eq!(result.rows_affected, 2);
    assert_eq!(result.warning.as_deref(), Some(DDL_WARNING));

    let result = executed(
        gateway
            .execute_sql(SqlRequest::new("SELECT id, name FROM users ORDER BY id"))
            .await
            .unwrap(),
    );
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.rows[1], vec![Value::Int(2), Value::String("bob".to_string())]);
    assert_eq!(result.warning, None);
}

#[tokio::test]
async fn test_every_terminal_outcome_is_audited_once() {
    let dir = TempDir::new().unwrap();
    let gateway = sqlite_gateway(&dir, &["local"], Arc::new(ScriptedConfirmer), MatchMode::Tokens).await;

    executed(
        gateway
            .execute_sql(SqlRequest::new("CREATE TABLE t (id INTEGER)"))
            .await
            .unwrap(),
    );

    let failed = gateway
        .execute_sql(SqlRequest::new("DELETE FROM missing_table"))
        .await
        .unwrap();
    assert!(matches!(failed, ExecutionOutcome::ExecutionFailed { ref message } if message.contains("missing_table")));

    let rejected = gateway
        .execute_sql(SqlRequest::new("DROP TABLE t -- reject"))
        .await
        .unwrap();
    assert_eq!(
        rejected,
        ExecutionOutcome::Rejected {
            matched_keywords: vec!["drop".to_string()]
        }
    );

    let broken = gateway
        .execute_sql(SqlRequest::new("TRUNCATE TABLE t -- broken"))
        .await
        .unwrap();
    assert!(matches!(broken, ExecutionOutcome::ConfirmationFailed { .. }));

    let records = read_records(&gateway.audit_path().unwrap()).unwrap();
    let summary: Vec<(bool, String, String)> = records
        .iter()
        .map(|r| (r.approved, r.action.to_string(), r.sql.clone()))
        .collect();
    assert_eq!(summary.len(), 4);
    assert_eq!(summary[0], (true, "SUCCESS".to_string(), "CREATE TABLE t (id INTEGER)".to_string()));
    assert!(summary[1].0);
    assert!(summary[1].1.starts_with("EXECUTION_ERROR: "));
    assert_eq!(summary[1].2, "DELETE FROM missing_table");
    assert_eq!(summary[2], (false, "USER_REJECTED".to_string(), "DROP TABLE t -- reject".to_string()));
    assert!(!summary[3].0);
    assert!(matches!(records[3].action, AuditAction::ConfirmError(ref m) if m.contains("crashed")));
    assert!(records.iter().all(|r| r.connection == "local"));

    // The rejected DROP never ran.
    let result = executed(
        gateway
            .execute_sql(SqlRequest::new("SELECT COUNT(*) FROM t"))
            .await
            .unwrap(),
    );
    assert_eq!(result.rows, vec![vec![Value::Int(0)]]);
}

#[tokio::test]
async fn test_keyword_in_literal_depends_on_match_mode() {
    let sql = "SELECT 'drop table' AS note";

    let dir = TempDir::new().unwrap();
    let confirmer = Arc::new(MockConfirmer::approving());
    let gateway = sqlite_gateway(&dir, &["local"], confirmer.clone(), MatchMode::Tokens).await;
    executed(gateway.execute_sql(SqlRequest::new(sql)).await.unwrap());
    assert!(confirmer.requests().is_empty());

    let dir = TempDir::new().unwrap();
    let confirmer = Arc::new(MockConfirmer::approving());
    let gateway = sqlite_gateway(&dir, &["local"], confirmer.clone(), MatchMode::WholeText).await;
    let result = executed(gateway.execute_sql(SqlRequest::new(sql)).await.unwrap());
    assert_eq!(confirmer.requests().len(), 1);
    assert_eq!(confirmer.requests()[0].matched_keywords, vec!["drop"]);
    assert_eq!(result.rows, vec![vec![Value::String("drop table".to_string())]]);
}

#[tokio::test]
async fn test_requests_route_to_named_database() {
    let dir = TempDir::new().unwrap();
    let gateway = sqlite_gateway(
        &dir,
        &["source", "target"],
        Arc::new(MockConfirmer::approving()),
        MatchMode::Tokens,
    )
    .await;

    gateway
        .execute_sql(SqlRequest::new("CREATE TABLE only_in_source (id INTEGER)").on("source"))
        .await
        .unwrap();

    let outcome = gateway
        .execute_sql(SqlRequest::new("SELECT * FROM only_in_source").on("target"))
        .await
        .unwrap();
    assert!(matches!(outcome, ExecutionOutcome::ExecutionFailed { .. }));

    let outcome = gateway
        .execute_sql(SqlRequest::new("SELECT * FROM only_in_source").on("source"))
        .await
        .unwrap();
    assert!(matches!(outcome, ExecutionOutcome::Executed(_)));

    let err = gateway
        .execute_sql(SqlRequest::new("SELECT 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlGateError::ConnectionRequired));
}

#[tokio::test]
async fn test_sql_file_with_trailing_slash() {
    let dir = TempDir::new().unwrap();
    let confirmer = Arc::new(MockConfirmer::approving());
    let gateway = sqlite_gateway(&dir, &["local"], confirmer.clone(), MatchMode::Tokens).await;

    let path = dir.path().join("schema.sql");
    std::fs::write(
        &path,
        "CREATE TABLE items (id INTEGER);\r\nINSERT INTO items VALUES (7);\r\n/\r\n",
    )
    .unwrap();

    let result = executed(gateway.execute_sql_file(&path, Some("local")).await.unwrap());
    assert_eq!(result.rows_affected, 1);

    let requests = confirmer.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].is_ddl);
    assert!(!requests[0].sql.contains('/'));
    assert!(requests[0].render().contains("Source: File: "));
}
