//! Request orchestration: resolve, classify, confirm, execute, audit.
//!
//! `SqlGateway` owns one instance of each core component and drives a single
//! SQL request through them. Every terminal outcome after name resolution
//! writes exactly one audit record before it is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::audit::{AuditAction, AuditRecord, AuditTrail};
use crate::config::Config;
use crate::confirm::{ConfirmationGate, Confirmer, GateDecision};
use crate::connection::{ConnectionRouter, ConnectionStatus};
use crate::db::{Connector, QueryResult};
use crate::error::{Result, SqlGateError};
use crate::safety::script::strip_trailing_slash_lines;
use crate::safety::SqlClassifier;

/// One SQL text to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlRequest {
    pub sql: String,
    /// Target connection; may be omitted when only one is configured.
    pub connection: Option<String>,
    /// Where the SQL came from, shown to the human when confirming.
    pub source_label: Option<String>,
}

impl SqlRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    pub fn on(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }
}

/// Terminal outcome of a request that reached classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Executed(QueryResult),
    /// The human declined.
    Rejected { matched_keywords: Vec<String> },
    /// The human could not be asked.
    ConfirmationFailed { message: String },
    /// The database (or the router) reported an error.
    ExecutionFailed { message: String },
}

/// Drives SQL requests through the safety pipeline.
pub struct SqlGateway {
    router: Arc<ConnectionRouter>,
    classifier: SqlClassifier,
    gate: ConfirmationGate,
    audit: Option<AuditTrail>,
    verbose: bool,
}

impl SqlGateway {
    pub fn new(
        router: Arc<ConnectionRouter>,
        classifier: SqlClassifier,
        gate: ConfirmationGate,
        audit: Option<AuditTrail>,
    ) -> Self {
        Self {
            router,
            classifier,
            gate,
            audit,
            verbose: false,
        }
    }

    /// Logs one line per executed request.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Assembles a gateway from configuration.
    ///
    /// Unreachable connections do not fail startup; they begin in the failed
    /// state. An audit file that cannot be opened does.
    pub async fn from_config(
        config: &Config,
        connector: Arc<dyn Connector>,
        confirmer: Arc<dyn Confirmer>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let router = ConnectionRouter::connect(connector, config.targets()?).await?;
        let classifier = SqlClassifier::new(config.danger_keywords());
        let gate = ConfirmationGate::new(confirmer, config.security.require_confirm_for_ddl)
            .with_cancellation(cancel);

        let audit = if config.logging.audit_log {
            let path = config.audit_log_path();
            let trail = AuditTrail::open(&path, config.logging.max_file_bytes)?;
            info!("Audit trail: {}", trail.current_path().display());
            Some(trail)
        } else {
            None
        };

        Ok(Self::new(Arc::new(router), classifier, gate, audit)
            .with_verbose(config.logging.verbose_logging))
    }

    pub fn router(&self) -> &Arc<ConnectionRouter> {
        &self.router
    }

    pub fn classifier(&self) -> &SqlClassifier {
        &self.classifier
    }

    /// The active audit file, if auditing is enabled.
    pub fn audit_path(&self) -> Option<PathBuf> {
        self.audit.as_ref().map(AuditTrail::current_path)
    }

    /// Runs one SQL request.
    ///
    /// Unknown or ambiguous connection names are returned as `Err` before
    /// classification and are not audited.
    pub async fn execute_sql(&self, request: SqlRequest) -> Result<ExecutionOutcome> {
        let connection = self.router.resolve_name(request.connection.as_deref())?;
        let source_label = request.source_label.as_deref();
        let sql = request.sql;

        let classification = self.classifier.classify(&sql);
        let keywords = &classification.matched_keywords;
        debug!(
            "Classified as {} (dangerous={}, ddl={}) on '{connection}'",
            classification.statement_type, classification.is_dangerous, classification.is_ddl
        );

        match self.gate.check(&classification, &connection, source_label).await {
            GateDecision::Rejected => {
                self.audit(&sql, keywords, false, AuditAction::UserRejected, &connection);
                return Ok(ExecutionOutcome::Rejected {
                    matched_keywords: keywords.clone(),
                });
            }
            GateDecision::Failed(message) => {
                self.audit(
                    &sql,
                    keywords,
                    false,
                    AuditAction::ConfirmError(message.clone()),
                    &connection,
                );
                return Ok(ExecutionOutcome::ConfirmationFailed { message });
            }
            GateDecision::NotRequired | GateDecision::Approved => {}
        }

        let statement_type = &classification.statement_type;
        match self.router.execute(Some(&connection), &sql, statement_type).await {
            Ok(result) => {
                self.audit(&sql, keywords, true, AuditAction::Success, &connection);
                if self.verbose {
                    match source_label {
                        Some(label) => info!(
                            "Executed {statement_type} on '{connection}' ({label})"
                        ),
                        None => info!("Executed {statement_type} on '{connection}'"),
                    }
                }
                Ok(ExecutionOutcome::Executed(result))
            }
            Err(e) => {
                let message = e.to_string();
                self.audit(
                    &sql,
                    keywords,
                    true,
                    AuditAction::ExecutionError(message.clone()),
                    &connection,
                );
                Ok(ExecutionOutcome::ExecutionFailed { message })
            }
        }
    }

    /// Reads a SQL file and runs its contents as one request.
    ///
    /// Relative paths resolve against the working directory. Trailing lines
    /// holding only `/` are dropped before analysis.
    pub async fn execute_sql_file(
        &self,
        path: &Path,
        connection: Option<&str>,
    ) -> Result<ExecutionOutcome> {
        let path = resolve_file_path(path)?;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SqlGateError::query(format!("Cannot read file {}: {e}", path.display())))?;
        if contents.is_empty() {
            return Err(SqlGateError::query(format!("File is empty: {}", path.display())));
        }

        let request = SqlRequest {
            sql: strip_trailing_slash_lines(&contents).to_string(),
            connection: connection.map(str::to_string),
            source_label: Some(format!("File: {}", path.display())),
        };
        self.execute_sql(request).await
    }

    /// Lists every configured connection, retrying failed ones first.
    pub async fn list_connections(&self) -> Vec<ConnectionStatus> {
        self.router.list_with_status().await
    }

    /// Closes every live connection.
    pub async fn shutdown(&self) {
        self.router.close_all().await;
    }

    fn audit(
        &self,
        sql: &str,
        keywords: &[String],
        approved: bool,
        action: AuditAction,
        connection: &str,
    ) {
        let Some(trail) = &self.audit else {
            return;
        };
        let record = AuditRecord::new(sql, keywords, approved, action, connection);
        if let Err(e) = trail.log(&record) {
            error!("Failed to write audit record: {e}");
        }
    }
}

fn resolve_file_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(SqlGateError::query("file_path cannot be empty"));
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| SqlGateError::internal(format!("Cannot determine working directory: {e}")))?;
    Ok(cwd.join(path))
}
