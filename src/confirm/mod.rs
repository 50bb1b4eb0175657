//! Human confirmation gate.
//!
//! Decides from a classification whether a human has to approve a SQL text,
//! asks through a pluggable `Confirmer`, and reports the decision. The gate
//! never holds router or audit locks while waiting for the human.

mod dialog;
mod mock;
mod reject;
mod terminal;

pub use dialog::DialogConfirmer;
pub use mock::MockConfirmer;
pub use reject::RejectConfirmer;
pub use terminal::TerminalConfirmer;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ConfirmMethod;
use crate::error::Result;
use crate::safety::{ClassificationResult, StatementType};

/// Everything the human sees for one confirmation round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub sql: String,
    pub matched_keywords: Vec<String>,
    pub statement_type: StatementType,
    pub is_ddl: bool,
    pub connection: String,
    /// Where the SQL came from, e.g. "File: deploy/001.sql".
    pub source_label: Option<String>,
}

impl ConfirmationRequest {
    /// Builds a request from a classification.
    pub fn from_classification(
        result: &ClassificationResult,
        connection: &str,
        source_label: Option<&str>,
    ) -> Self {
        Self {
            sql: result.original_text.clone(),
            matched_keywords: result.matched_keywords.clone(),
            statement_type: result.statement_type.clone(),
            is_ddl: result.is_ddl,
            connection: connection.to_string(),
            source_label: source_label.map(str::to_string),
        }
    }

    /// Window or prompt title.
    pub fn title(&self) -> String {
        if self.connection.is_empty() {
            "Dangerous SQL Detected".to_string()
        } else {
            format!("Confirm SQL - {}", self.connection)
        }
    }

    /// The full, untruncated confirmation text.
    pub fn render(&self) -> String {
        let mut text = String::new();

        if !self.connection.is_empty() {
            text.push_str(&format!("Database: {}\n\n", self.connection));
        }
        if !self.matched_keywords.is_empty() {
            text.push_str(&format!(
                "Matched Keywords: {}\n\n",
                self.matched_keywords.join(", ").to_uppercase()
            ));
        }
        text.push_str(&format!("Statement Type: {}\n\n", self.statement_type));
        if let Some(label) = &self.source_label {
            text.push_str(&format!("Source: {label}\n\n"));
        }
        text.push_str("SQL:\n");
        text.push_str(&self.sql);
        text.push_str("\n\n");
        if self.is_ddl {
            text.push_str("WARNING: DDL is auto-committed and cannot be rolled back!\n\n");
        }
        text.push_str("Do you want to continue?");
        text
    }

    /// One-line summary for diagnostic logs.
    pub fn summary(&self) -> String {
        let mut sql = self.sql.split_whitespace().collect::<Vec<_>>().join(" ");
        if sql.chars().count() > 100 {
            sql = sql.chars().take(100).collect::<String>() + "...";
        }
        format!(
            "connection=[{}] sql=[{}] keywords=[{}] type=[{}] ddl=[{}]",
            self.connection,
            sql,
            self.matched_keywords.join(","),
            self.statement_type,
            self.is_ddl
        )
    }
}

/// Asks a human to approve a SQL text.
///
/// `Ok(true)` approves, `Ok(false)` rejects; `Err` means the human could not
/// be asked (no display, dialog crashed, terminal missing).
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<bool>;
}

/// Returns the confirmer for a configured method.
pub fn confirmer_for(method: ConfirmMethod) -> Arc<dyn Confirmer> {
    match method {
        ConfirmMethod::Dialog => Arc::new(DialogConfirmer::new()),
        ConfirmMethod::Terminal => Arc::new(TerminalConfirmer::new()),
        ConfirmMethod::Reject => Arc::new(RejectConfirmer),
    }
}

/// Confirmation is required for dangerous SQL, and for DDL when configured.
pub fn requires_confirmation(result: &ClassificationResult, require_confirm_for_ddl: bool) -> bool {
    result.is_dangerous || (require_confirm_for_ddl && result.is_ddl)
}

/// Outcome of the confirmation gate for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// No confirmation needed; execution proceeds as implicitly approved.
    NotRequired,
    Approved,
    Rejected,
    /// The confirmer failed or the wait was cancelled.
    Failed(String),
}

/// Applies the confirmation policy and collects the human's answer.
pub struct ConfirmationGate {
    confirmer: Arc<dyn Confirmer>,
    require_confirm_for_ddl: bool,
    cancel: CancellationToken,
}

impl ConfirmationGate {
    pub fn new(confirmer: Arc<dyn Confirmer>, require_confirm_for_ddl: bool) -> Self {
        Self {
            confirmer,
            require_confirm_for_ddl,
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts pending confirmations when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn require_confirm_for_ddl(&self) -> bool {
        self.require_confirm_for_ddl
    }

    /// Runs the gate for one classified request.
    pub async fn check(
        &self,
        result: &ClassificationResult,
        connection: &str,
        source_label: Option<&str>,
    ) -> GateDecision {
        if !requires_confirmation(result, self.require_confirm_for_ddl) {
            return GateDecision::NotRequired;
        }

        let request = ConfirmationRequest::from_classification(result, connection, source_label);
        debug!("Requesting confirmation: {}", request.summary());

        let answer = tokio::select! {
            answer = self.confirmer.confirm(&request) => answer,
            _ = self.cancel.cancelled() => {
                warn!("Confirmation cancelled while waiting for the user");
                return GateDecision::Failed("confirmation cancelled".to_string());
            }
        };

        match answer {
            Ok(true) => GateDecision::Approved,
            Ok(false) => GateDecision::Rejected,
            Err(e) => {
                warn!("Confirmation failed: {e}");
                GateDecision::Failed(e.to_string())
            }
        }
    }
}
