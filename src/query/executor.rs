//! Script execution against a single database client.
//!
//! Provides isolated execution that can be tested independently of the
//! gateway: the script is split into statements, each is sent to the
//! client in order, and the results are folded into one `QueryResult`.

use std::time::Instant;

use crate::db::{DatabaseClient, QueryResult};
use crate::error::{Result, SqlGateError};
use crate::safety::script::prepare_statements;
use crate::safety::StatementType;
use tracing::debug;

/// Warning attached to results of schema-altering statements.
pub const DDL_WARNING: &str = "DDL statements are auto-committed";

/// Runs prepared scripts on one database client.
pub struct ScriptExecutor<'a> {
    db: &'a dyn DatabaseClient,
}

impl<'a> ScriptExecutor<'a> {
    /// Creates a new executor.
    pub fn new(db: &'a dyn DatabaseClient) -> Self {
        Self { db }
    }

    /// Executes every statement of `sql` in order.
    ///
    /// Queries replace the reported result set (the last one wins); other
    /// statements add to `rows_affected`. The first failing statement aborts
    /// the script and its error is returned unchanged.
    pub async fn run(&self, sql: &str, statement_type: &StatementType) -> Result<QueryResult> {
        let start = Instant::now();
        let statements = prepare_statements(sql);
        if statements.is_empty() {
            return Err(SqlGateError::query("No executable SQL statement found"));
        }

        let mut result = QueryResult::new();
        for (index, statement) in statements.iter().enumerate() {
            debug!(
                "Executing statement {} of {} (query: {})",
                index + 1,
                statements.len(),
                statement.is_query
            );
            if statement.is_query {
                let rows = self.db.execute_query(&statement.sql).await?;
                result.columns = rows.columns;
                result.rows = rows.rows;
            } else {
                result.rows_affected += self.db.execute_statement(&statement.sql).await?;
            }
        }

        result.success = true;
        result.statement_type = statement_type.to_string();
        result.execution_time_ms = start.elapsed().as_millis() as u64;
        if statement_type.is_ddl() {
            result.warning = Some(DDL_WARNING.to_string());
        }

        Ok(result)
    }
}
