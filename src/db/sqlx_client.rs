//! sqlx-backed database client.
//!
//! Provides `SqlxClient`, which implements `DatabaseClient` on top of an
//! `AnyPool`, so Postgres, MySQL/MariaDB and SQLite targets share one code path.

use super::{ColumnInfo, Connector, DatabaseBackend, DatabaseClient, QueryResult, Row, Value};
use crate::config::ConnectionTarget;
use crate::error::{Result, SqlGateError};
use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column as SqlxColumn, Connection, Row as SqlxRow, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// How long to wait for a pooled connection.
const ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Connect timeout for a single reconnect attempt.
const RECONNECT_TIMEOUT_SECS: u64 = 3;

/// Database client over a sqlx `AnyPool`.
#[derive(Debug)]
pub struct SqlxClient {
    pool: AnyPool,
}

impl SqlxClient {
    /// Connects to the target, retrying transient failures with exponential backoff.
    pub async fn connect(target: &ConnectionTarget) -> Result<Self> {
        Self::connect_with(
            target,
            MAX_RETRY_ATTEMPTS,
            Duration::from_secs(ACQUIRE_TIMEOUT_SECS),
        )
        .await
    }

    /// Makes one connection attempt with a short timeout.
    pub async fn connect_once(target: &ConnectionTarget) -> Result<Self> {
        Self::connect_with(target, 1, Duration::from_secs(RECONNECT_TIMEOUT_SECS)).await
    }

    async fn connect_with(
        target: &ConnectionTarget,
        max_attempts: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        sqlx::any::install_default_drivers();

        // Every in-memory SQLite connection is a separate database.
        let max_connections = match target.backend {
            DatabaseBackend::Sqlite => 1,
            _ => 5,
        };

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!(
                "Connection attempt {} of {} for '{}'",
                attempt, max_attempts, target.name
            );

            let result = AnyPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(&target.url)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to '{}' ({})", target.name, target.display_string());
                    let client = Self { pool };
                    client.ping().await?;
                    return Ok(client);
                }
                Err(e) if attempt < max_attempts && is_transient_error(&e) => {
                    warn!(
                        "Connection attempt {} for '{}' failed (transient error), retrying in {:?}",
                        attempt, target.name, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(e, target)),
            }
        }
    }
}

#[async_trait]
impl DatabaseClient for SqlxClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_execution_error)?;

        let columns: Vec<ColumnInfo> = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        let rows: Vec<Row> = rows.iter().map(convert_row).collect();

        Ok(QueryResult::with_data(columns, rows))
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(map_execution_error)?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_execution_error)?;
        conn.ping().await.map_err(map_execution_error)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Opens `SqlxClient`s for configured targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxConnector;

#[async_trait]
impl Connector for SqlxConnector {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn DatabaseClient>> {
        let client = SqlxClient::connect(target).await?;
        Ok(Arc::new(client))
    }

    async fn reconnect(&self, target: &ConnectionTarget) -> Result<Arc<dyn DatabaseClient>> {
        let client = SqlxClient::connect_once(target).await?;
        Ok(Arc::new(client))
    }
}

/// Converts a sqlx AnyRow to our Row type.
fn convert_row(row: &AnyRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Converts a single column value, trying the types the Any driver can decode.
fn convert_value(row: &AnyRow, index: usize) -> Value {
    if row.try_get_raw(index).map(|v| v.is_null()).unwrap_or(true) {
        return Value::Null;
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::Int(v);
    }
    if let Ok(v) = row.try_get::<i32, _>(index) {
        return Value::Int(v as i64);
    }
    if let Ok(v) = row.try_get::<i16, _>(index) {
        return Value::Int(v as i64);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Value::Float(v);
    }
    if let Ok(v) = row.try_get::<f32, _>(index) {
        return Value::Float(v as f64);
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Value::Bool(v);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Value::Bytes(v);
    }

    Value::Null
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("access denied")
        || error_str.contains("does not exist")
    {
        return false;
    }

    matches!(error, sqlx::Error::PoolTimedOut)
        || error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, target: &ConnectionTarget) -> SqlGateError {
    let location = url::Url::parse(&target.url)
        .ok()
        .and_then(|url| {
            url.host_str().map(|host| match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            })
        })
        .unwrap_or_else(|| target.name.clone());

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        SqlGateError::connection(format!(
            "Cannot connect to {location} ('{}'). Check that the server is running.",
            target.name
        ))
    } else if error_str.contains("authentication failed") || error_str.contains("access denied") {
        SqlGateError::connection(format!(
            "Authentication failed for connection '{}'. Check your credentials.",
            target.name
        ))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        SqlGateError::connection(format!(
            "Connection to {location} ('{}') timed out. The server may be overloaded or unreachable.",
            target.name
        ))
    } else {
        SqlGateError::connection(format!("'{}': {error}", target.name))
    }
}

/// Maps an error raised while running a statement.
///
/// Transport and pool failures become connection errors; everything the
/// database itself reports becomes a query error with its code when present.
fn map_execution_error(error: sqlx::Error) -> SqlGateError {
    match &error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => SqlGateError::connection(error.to_string()),
        _ => SqlGateError::query(format_query_error(&error)),
    }
}

/// Formats a query error with the database error code if available.
fn format_query_error(error: &sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => match db_error.code() {
            Some(code) => format!("ERROR {code}: {}", db_error.message()),
            None => format!("ERROR: {}", db_error.message()),
        },
        None => error.to_string(),
    }
}
