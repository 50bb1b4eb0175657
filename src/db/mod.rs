//! Database abstraction layer for sqlgate.
//!
//! Provides a trait-based interface for database operations, allowing
//! different database backends (and the in-memory mock) to be used
//! interchangeably behind the connection router.

mod mock;
mod sqlx_client;
mod types;

pub use mock::{MockConnector, MockDatabaseClient};
pub use sqlx_client::{SqlxClient, SqlxConnector};
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::ConnectionTarget;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    Mysql,
    Sqlite,
}

impl DatabaseBackend {
    /// Maps a connection URL scheme to its backend.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::Mysql),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Trait defining the interface for database clients.
///
/// All database operations are async and return Results with SqlGateError.
/// Connection-level failures are reported as `SqlGateError::Connection` so
/// the router can demote the connection.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes a statement that returns rows.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Executes a statement that does not return rows, returning the affected row count.
    async fn execute_statement(&self, sql: &str) -> Result<u64>;

    /// Verifies the connection is alive.
    async fn ping(&self) -> Result<()>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}

/// Opens database clients for configured targets.
///
/// Used by the router for the initial connection and for retries.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a client at startup. Implementations may retry transient failures.
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn DatabaseClient>>;

    /// Makes a single attempt to re-open a failed target, without backoff.
    async fn reconnect(&self, target: &ConnectionTarget) -> Result<Arc<dyn DatabaseClient>> {
        self.connect(target).await
    }
}
