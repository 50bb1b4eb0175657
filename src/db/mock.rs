//! Mock database client for testing.
//!
//! Provides an in-memory implementation for headless testing and `--mock-db`
//! demos. Executed statements are recorded, and failures can be queued to
//! simulate database or connection errors.

use super::{ColumnInfo, Connector, DatabaseClient, QueryResult, Value};
use crate::config::ConnectionTarget;
use crate::error::{Result, SqlGateError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock database client that returns predefined results.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    executed: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<SqlGateError>>,
    rows_affected: u64,
    latency: Option<Duration>,
    closed: AtomicBool,
}

impl MockDatabaseClient {
    /// Creates a new mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports this many affected rows for every non-query statement.
    pub fn with_rows_affected(mut self, rows: u64) -> Self {
        self.rows_affected = rows;
        self
    }

    /// Sleeps this long inside every execution.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next execution fail with the given error.
    pub fn fail_next(&self, error: SqlGateError) {
        lock(&self.failures).push_back(error);
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn begin(&self, sql: &str) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.is_closed() {
            return Err(SqlGateError::connection("connection closed"));
        }
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        lock(&self.executed).push(sql.to_string());
        Ok(())
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.begin(sql).await?;

        Ok(QueryResult::with_data(
            vec![ColumnInfo::new("result", "text")],
            vec![vec![Value::String(format!("Mock result for: {sql}"))]],
        ))
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64> {
        self.begin(sql).await?;
        Ok(self.rows_affected)
    }

    async fn ping(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SqlGateError::connection("connection closed"));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out mock clients.
///
/// Each successful connect creates a fresh client and remembers it under the
/// target name so tests can inspect it or queue failures on it.
#[derive(Debug, Default)]
pub struct MockConnector {
    clients: Mutex<HashMap<String, Arc<MockDatabaseClient>>>,
    unreachable: Mutex<HashSet<String>>,
    attempts: Mutex<HashMap<String, usize>>,
    rows_affected: u64,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients created by this connector report this many affected rows per statement.
    pub fn with_rows_affected(mut self, rows: u64) -> Self {
        self.rows_affected = rows;
        self
    }

    /// Makes connection attempts for `name` fail (or succeed again).
    pub fn set_unreachable(&self, name: &str, unreachable: bool) {
        let mut names = lock(&self.unreachable);
        if unreachable {
            names.insert(name.to_string());
        } else {
            names.remove(name);
        }
    }

    /// The client most recently created for `name`.
    pub fn client(&self, name: &str) -> Option<Arc<MockDatabaseClient>> {
        lock(&self.clients).get(name).cloned()
    }

    /// Number of connection attempts made for `name`.
    pub fn attempts(&self, name: &str) -> usize {
        lock(&self.attempts).get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn DatabaseClient>> {
        *lock(&self.attempts).entry(target.name.clone()).or_insert(0) += 1;

        if lock(&self.unreachable).contains(&target.name) {
            return Err(SqlGateError::connection(format!(
                "'{}': no listener at {}",
                target.name,
                target.display_string()
            )));
        }

        let client = Arc::new(MockDatabaseClient::new().with_rows_affected(self.rows_affected));
        lock(&self.clients).insert(target.name.clone(), Arc::clone(&client));
        Ok(client)
    }
}
