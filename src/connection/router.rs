//! Connection router for named database targets.
//!
//! Every configured name is either healthy (has a live client) or failed
//! (only its target is known). The set of names never changes after
//! construction; only the healthy/failed partition does.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::health::is_connection_error;
use crate::config::ConnectionTarget;
use crate::db::{Connector, DatabaseClient, QueryResult};
use crate::error::{Result, SqlGateError};
use crate::query::ScriptExecutor;
use crate::safety::StatementType;

/// Availability of one configured connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub available: bool,
}

#[derive(Default)]
struct RouterState {
    healthy: HashMap<String, Arc<dyn DatabaseClient>>,
    failed: HashSet<String>,
}

/// Routes execution requests to named connections and tracks their health.
pub struct ConnectionRouter {
    connector: Arc<dyn Connector>,
    targets: BTreeMap<String, ConnectionTarget>,
    state: RwLock<RouterState>,
}

impl ConnectionRouter {
    /// Connects to every target concurrently.
    ///
    /// Targets that cannot be reached start in the failed state and are
    /// retried by `list_with_status`.
    pub async fn connect(connector: Arc<dyn Connector>, targets: Vec<ConnectionTarget>) -> Result<Self> {
        if targets.is_empty() {
            return Err(SqlGateError::config("No database connections configured"));
        }

        let targets: BTreeMap<String, ConnectionTarget> = targets
            .into_iter()
            .map(|target| (target.name.clone(), target))
            .collect();

        let attempts = join_all(targets.values().map(|target| {
            let connector = Arc::clone(&connector);
            async move { (target.name.clone(), connector.connect(target).await) }
        }))
        .await;

        let mut state = RouterState::default();
        for (name, result) in attempts {
            match result {
                Ok(client) => {
                    info!("Connected to '{name}'");
                    state.healthy.insert(name, client);
                }
                Err(e) => {
                    warn!("Connection '{name}' unavailable at startup: {e}");
                    state.failed.insert(name);
                }
            }
        }

        Ok(Self {
            connector,
            targets,
            state: RwLock::new(state),
        })
    }

    /// Configured connection names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    /// Resolves a requested name against the configured set.
    ///
    /// An empty or missing name defaults to the only connection when exactly
    /// one is configured.
    pub fn resolve_name(&self, requested: Option<&str>) -> Result<String> {
        match requested.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) if self.targets.contains_key(name) => Ok(name.to_string()),
            Some(name) => Err(SqlGateError::UnknownConnection {
                name: name.to_string(),
            }),
            None if self.targets.len() == 1 => self
                .targets
                .keys()
                .next()
                .cloned()
                .ok_or(SqlGateError::ConnectionRequired),
            None => Err(SqlGateError::ConnectionRequired),
        }
    }

    /// Returns the live client for a healthy connection.
    pub async fn client(&self, name: &str) -> Result<Arc<dyn DatabaseClient>> {
        let state = self.state.read().await;
        if let Some(client) = state.healthy.get(name) {
            return Ok(Arc::clone(client));
        }
        if self.targets.contains_key(name) {
            Err(SqlGateError::ConnectionUnavailable {
                name: name.to_string(),
            })
        } else {
            Err(SqlGateError::UnknownConnection {
                name: name.to_string(),
            })
        }
    }

    /// Executes a script on the named (or only) connection.
    ///
    /// The lock is released before execution starts. A connection-class
    /// error demotes the connection before the error is returned.
    pub async fn execute(
        &self,
        name: Option<&str>,
        sql: &str,
        statement_type: &StatementType,
    ) -> Result<QueryResult> {
        let name = self.resolve_name(name)?;
        let client = self.client(&name).await?;

        let result = ScriptExecutor::new(client.as_ref())
            .run(sql, statement_type)
            .await;

        if let Err(e) = &result {
            if is_connection_error(e) {
                self.demote(&name, &client).await;
            }
        }
        result
    }

    /// Moves a connection to the failed state if `client` is still its live handle.
    async fn demote(&self, name: &str, client: &Arc<dyn DatabaseClient>) {
        let removed = {
            let mut state = self.state.write().await;
            let current = state
                .healthy
                .get(name)
                .is_some_and(|live| same_client(live, client));
            if current {
                state.failed.insert(name.to_string());
                state.healthy.remove(name)
            } else {
                None
            }
        };

        if let Some(client) = removed {
            warn!("Connection '{name}' marked unavailable after a connection error");
            if let Err(e) = client.close().await {
                debug!("Closing demoted connection '{name}' failed: {e}");
            }
        }
    }

    /// Tries to re-establish every failed connection once.
    ///
    /// Connection attempts run concurrently and without holding the lock.
    /// Returns the names that recovered.
    pub async fn retry_failed(&self) -> Vec<String> {
        let pending: Vec<ConnectionTarget> = {
            let state = self.state.read().await;
            state
                .failed
                .iter()
                .filter_map(|name| self.targets.get(name).cloned())
                .collect()
        };
        if pending.is_empty() {
            return Vec::new();
        }

        let attempts = join_all(pending.iter().map(|target| async move {
            (target.name.clone(), self.connector.reconnect(target).await)
        }))
        .await;

        let mut recovered = Vec::new();
        let mut redundant = Vec::new();
        {
            let mut state = self.state.write().await;
            for (name, result) in attempts {
                match result {
                    // Another caller may have recovered it meanwhile.
                    Ok(client) if !state.failed.contains(&name) => redundant.push(client),
                    Ok(client) => {
                        info!("Connection '{name}' re-established");
                        state.failed.remove(&name);
                        state.healthy.insert(name.clone(), client);
                        recovered.push(name);
                    }
                    Err(e) => debug!("Connection '{name}' still unavailable: {e}"),
                }
            }
        }

        for client in redundant {
            let _ = client.close().await;
        }
        recovered.sort();
        recovered
    }

    /// Retries failed connections, then reports every name with its availability.
    pub async fn list_with_status(&self) -> Vec<ConnectionStatus> {
        self.retry_failed().await;

        let state = self.state.read().await;
        self.targets
            .keys()
            .map(|name| ConnectionStatus {
                name: name.clone(),
                available: state.healthy.contains_key(name),
            })
            .collect()
    }

    /// Reports whether a connection is currently healthy.
    pub async fn is_available(&self, name: &str) -> bool {
        self.state.read().await.healthy.contains_key(name)
    }

    /// Closes every live connection; all names end up failed.
    pub async fn close_all(&self) {
        let clients: Vec<(String, Arc<dyn DatabaseClient>)> = {
            let mut state = self.state.write().await;
            let drained: Vec<_> = state.healthy.drain().collect();
            for (name, _) in &drained {
                state.failed.insert(name.clone());
            }
            drained
        };

        for (name, client) in clients {
            if let Err(e) = client.close().await {
                warn!("Failed to close connection '{name}': {e}");
            }
        }
    }
}

fn same_client(a: &Arc<dyn DatabaseClient>, b: &Arc<dyn DatabaseClient>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
