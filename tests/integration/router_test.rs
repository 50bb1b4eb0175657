//! Connection router integration tests.
//!
//! Exercises health transitions and lock discipline under concurrent use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use pretty_assertions::assert_eq;
use sqlgate::config::ConnectionTarget;
use sqlgate::connection::{ConnectionRouter, ConnectionStatus};
use sqlgate::db::{Connector, DatabaseClient, MockDatabaseClient};
use sqlgate::error::{Result, SqlGateError};
use sqlgate::safety::StatementType;

/// Hands out mock clients with a per-name latency and remembers them.
#[derive(Default)]
struct SlowConnector {
    latency: HashMap<String, Duration>,
    down: Mutex<Vec<String>>,
    clients: Mutex<HashMap<String, Arc<MockDatabaseClient>>>,
}

impl SlowConnector {
    fn with_latency(mut self, name: &str, latency: Duration) -> Self {
        self.latency.insert(name.to_string(), latency);
        self
    }

    fn set_down(&self, name: &str, down: bool) {
        let mut list = self.down.lock().unwrap();
        list.retain(|n| n != name);
        if down {
            list.push(name.to_string());
        }
    }

    fn client(&self, name: &str) -> Arc<MockDatabaseClient> {
        self.clients.lock().unwrap()[name].clone()
    }
}

#[async_trait]
impl Connector for SlowConnector {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn DatabaseClient>> {
        if self.down.lock().unwrap().contains(&target.name) {
            return Err(SqlGateError::connection("connection refused"));
        }
        let mut client = MockDatabaseClient::new();
        if let Some(latency) = self.latency.get(&target.name) {
            client = client.with_latency(*latency);
        }
        let client = Arc::new(client);
        self.clients
            .lock()
            .unwrap()
            .insert(target.name.clone(), client.clone());
        Ok(client)
    }
}

fn targets(names: &[&str]) -> Vec<ConnectionTarget> {
    names
        .iter()
        .map(|name| ConnectionTarget::parse(name, &format!("postgres://app@{name}/app")).unwrap())
        .collect()
}

#[tokio::test]
async fn test_slow_query_does_not_block_listing() {
    let connector =
        Arc::new(SlowConnector::default().with_latency("slow", Duration::from_millis(500)));
    let router = Arc::new(
        ConnectionRouter::connect(connector.clone(), targets(&["fast", "slow"]))
            .await
            .unwrap(),
    );

    let running = {
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            router
                .execute(Some("slow"), "SELECT pg_sleep(1)", &StatementType::Select)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let statuses = tokio::time::timeout(Duration::from_millis(200), router.list_with_status())
        .await
        .expect("listing waited for the running query");
    assert_eq!(statuses.len(), 2);

    let fast = tokio::time::timeout(
        Duration::from_millis(200),
        router.execute(Some("fast"), "SELECT 1", &StatementType::Select),
    )
    .await
    .expect("fast connection waited for the slow one");
    assert!(fast.is_ok());

    assert!(running.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_concurrent_requests_all_complete() {
    let connector = Arc::new(SlowConnector::default().with_latency("a", Duration::from_millis(10)));
    let router = Arc::new(
        ConnectionRouter::connect(connector.clone(), targets(&["a", "b"]))
            .await
            .unwrap(),
    );

    let results = join_all((0..20).map(|i| {
        let router = Arc::clone(&router);
        async move {
            let name = if i % 2 == 0 { "a" } else { "b" };
            router
                .execute(Some(name), &format!("UPDATE t SET n = {i}"), &StatementType::Update)
                .await
        }
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(connector.client("a").executed().len(), 10);
    assert_eq!(connector.client("b").executed().len(), 10);
}

#[tokio::test]
async fn test_outage_demotes_and_listing_recovers() {
    let connector = Arc::new(SlowConnector::default());
    let router = ConnectionRouter::connect(connector.clone(), targets(&["source", "target"]))
        .await
        .unwrap();

    let lost = connector.client("target");
    lost.fail_next(SqlGateError::query("write tcp 10.0.0.2:5432: broken pipe"));
    connector.set_down("target", true);

    let err = router
        .execute(Some("target"), "INSERT INTO t VALUES (1)", &StatementType::Insert)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("broken pipe"));
    assert!(lost.is_closed());

    let err = router
        .execute(Some("target"), "SELECT 1", &StatementType::Select)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlGateError::ConnectionUnavailable { ref name } if name == "target"));

    // Still down: listing retries and reports it unavailable.
    assert_eq!(
        router.list_with_status().await,
        vec![
            ConnectionStatus { name: "source".to_string(), available: true },
            ConnectionStatus { name: "target".to_string(), available: false },
        ]
    );

    connector.set_down("target", false);
    assert!(router.list_with_status().await.iter().all(|s| s.available));

    router
        .execute(Some("target"), "SELECT 1", &StatementType::Select)
        .await
        .unwrap();
    assert_eq!(connector.client("target").executed(), vec!["SELECT 1"]);
}

#[tokio::test]
async fn test_constraint_violation_keeps_connection() {
    let connector = Arc::new(SlowConnector::default());
    let router = ConnectionRouter::connect(connector.clone(), targets(&["main"]))
        .await
        .unwrap();

    connector
        .client("main")
        .fail_next(SqlGateError::query("duplicate key value violates unique constraint"));
    assert!(router
        .execute(None, "INSERT INTO t VALUES (1)", &StatementType::Insert)
        .await
        .is_err());

    assert!(router.is_available("main").await);
    assert!(!connector.client("main").is_closed());
}

/// Retries with a long backoff on `connect`, but makes one quick attempt on `reconnect`.
#[derive(Default)]
struct BackoffConnector {
    down: Mutex<bool>,
    reconnects: Mutex<usize>,
    client: Mutex<Option<Arc<MockDatabaseClient>>>,
}

#[async_trait]
impl Connector for BackoffConnector {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Arc<dyn DatabaseClient>> {
        if *self.down.lock().unwrap() {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return Err(SqlGateError::connection(format!("{}: connection refused", target.name)));
        }
        let client = Arc::new(MockDatabaseClient::new());
        *self.client.lock().unwrap() = Some(client.clone());
        Ok(client)
    }

    async fn reconnect(&self, target: &ConnectionTarget) -> Result<Arc<dyn DatabaseClient>> {
        *self.reconnects.lock().unwrap() += 1;
        if *self.down.lock().unwrap() {
            return Err(SqlGateError::connection(format!("{}: connection refused", target.name)));
        }
        Ok(Arc::new(MockDatabaseClient::new()))
    }
}

#[tokio::test]
async fn test_listing_makes_one_quick_attempt_per_failed_name() {
    let connector = Arc::new(BackoffConnector::default());
    let router = ConnectionRouter::connect(connector.clone(), targets(&["main"]))
        .await
        .unwrap();

    let client = connector.client.lock().unwrap().clone().unwrap();
    client.fail_next(SqlGateError::connection("connection reset by peer"));
    *connector.down.lock().unwrap() = true;
    assert!(router
        .execute(Some("main"), "SELECT 1", &StatementType::Select)
        .await
        .is_err());

    let statuses = tokio::time::timeout(Duration::from_millis(500), router.list_with_status())
        .await
        .expect("listing waited on a failing retry");
    assert_eq!(
        statuses,
        vec![ConnectionStatus { name: "main".to_string(), available: false }]
    );
    assert_eq!(*connector.reconnects.lock().unwrap(), 1);

    *connector.down.lock().unwrap() = false;
    assert!(router.list_with_status().await[0].available);
    assert_eq!(*connector.reconnects.lock().unwrap(), 2);
}
