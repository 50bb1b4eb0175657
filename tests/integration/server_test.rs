//! JSON-RPC session tests over an in-memory pipe.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sqlgate::audit::{read_records, AuditAction, AuditTrail};
use sqlgate::config::ConnectionTarget;
use sqlgate::confirm::{ConfirmationGate, MockConfirmer};
use sqlgate::connection::ConnectionRouter;
use sqlgate::db::MockConnector;
use sqlgate::gateway::SqlGateway;
use sqlgate::safety::{DangerKeywordConfig, MatchMode, SqlClassifier};
use sqlgate::server::McpServer;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Session {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
    cancel: CancellationToken,
    server: JoinHandle<sqlgate::error::Result<()>>,
    gateway: Arc<SqlGateway>,
    connector: Arc<MockConnector>,
    _dir: TempDir,
}

impl Session {
    async fn start(names: &[&str], confirmer: MockConfirmer) -> Self {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let connector = Arc::new(MockConnector::new());
        let targets = names
            .iter()
            .map(|name| ConnectionTarget::parse(name, &format!("postgres://app@{name}/app")).unwrap())
            .collect();
        let router = ConnectionRouter::connect(connector.clone(), targets)
            .await
            .unwrap();
        let gateway = Arc::new(SqlGateway::new(
            Arc::new(router),
            SqlClassifier::new(DangerKeywordConfig::new(["drop", "delete"], MatchMode::WholeText)),
            ConfirmationGate::new(Arc::new(confirmer), true).with_cancellation(cancel.clone()),
            Some(AuditTrail::open(&dir.path().join("audit.log"), 1024 * 1024).unwrap()),
        ));

        let (client_in, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, client_out) = tokio::io::duplex(64 * 1024);
        let server = {
            let server = McpServer::new(Arc::clone(&gateway));
            let cancel = cancel.clone();
            tokio::spawn(async move { server.run(BufReader::new(server_in), server_out, cancel).await })
        };

        Self {
            input: client_in,
            output: BufReader::new(client_out).lines(),
            cancel,
            server,
            gateway,
            connector,
            _dir: dir,
        }
    }

    async fn send(&mut self, message: Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.input.write_all(line.as_bytes()).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.output.next_line())
            .await
            .expect("no response within 5s")
            .unwrap()
            .expect("server closed the stream");
        serde_json::from_str(&line).unwrap()
    }

    async fn call(&mut self, id: u64, tool: &str, arguments: Value) -> Value {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": tool, "arguments": arguments}
        }))
        .await;
        let response = self.recv().await;
        assert_eq!(response["id"], id);
        response
    }
}

fn tool_text(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap()
}

#[tokio::test]
async fn test_handshake_and_tool_listing() {
    let mut session = Session::start(&["main"], MockConfirmer::approving()).await;

    session
        .send(json!({"jsonrpc": "2.0", "id": 0, "method": "initialize", "params": {}}))
        .await;
    let response = session.recv().await;
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");

    session
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    session
        .send(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .await;

    // The notification produced nothing, so the next line answers tools/list.
    let response = session.recv().await;
    assert_eq!(response["id"], 1);
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["execute_sql", "execute_sql_file", "list_connections"]);

    drop(session.input);
    session.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_execute_sql_round_trip() {
    let mut session = Session::start(&["main"], MockConfirmer::approving()).await;

    let response = session
        .call(1, "execute_sql", json!({"sql": "SELECT name FROM users"}))
        .await;
    assert_eq!(response["result"]["isError"], false);
    let result: Value = serde_json::from_str(tool_text(&response)).unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["statement_type"], "SELECT");
    assert_eq!(result["rows"], json!([["Mock result for: SELECT name FROM users"]]));
}

#[tokio::test]
async fn test_rejection_is_rpc_error_and_audited() {
    let mut session = Session::start(&["main"], MockConfirmer::rejecting()).await;

    let response = session
        .call(2, "execute_sql", json!({"sql": "DROP TABLE users", "connection": "main"}))
        .await;
    assert_eq!(
        response["error"],
        json!({
            "code": -32000,
            "message": "Execution cancelled by user",
            "data": {"code": "USER_REJECTED", "matched_keywords": ["drop"]}
        })
    );
    assert!(session.connector.client("main").unwrap().executed().is_empty());

    let records = read_records(&session.gateway.audit_path().unwrap()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, AuditAction::UserRejected);
}

#[tokio::test]
async fn test_tool_errors() {
    let mut session = Session::start(&["a", "b"], MockConfirmer::approving()).await;

    let response = session.call(1, "execute_sql", json!({"sql": "SELECT 1"})).await;
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("connection name is required"));

    let response = session
        .call(2, "execute_sql", json!({"sql": "SELECT 1", "connection": "c"}))
        .await;
    assert!(tool_text(&response).contains("unknown connection \"c\""));

    let response = session.call(3, "execute_sql", json!({})).await;
    assert_eq!(tool_text(&response), "Missing required parameter: sql");

    let response = session
        .call(4, "execute_sql_file", json!({"file_path": "/nonexistent/x.sql", "connection": "a"}))
        .await;
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("Cannot read file"));

    let response = session.call(5, "drop_everything", json!({})).await;
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["error"]["message"], "Unknown tool: drop_everything");

    session
        .connector
        .client("a")
        .unwrap()
        .fail_next(sqlgate::error::SqlGateError::query("relation \"x\" does not exist"));
    let response = session
        .call(6, "execute_sql", json!({"sql": "SELECT * FROM x", "connection": "a"}))
        .await;
    assert!(tool_text(&response).starts_with("SQL execution failed: "));
}

#[tokio::test]
async fn test_list_connections_reports_and_retries() {
    let connector_down = {
        let mut session = Session::start(&["a", "b"], MockConfirmer::approving()).await;
        session
            .connector
            .client("b")
            .unwrap()
            .fail_next(sqlgate::error::SqlGateError::connection("connection reset by peer"));
        session.connector.set_unreachable("b", true);

        session
            .call(1, "execute_sql", json!({"sql": "SELECT 1", "connection": "b"}))
            .await;

        let response = session.call(2, "list_connections", json!({})).await;
        let listed: Value = serde_json::from_str(tool_text(&response)).unwrap();
        assert_eq!(
            listed["connections"],
            json!([{"name": "a", "available": true}, {"name": "b", "available": false}])
        );
        assert!(listed["message"].as_str().unwrap().contains("list_connections"));

        session.connector.set_unreachable("b", false);
        let response = session.call(3, "list_connections", json!({})).await;
        let listed: Value = serde_json::from_str(tool_text(&response)).unwrap();
        assert_eq!(listed["connections"][1]["available"], true);
        session.connector.attempts("b")
    };
    assert_eq!(connector_down, 3);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_confirmation() {
    let confirmer = MockConfirmer::approving().with_delay(Duration::from_secs(30));
    let mut session = Session::start(&["main"], confirmer).await;

    session
        .send(json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "tools/call",
            "params": {"name": "execute_sql", "arguments": {"sql": "DELETE FROM t"}}
        }))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.cancel.cancel();

    let response = session.recv().await;
    assert_eq!(response["id"], 9);
    assert_eq!(tool_text(&response), "Confirmation dialog error: confirmation cancelled");

    session.server.await.unwrap().unwrap();
    assert!(session.connector.client("main").unwrap().executed().is_empty());

    let records = read_records(&session.gateway.audit_path().unwrap()).unwrap();
    assert!(matches!(records[0].action, AuditAction::ConfirmError(_)));
}
