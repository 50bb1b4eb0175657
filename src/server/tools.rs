//! Tool definitions and their mapping onto the gateway.

use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::protocol::{JsonRpcError, Tool, ToolCallResult, METHOD_NOT_FOUND, USER_REJECTED};
use crate::connection::ConnectionStatus;
use crate::gateway::{ExecutionOutcome, SqlGateway, SqlRequest};

pub const EXECUTE_SQL: &str = "execute_sql";
pub const EXECUTE_SQL_FILE: &str = "execute_sql_file";
pub const LIST_CONNECTIONS: &str = "list_connections";

const LIST_CONNECTIONS_MESSAGE: &str = "Use these names as the 'connection' argument in execute_sql. \
Unavailable connections are retried on each list_connections call.";

/// Tools advertised by `tools/list`.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: EXECUTE_SQL,
            description: "Execute SQL against a configured database. When several databases are \
configured, pass 'connection' to choose one (see list_connections). Supports queries, DML, DDL and \
multiple statements, one per line, each ending with a semicolon. DDL is auto-committed. SQL matching \
the configured danger keywords, and DDL, must be confirmed by a human who sees the full SQL.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "SQL to run: one statement, or several (one per line, each ending with a semicolon)."
                    },
                    "connection": {
                        "type": "string",
                        "description": "Configured connection name. Required when more than one connection is configured."
                    }
                },
                "required": ["sql"]
            }),
        },
        Tool {
            name: EXECUTE_SQL_FILE,
            description: "Read SQL from a file and run it with the same rules as execute_sql. The \
confirmation shows the full file content. Relative paths resolve from the server's working directory.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the SQL file, absolute or relative to the server working directory."
                    },
                    "connection": {
                        "type": "string",
                        "description": "Configured connection name. Required when more than one connection is configured."
                    }
                },
                "required": ["file_path"]
            }),
        },
        Tool {
            name: LIST_CONNECTIONS,
            description: "List configured database connections and whether each is available. \
Unavailable connections are retried by this call.",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        },
    ]
}

#[derive(Debug, Serialize)]
struct ConnectionList {
    connections: Vec<ConnectionStatus>,
    message: &'static str,
}

/// Reads a required string argument.
fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolCallResult> {
    match args.get(key) {
        None | Some(Value::Null) => Err(ToolCallResult::error(format!(
            "Missing required parameter: {key}"
        ))),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ToolCallResult::error(format!(
            "Parameter '{key}' must be a string"
        ))),
    }
}

/// Reads the optional `connection` argument; blank counts as absent.
fn connection_arg(args: &Map<String, Value>) -> Option<String> {
    args.get("connection")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Maps a gateway outcome onto the wire.
fn outcome_reply(outcome: ExecutionOutcome) -> Result<ToolCallResult, JsonRpcError> {
    match outcome {
        ExecutionOutcome::Executed(result) => Ok(ToolCallResult::json(&result)),
        ExecutionOutcome::Rejected { matched_keywords } => {
            Err(JsonRpcError::new(USER_REJECTED, "Execution cancelled by user").with_data(json!({
                "code": "USER_REJECTED",
                "matched_keywords": matched_keywords,
            })))
        }
        ExecutionOutcome::ConfirmationFailed { message } => Ok(ToolCallResult::error(format!(
            "Confirmation dialog error: {message}"
        ))),
        ExecutionOutcome::ExecutionFailed { message } => Ok(ToolCallResult::error(format!(
            "SQL execution failed: {message}"
        ))),
    }
}

/// Runs one tool call.
///
/// `Err` becomes a JSON-RPC error response; everything else, including tool
/// failures, is a normal result.
pub async fn call_tool(
    gateway: &SqlGateway,
    name: &str,
    arguments: &Value,
) -> Result<ToolCallResult, JsonRpcError> {
    let empty = Map::new();
    let args = arguments.as_object().unwrap_or(&empty);

    match name {
        EXECUTE_SQL => {
            let sql = match required_str(args, "sql") {
                Ok(sql) => sql,
                Err(reply) => return Ok(reply),
            };
            let request = SqlRequest {
                sql: sql.to_string(),
                connection: connection_arg(args),
                source_label: None,
            };
            match gateway.execute_sql(request).await {
                Ok(outcome) => outcome_reply(outcome),
                Err(e) => Ok(ToolCallResult::error(e.to_string())),
            }
        }
        EXECUTE_SQL_FILE => {
            let file_path = match required_str(args, "file_path") {
                Ok(path) => path.trim(),
                Err(reply) => return Ok(reply),
            };
            let connection = connection_arg(args);
            match gateway
                .execute_sql_file(Path::new(file_path), connection.as_deref())
                .await
            {
                Ok(outcome) => outcome_reply(outcome),
                Err(e) => Ok(ToolCallResult::error(e.to_string())),
            }
        }
        LIST_CONNECTIONS => Ok(ToolCallResult::json(&ConnectionList {
            connections: gateway.list_connections().await,
            message: LIST_CONNECTIONS_MESSAGE,
        })),
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Unknown tool: {other}"),
        )),
    }
}
