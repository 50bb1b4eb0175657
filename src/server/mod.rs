//! Line-delimited JSON-RPC server exposing the gateway as tools.
//!
//! One request per line, handled in order. Responses are written as one
//! line each. Notifications never get a response.

mod protocol;
mod tools;

pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolCallResult, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION, USER_REJECTED,
};
pub use tools::{call_tool, tool_definitions, EXECUTE_SQL, EXECUTE_SQL_FILE, LIST_CONNECTIONS};

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SqlGateError};
use crate::gateway::SqlGateway;
use protocol::{
    InitializeResult, ServerCapabilities, ServerInfo, ToolCallParams, ToolsCapability,
    ToolsListResult,
};

const SERVER_NAME: &str = "sqlgate";

/// Serves tool calls for one protocol session.
pub struct McpServer {
    gateway: Arc<SqlGateway>,
}

impl McpServer {
    pub fn new(gateway: Arc<SqlGateway>) -> Self {
        Self { gateway }
    }

    /// Reads requests until EOF or cancellation.
    pub async fn run<R, W>(&self, reader: R, mut writer: W, cancel: CancellationToken) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        info!("Server started, waiting for requests");

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Server cancelled");
                    break;
                }
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Input closed, shutting down");
                    break;
                }
                Err(e) => return Err(SqlGateError::protocol(format!("Failed to read request: {e}"))),
            };

            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line).await {
                let mut out = serde_json::to_string(&response)
                    .map_err(|e| SqlGateError::protocol(format!("Failed to encode response: {e}")))?;
                out.push('\n');
                writer
                    .write_all(out.as_bytes())
                    .await
                    .map_err(|e| SqlGateError::protocol(format!("Failed to write response: {e}")))?;
                writer
                    .flush()
                    .await
                    .map_err(|e| SqlGateError::protocol(format!("Failed to write response: {e}")))?;
            }
        }

        Ok(())
    }

    /// Handles one raw line. Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Unparseable request: {e}");
                return Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::new(PARSE_ERROR, "Parse error"),
                ));
            }
        };
        let id = value.get("id").cloned().filter(|id| !id.is_null());

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid request: {e}");
                return Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::new(INVALID_REQUEST, "Invalid Request"),
                ));
            }
        };

        self.handle_request(request).await
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("<- {}", request.method);
        let id = request.id.clone();
        let notification = request.is_notification();

        let reply = match request.method.as_str() {
            "initialize" => to_value(&InitializeResult {
                protocol_version: PROTOCOL_VERSION,
                capabilities: ServerCapabilities {
                    tools: ToolsCapability {
                        list_changed: false,
                    },
                    logging: json!({}),
                },
                server_info: ServerInfo {
                    name: SERVER_NAME,
                    version: env!("CARGO_PKG_VERSION"),
                },
            }),
            "initialized" | "notifications/initialized" => return None,
            "tools/list" => to_value(&ToolsListResult {
                tools: tool_definitions(),
            }),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(json!({"status": "ok"})),
            method => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            )),
        };

        if notification {
            return None;
        }
        Some(match reply {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    async fn handle_tools_call(&self, params: Value) -> std::result::Result<Value, JsonRpcError> {
        let params: ToolCallParams = serde_json::from_value(params)
            .map_err(|_| JsonRpcError::new(INVALID_PARAMS, "Invalid params"))?;
        debug!("Calling tool {}", params.name);

        let result = call_tool(&self.gateway, &params.name, &params.arguments).await?;
        to_value(&result)
    }
}

fn to_value<T: Serialize>(value: &T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("Serialization error: {e}")))
}
