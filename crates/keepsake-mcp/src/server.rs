//! [`Server`] – MCP server over newline-delimited JSON-RPC on stdio.
//!
//! * Each inbound line is one JSON-RPC message; blank lines are skipped.
//! * Requests are handled concurrently, one task per line.  Store calls run
//!   on the blocking pool.
//! * Responses go through a single writer task so frames never interleave.
//! * Notifications never get a response.
//! * EOF on the input stops the server once in-flight responses are written.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::protocol::{
    DEFAULT_PROTOCOL_VERSION, InitializeParams, JSONRPC_VERSION, JsonRpcRequest, JsonRpcResponse,
    McpToolResult, ToolCallParams, error_code,
};
use crate::tools::{MemoryTools, list_tools};

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "keepsake";

/// Capacity of the outbound frame queue.
const OUTBOUND_QUEUE: usize = 64;

#[derive(Clone)]
pub struct Server {
    tools: Arc<MemoryTools>,
}

impl Server {
    pub fn new(tools: MemoryTools) -> Self {
        Self {
            tools: Arc::new(tools),
        }
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    pub async fn run_stdio(self) -> std::io::Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        self.serve(reader, tokio::io::stdout()).await?;
        Ok(())
    }

    /// Serve JSON-RPC lines read from `reader`, writing responses to `writer`.
    ///
    /// Returns the writer once the input is exhausted and every response has
    /// been flushed.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> std::io::Result<W>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
        let writer_task = tokio::spawn(write_frames(rx, writer));

        let mut in_flight = JoinSet::new();
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            reap_finished(&mut in_flight);
            if line.trim().is_empty() {
                continue;
            }
            let server = self.clone();
            let tx = tx.clone();
            in_flight.spawn(async move {
                let Some(response) = server.handle_line(&line).await else {
                    return;
                };
                match serde_json::to_string(&response) {
                    Ok(frame) => {
                        if tx.send(frame).await.is_err() {
                            warn!("response dropped: writer closed");
                        }
                    }
                    Err(e) => error!(error = %e, "failed to serialize response"),
                }
            });
        }
        debug!("input closed; draining in-flight requests");

        while let Some(joined) = in_flight.join_next().await {
            log_join_failure(joined);
        }
        drop(tx);

        writer_task
            .await
            .map_err(|e| std::io::Error::other(format!("writer task failed: {e}")))?
    }

    /// Handle one raw JSON-RPC line.  Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unparseable JSON-RPC frame");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    error_code::PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
        };
        let id_hint = value.get("id").cloned().unwrap_or(Value::Null);

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    id_hint,
                    error_code::INVALID_REQUEST,
                    format!("Invalid request: {e}"),
                ));
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                id_hint,
                error_code::INVALID_REQUEST,
                format!("Unsupported jsonrpc version '{}'", request.jsonrpc),
            ));
        }

        self.handle_request(request).await
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!(method = %request.method, "notification received");
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        let response = match request.method.as_str() {
            "initialize" => {
                let params: InitializeParams = request
                    .params
                    .and_then(|p| serde_json::from_value(p).ok())
                    .unwrap_or_default();
                let protocol_version = params
                    .protocol_version
                    .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string());
                info!(%protocol_version, "client initialized session");
                JsonRpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": protocol_version,
                        "capabilities": { "tools": {} },
                        "serverInfo": {
                            "name": SERVER_NAME,
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    }),
                )
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": list_tools() })),
            "tools/call" => self.call_tool(id, request.params).await,
            other => JsonRpcResponse::failure(
                id,
                error_code::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        };
        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params.map(serde_json::from_value::<ToolCallParams>) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                return JsonRpcResponse::failure(
                    id,
                    error_code::INVALID_PARAMS,
                    format!("Invalid params: {e}"),
                );
            }
            None => {
                return JsonRpcResponse::failure(
                    id,
                    error_code::INVALID_PARAMS,
                    "Invalid params: missing tool name",
                );
            }
        };

        let tools = Arc::clone(&self.tools);
        let name = params.name.clone();
        let outcome =
            tokio::task::spawn_blocking(move || tools.call(&params.name, params.arguments)).await;

        let result = match outcome {
            Ok(Ok(text)) => McpToolResult::text(text),
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "tool call failed");
                McpToolResult::error(e.to_string())
            }
            Err(e) => {
                error!(tool = %name, error = %e, "tool task panicked");
                return JsonRpcResponse::failure(
                    id,
                    error_code::INTERNAL_ERROR,
                    format!("Internal error: {e}"),
                );
            }
        };

        match serde_json::to_value(&result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::failure(id, error_code::INTERNAL_ERROR, e.to_string()),
        }
    }
}

/// Drop completed request tasks so a long session does not accumulate them.
fn reap_finished(in_flight: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = in_flight.try_join_next() {
        log_join_failure(joined);
        reaped += 1;
    }
    reaped
}

fn log_join_failure(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "request task failed");
    }
}

async fn write_frames<W>(mut rx: mpsc::Receiver<String>, mut writer: W) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        writer.write_all(frame.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(writer)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_memory::MemoryStore;
    use tempfile::TempDir;

    fn server() -> (TempDir, Server) {
        let dir = tempfile::tempdir().expect("tmp dir");
        let global = dir.path().join("global");
        let local = dir.path().join("local");
        std::fs::create_dir_all(&global).unwrap();
        std::fs::create_dir_all(&local).unwrap();
        let tools = MemoryTools::new(MemoryStore::new(global, local));
        (dir, Server::new(tools))
    }

    async fn request(server: &Server, frame: Value) -> Value {
        let response = server
            .handle_line(&frame.to_string())
            .await
            .expect("response expected");
        serde_json::to_value(response).unwrap()
    }

    fn tool_text(response: &Value) -> &str {
        response["result"]["content"][0]["text"].as_str().unwrap()
    }

    // ── lifecycle ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn initialize_echoes_protocol_version() {
        let (_dir, server) = server();
        let resp = request(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                   "params": {"protocolVersion": "2025-03-26", "capabilities": {}}}),
        )
        .await;
        assert_eq!(resp["id"], json!(1));
        assert_eq!(resp["result"]["protocolVersion"], json!("2025-03-26"));
        assert_eq!(resp["result"]["serverInfo"]["name"], json!("keepsake"));
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn initialize_defaults_protocol_version() {
        let (_dir, server) = server();
        let resp = request(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
        )
        .await;
        assert_eq!(resp["result"]["protocolVersion"], json!(DEFAULT_PROTOCOL_VERSION));
    }

    #[tokio::test]
    async fn notification_gets_no_response() {
        let (_dir, server) = server();
        let frame = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        assert!(server.handle_line(&frame.to_string()).await.is_none());
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let (_dir, server) = server();
        let resp = request(&server, json!({"jsonrpc": "2.0", "id": "p", "method": "ping"})).await;
        assert_eq!(resp["result"], json!({}));
    }

    // ── errors ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn garbage_is_parse_error() {
        let (_dir, server) = server();
        let resp = server.handle_line("{not json").await.unwrap();
        assert_eq!(resp.id, Value::Null);
        assert_eq!(resp.error.unwrap().code, error_code::PARSE_ERROR);
    }

    #[tokio::test]
    async fn missing_method_is_invalid_request() {
        let (_dir, server) = server();
        let resp = request(&server, json!({"jsonrpc": "2.0", "id": 7})).await;
        assert_eq!(resp["id"], json!(7));
        assert_eq!(resp["error"]["code"], json!(error_code::INVALID_REQUEST));
    }

    #[tokio::test]
    async fn wrong_version_is_invalid_request() {
        let (_dir, server) = server();
        let resp = request(&server, json!({"jsonrpc": "1.0", "id": 7, "method": "ping"})).await;
        assert_eq!(resp["error"]["code"], json!(error_code::INVALID_REQUEST));
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let (_dir, server) = server();
        let resp = request(
            &server,
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"}),
        )
        .await;
        assert_eq!(resp["error"]["code"], json!(error_code::METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn tools_call_without_params_is_invalid_params() {
        let (_dir, server) = server();
        let resp = request(
            &server,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call"}),
        )
        .await;
        assert_eq!(resp["error"]["code"], json!(error_code::INVALID_PARAMS));
    }

    // ── tools ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn tools_list_advertises_four_tools() {
        let (_dir, server) = server();
        let resp = request(
            &server,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/list"}),
        )
        .await;
        let tools = resp["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 4);
        assert!(tools.iter().all(|t| t["inputSchema"].is_object()));
    }

    #[tokio::test]
    async fn tools_call_remember_and_retrieve() {
        let (_dir, server) = server();
        let resp = request(
            &server,
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {
                "name": "remember_memory",
                "arguments": {"category": "dev", "data": "Uses eslint", "tags": ["tools"], "is_global": false}
            }}),
        )
        .await;
        assert!(resp["result"].get("isError").is_none());

        let resp = request(
            &server,
            json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {
                "name": "retrieve_memories",
                "arguments": {"category": "dev", "is_global": false}
            }}),
        )
        .await;
        let listed: Value = serde_json::from_str(tool_text(&resp)).unwrap();
        assert_eq!(listed, json!({"tools": ["Uses eslint"]}));
    }

    #[tokio::test]
    async fn tool_failure_is_error_result_not_rpc_error() {
        let (_dir, server) = server();
        let resp = request(
            &server,
            json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call", "params": {
                "name": "remember_memory",
                "arguments": {"category": "", "data": "x", "is_global": true}
            }}),
        )
        .await;
        assert!(resp.get("error").is_none());
        assert_eq!(resp["result"]["isError"], json!(true));
        assert!(tool_text(&resp).contains("category must not be empty"));
    }

    // ── transport ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn finished_request_tasks_are_reaped() {
        let mut in_flight = JoinSet::new();
        for _ in 0..3 {
            in_flight.spawn(async {});
        }

        let mut reaped = 0;
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !in_flight.is_empty() {
                reaped += reap_finished(&mut in_flight);
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("tasks finish");
        assert_eq!(reaped, 3);
        assert_eq!(reap_finished(&mut in_flight), 0);
    }

    #[tokio::test]
    async fn serve_answers_each_request_line() {
        let (_dir, server) = server();
        let input = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}).to_string(),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
            String::new(),
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}).to_string(),
        ]
        .join("\n");

        let out = server
            .serve(BufReader::new(input.as_bytes()), Vec::new())
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let mut ids: Vec<i64> = text
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["id"].as_i64().unwrap())
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }
}
