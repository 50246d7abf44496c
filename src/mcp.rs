//! Line-delimited JSON-RPC 2.0 MCP server core, served over stdio or SSE.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::tools::{catalog, Dispatcher};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "aiwen-geo-mcp";

const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Serialize, Deserialize)]
struct McpRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct McpResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<McpError>,
}

#[derive(Debug, Serialize, Deserialize)]
struct McpError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl McpResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message,
                data: None,
            }),
        }
    }
}

pub struct McpServer {
    dispatcher: Dispatcher,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub async fn run(&self) -> Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.serve(reader, writer).await
    }

    /// Answer requests from `reader` until EOF, one JSON message per line.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buffer = String::new();

        info!("MCP server started, waiting for requests...");

        loop {
            buffer.clear();
            let bytes_read = reader.read_line(&mut buffer).await?;

            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let line = buffer.trim();
            if line.is_empty() {
                continue;
            }

            match self.handle_line(line).await {
                Ok(Some(response_json)) => {
                    writer.write_all(response_json.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                }
                Ok(None) => {}
                Err(e) => {
                    // Malformed input is logged and skipped; no response is emitted.
                    error!("Error handling request: {:#} (line: {})", e, line);
                }
            }
        }

        Ok(())
    }

    /// Handle one JSON-RPC message and return the serialized response, or
    /// `None` for notifications. Shared by the stdio loop and the SSE transport.
    pub async fn handle_line(&self, line: &str) -> Result<Option<String>> {
        debug!("Received line: {}", line);

        match self.handle_request(line).await? {
            Some(response) => {
                let response_json = serde_json::to_string(&response)?;
                debug!("Sending response: {}", response_json);
                Ok(Some(response_json))
            }
            None => {
                debug!("Suppressed response (notification)");
                Ok(None)
            }
        }
    }

    async fn handle_request(&self, line: &str) -> Result<Option<McpResponse>> {
        let request: McpRequest =
            serde_json::from_str(line).context("Failed to parse JSON-RPC request")?;

        debug!("Parsed method: {}, id: {:?}", request.method, request.id);

        let mut request_id = request.id.clone();
        let is_notification = match request_id.as_ref() {
            None => true,
            Some(v) if v.is_null() => true,
            Some(v) if v.is_boolean() => true,
            Some(v) if v.is_array() => true,
            Some(v) if v.is_object() => true,
            _ => false,
        };
        if is_notification && request_id.is_some() {
            warn!(
                "Invalid JSON-RPC id (ignored, treated as notification): {:?}",
                request_id
            );
            request_id = None;
        }

        let response = match request.method.as_str() {
            "initialize" => McpResponse::success(
                request_id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {
                        "tools": {}
                    },
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            ),
            "initialized" | "notifications/initialized" => {
                debug!("Received initialized notification");
                return Ok(None);
            }
            "ping" => McpResponse::success(request_id, json!({})),
            "tools/list" => McpResponse::success(request_id, json!({ "tools": catalog() })),
            "tools/call" => {
                let params = request.params.unwrap_or(Value::Null);
                match params["name"].as_str() {
                    Some(tool_name) => {
                        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
                        let result = self.dispatcher.handle_invocation(tool_name, &arguments).await;
                        McpResponse::success(request_id, serde_json::to_value(result)?)
                    }
                    None => McpResponse::failure(
                        request_id,
                        INVALID_PARAMS,
                        "Missing tool name".to_string(),
                    ),
                }
            }
            _ => McpResponse::failure(
                request_id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        };

        if is_notification {
            Ok(None)
        } else {
            Ok(Some(response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{config, FakeTransport};
    use crate::client::AiwenClient;
    use crate::config::Accuracy;
    use std::sync::Arc;

    fn server(transport: Arc<FakeTransport>) -> McpServer {
        let client = AiwenClient::new(config(Accuracy::City, Accuracy::City), transport);
        McpServer::new(Dispatcher::new(Arc::new(client)))
    }

    async fn exchange(server: &McpServer, input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let s = server(Arc::new(FakeTransport::new()));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n"
        );

        let responses = exchange(&s, input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 9);
        assert!(responses[1]["result"]["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_unknown_tool_keeps_serving() {
        let s = server(Arc::new(FakeTransport::new()));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","#,
            r#""params":{"name":"nope","arguments":{}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"b","method":"ping"}"#,
            "\n"
        );

        let responses = exchange(&s, input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["isError"], true);
        assert_eq!(responses[0]["result"]["content"][0]["text"], "Unknown tool: nope");
        assert_eq!(responses[1]["id"], "b");
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let s = server(Arc::new(FakeTransport::new()));
        let input = "not json\n{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"ping\"}\n";

        let responses = exchange(&s, input).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 3);
    }

    #[tokio::test]
    async fn test_unknown_method_and_missing_tool_name() {
        let s = server(Arc::new(FakeTransport::new()));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{}}"#,
            "\n"
        );

        let responses = exchange(&s, input).await;
        assert_eq!(responses[0]["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(responses[1]["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_call_without_arguments_defaults_to_empty() {
        let transport = Arc::new(FakeTransport::new());
        let s = server(transport.clone());
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"ip_whois_info"}}"#,
            "\n"
        );

        let responses = exchange(&s, input).await;
        assert_eq!(responses[0]["result"]["isError"], true);
        assert_eq!(
            responses[0]["result"]["content"][0]["text"],
            "Error: Missing required parameter: ip"
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_handle_line_notification_and_error() {
        let s = server(Arc::new(FakeTransport::new()));
        let notification = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        assert!(s.handle_line(notification).await.unwrap().is_none());
        assert!(s.handle_line("{broken").await.is_err());

        let response = s
            .handle_line(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#)
            .await
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["id"], 7);
    }
}
