//! MCP lifecycle and request dispatch.

use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn};

use plone_mcp_shared::{PloneMcpError, Result};

use crate::mcp::protocol::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION, METHOD_NOT_FOUND, PARSE_ERROR,
    ToolCallParams, tool_result,
};
use crate::mcp::transport::StdioTransport;
use crate::service::ContentService;

const SERVER_NAME: &str = "plone-mcp";

const INSTRUCTIONS: &str = "Manage content on a Plone site. To build a page body, call \
prepare_blocks with Markdown text and other blocks, then create_content or update_content \
within 60 seconds. Use get_block_schema to see the available block types.";

pub struct McpServer {
    service: ContentService,
}

impl McpServer {
    pub fn new(service: ContentService) -> Self {
        Self { service }
    }

    /// Serve messages from `transport` until its input ends.
    pub async fn run<R, W>(&self, transport: &mut StdioTransport<R, W>) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(protocol = MCP_PROTOCOL_VERSION, "MCP server listening on stdio");
        while let Some(line) = transport.read_message().await? {
            if let Some(response) = self.handle_line(&line).await {
                let text = serde_json::to_string(&response)?;
                transport.write_message(&text).await?;
            }
        }
        info!("input closed, MCP server stopping");
        Ok(())
    }

    /// Handle one raw message; `None` when no response is due.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "unparseable message");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}")),
                ));
            }
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(INVALID_REQUEST, format!("invalid request: {e}")),
                ));
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
            ));
        }
        self.handle_request(request).await
    }

    #[instrument(skip_all, fields(method = %request.method))]
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            debug!("notification received");
            return None;
        }
        let id = request.id.unwrap_or(Value::Null);
        let params = request.params.unwrap_or(Value::Null);

        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.service.tools() })),
            "tools/call" => self.call_tool(params).await,
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        };
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            "instructions": INSTRUCTIONS,
        })
    }

    /// Tool failures become `isError` results; only malformed calls are protocol errors.
    async fn call_tool(&self, params: Value) -> std::result::Result<Value, JsonRpcError> {
        let params: ToolCallParams = serde_json::from_value(params).map_err(|e| {
            JsonRpcError::new(INVALID_PARAMS, format!("invalid tools/call params: {e}"))
        })?;

        match self.service.call_tool(&params.name, params.arguments).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).map_err(|e| {
                    JsonRpcError::new(INTERNAL_ERROR, format!("failed to encode result: {e}"))
                })?;
                Ok(tool_result(text, false))
            }
            Err(e @ PloneMcpError::NotFound { what: "tool", .. }) => {
                Err(JsonRpcError::new(INVALID_PARAMS, e.to_string()))
            }
            Err(e) => Ok(tool_result(e.to_string(), true)),
        }
    }
}
