//! MCP method dispatch over JSON-RPC
//!
//! The worker speaks ordinary MCP framing: `initialize`, `tools/list`,
//! `tools/call`, plus a `ping` health method. The handler set is bound to
//! the WebSocket link while it is open; each inbound text frame is one
//! JSON-RPC request.

use std::sync::Arc;

use jsonrpc_core::{Error as RpcError, ErrorCode, IoHandler, Params};
use serde_json::{json, Value};
use tracing::{debug, error};

use tabcast_core::{BridgeError, ToolResult};

use crate::registry::AdvertisedRegistry;

/// MCP protocol version advertised in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Build the JSON-RPC handler over the advertised registry.
///
/// The registry is consulted per request, so tools registered after the
/// link opened are visible to the next `tools/list` without rebinding.
pub fn build_dispatcher(registry: Arc<AdvertisedRegistry>) -> IoHandler {
    let mut handler = IoHandler::new();

    handler.add_method("initialize", move |params: Params| {
        Box::pin(async move {
            debug!("received initialize request: {:?}", params);
            Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": "tabcast-worker",
                    "version": env!("CARGO_PKG_VERSION")
                },
                "capabilities": {
                    "tools": { "listChanged": true }
                }
            }))
        })
    });

    let tools = Arc::clone(&registry);
    handler.add_method("tools/list", move |_params: Params| {
        let tools = Arc::clone(&tools);
        Box::pin(async move {
            Ok(json!({
                "tools": tools.definitions()
            }))
        })
    });

    let tools = Arc::clone(&registry);
    handler.add_method("tools/call", move |params: Params| {
        let tools = Arc::clone(&tools);
        Box::pin(async move {
            let params = params
                .parse::<Value>()
                .map_err(|e| RpcError::invalid_params(e.to_string()))?;

            let tool_name = params["name"]
                .as_str()
                .ok_or_else(|| RpcError::invalid_params("missing tool name"))?;
            let args = params.get("arguments").cloned().unwrap_or(json!({}));
            // External agents target a specific tab through the augmented
            // top-level property.
            let explicit_tab = args
                .get("tabId")
                .and_then(Value::as_str)
                .map(str::to_string);

            let proxy = tools
                .handler(tool_name)
                .ok_or_else(|| RpcError::invalid_params(format!("unknown tool: {tool_name}")))?;

            match proxy(args, explicit_tab).await {
                Ok(result) => Ok(wrap_content(result)),
                Err(BridgeError::Handler(message)) => {
                    // Tool-level failure: an error result, not a protocol error.
                    Ok(serde_json::to_value(ToolResult::error(message)).unwrap_or(Value::Null))
                }
                Err(err) => {
                    error!(tool = tool_name, %err, "tool call failed");
                    Err(RpcError {
                        code: ErrorCode::ServerError(-32000),
                        message: err.to_string(),
                        data: None,
                    })
                }
            }
        })
    });

    handler.add_method("ping", |_params: Params| {
        Box::pin(async move { Ok(json!("pong")) })
    });

    handler
}

/// Pass MCP-shaped results through; wrap anything else as a text block.
fn wrap_content(value: Value) -> Value {
    let has_content = value
        .as_object()
        .map(|object| object.contains_key("content"))
        .unwrap_or(false);
    if has_content {
        return value;
    }
    let text = match &value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    serde_json::to_value(ToolResult::text(text)).unwrap_or(Value::Null)
}
