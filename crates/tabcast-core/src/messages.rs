//! Wire envelopes exchanged between tabs and the worker
//!
//! Every message is a JSON object with a `type` discriminant. Requests
//! that expect a reply carry an ephemeral reply slot next to the envelope
//! (see [`crate::PortSender::request`]); the reply shape is always
//! `{ success, error?, ...data }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{TabInfo, ToolDefinition};

/// Handler type recorded for worker-side registrations. Handler code never
/// crosses a context boundary, so the worker only ever stores proxies.
pub const HANDLER_TYPE_PROXY: &str = "proxy";

/// Tab/worker message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    /// First message after the handshake; carries any buffered auth token.
    #[serde(rename_all = "camelCase")]
    Init {
        backend_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// Replace the link's auth token.
    SetAuthToken { token: String },
    #[serde(rename_all = "camelCase")]
    RegisterTab {
        tab_id: String,
        url: String,
        title: String,
        /// Milliseconds since the epoch at send time.
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    SetActiveTab { tab_id: String },
    #[serde(rename_all = "camelCase")]
    RegisterTool {
        #[serde(flatten)]
        definition: ToolDefinition,
        handler_type: String,
        tab_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UnregisterTool { name: String, tab_id: String },
    GetConnectionStatus,
    /// Event tracker query; the core runtime does not service it.
    GetEvents,
    /// Event tracker append; the core runtime does not service it.
    StoreEvent { event: Value },
    #[serde(rename_all = "camelCase")]
    ToolCallResult {
        call_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Worker → tabs: link connectivity changed (or handshake greeting).
    ConnectionStatus { connected: bool },
    /// Worker → tabs: invoke a local handler. Tabs other than
    /// `targetTabId` ignore the broadcast.
    #[serde(rename_all = "camelCase")]
    CallTool {
        tool_name: String,
        args: Value,
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_tab_id: Option<String>,
    },
    /// Worker → tabs: the tab table changed.
    TabListUpdated { tabs: Vec<TabInfo> },
}

impl Envelope {
    /// The wire discriminant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Init { .. } => "INIT",
            Envelope::SetAuthToken { .. } => "SET_AUTH_TOKEN",
            Envelope::RegisterTab { .. } => "REGISTER_TAB",
            Envelope::SetActiveTab { .. } => "SET_ACTIVE_TAB",
            Envelope::RegisterTool { .. } => "REGISTER_TOOL",
            Envelope::UnregisterTool { .. } => "UNREGISTER_TOOL",
            Envelope::GetConnectionStatus => "GET_CONNECTION_STATUS",
            Envelope::GetEvents => "GET_EVENTS",
            Envelope::StoreEvent { .. } => "STORE_EVENT",
            Envelope::ToolCallResult { .. } => "TOOL_CALL_RESULT",
            Envelope::ConnectionStatus { .. } => "CONNECTION_STATUS",
            Envelope::CallTool { .. } => "CALL_TOOL",
            Envelope::TabListUpdated { .. } => "TAB_LIST_UPDATED",
        }
    }
}

/// Reply to a port request: `{ success, error?, ...data }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: serde_json::Map<String, Value>,
}

impl Reply {
    /// A bare success reply
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// A success reply carrying one extra field
    pub fn ok_with(key: impl Into<String>, value: Value) -> Self {
        let mut data = serde_json::Map::new();
        data.insert(key.into(), value);
        Self {
            success: true,
            error: None,
            data,
        }
    }

    /// A failure reply with an error message
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            data: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_discriminants() {
        let msg = Envelope::SetActiveTab {
            tab_id: "t1".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], json!("SET_ACTIVE_TAB"));
        assert_eq!(value["tabId"], json!("t1"));
    }

    #[test]
    fn test_register_tool_flattens_definition() {
        let msg = Envelope::RegisterTool {
            definition: crate::ToolDefinition::new("get_time", "Current time"),
            handler_type: HANDLER_TYPE_PROXY.to_string(),
            tab_id: "t1".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], json!("REGISTER_TOOL"));
        assert_eq!(value["name"], json!("get_time"));
        assert_eq!(value["handlerType"], json!("proxy"));
        assert!(value.get("inputSchema").is_some());
    }

    #[test]
    fn test_unit_variant_round_trip() {
        let json = r#"{"type":"GET_CONNECTION_STATUS"}"#;
        let msg: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(msg, Envelope::GetConnectionStatus);
        assert_eq!(msg.kind(), "GET_CONNECTION_STATUS");
    }

    #[test]
    fn test_call_tool_optional_target() {
        let json = r#"{"type":"CALL_TOOL","toolName":"calc","args":{},"callId":"c1"}"#;
        let msg: Envelope = serde_json::from_str(json).unwrap();
        match msg {
            Envelope::CallTool { target_tab_id, .. } => assert!(target_tab_id.is_none()),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn test_reply_flatten() {
        let reply = Reply::ok_with("connected", json!(true));
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["connected"], json!(true));
        assert!(value.get("error").is_none());

        let parsed: Reply = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, reply);
    }
}
