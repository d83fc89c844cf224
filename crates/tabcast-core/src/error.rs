//! Error types for the tab and worker runtimes

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the bridge between tabs, the worker, and the proxy
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Neither a shared nor a service worker channel could be established
    #[error("no worker transport available: {0}")]
    TransportUnavailable(String),

    /// The worker script failed to load or attach
    #[error("worker registration failed: {0}")]
    RegistrationFailed(String),

    /// A port request exceeded its reply deadline
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The worker answered `{success: false}`
    #[error("worker error: {0}")]
    Worker(String),

    /// An MCP call named a tool that is not advertised
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// No tab can service the call
    #[error("no tab can service tool '{tool}': {reason}")]
    NoRouteForTool { tool: String, reason: String },

    /// No TOOL_CALL_RESULT arrived for the call in time
    #[error("tool call {0} timed out")]
    ToolCallTimeout(String),

    /// The tab handler failed; the message is propagated verbatim
    #[error("{0}")]
    Handler(String),

    /// The link refused to dial because auth is required and no token is set
    #[error("connection requires an auth token")]
    AuthGated,

    /// The message channel to the peer context is gone
    #[error("message channel closed")]
    ChannelClosed,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_message_verbatim() {
        let err = BridgeError::Handler("cart is empty".to_string());
        assert_eq!(err.to_string(), "cart is empty");
    }

    #[test]
    fn test_route_error_names_tool() {
        let err = BridgeError::NoRouteForTool {
            tool: "calc".to_string(),
            reason: "no registered tabs".to_string(),
        };
        assert!(err.to_string().contains("calc"));
    }
}
