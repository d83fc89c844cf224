//! Configuration for the tab adapter, the worker, and its proxy link

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_init_timeout_ms() -> u64 {
    2_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_keepalive_secs() -> u64 {
    20
}

fn default_initial_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

/// WebSocket link to the remote MCP proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Proxy endpoint, e.g. `ws://localhost:4797/worker`
    pub url: String,
    /// Refuse to dial until an auth token has been supplied
    #[serde(default)]
    pub require_auth: bool,
    /// Interval between `{"type":"ping"}` keepalive frames
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// First reconnect delay; doubled per failed attempt
    #[serde(default = "default_initial_reconnect_delay_ms")]
    pub initial_reconnect_delay_ms: u64,
    /// Reconnect delay ceiling
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
}

impl LinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            require_auth: false,
            keepalive_secs: default_keepalive_secs(),
            initial_reconnect_delay_ms: default_initial_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
        }
    }
}

/// Worker-side runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub link: LinkConfig,
    /// Upper bound on a routed tool call awaiting its TOOL_CALL_RESULT
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn new(link: LinkConfig) -> Self {
        Self {
            link,
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new(LinkConfig::new("ws://127.0.0.1:4797/worker"))
    }
}

/// Tab-side adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabConfig {
    /// Backend URL forwarded to the worker in INIT
    pub backend_url: String,
    /// Deadline for the worker-alive handshake
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
    /// Per-request reply deadline on the worker port
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Mirror registrations into the native model-context surface
    #[serde(default = "default_true")]
    pub mirror_enabled: bool,
}

impl TabConfig {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            init_timeout_ms: default_init_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            mirror_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TabConfig::new("ws://localhost:4797");
        assert_eq!(config.init_timeout_ms, 2_000);
        assert_eq!(config.request_timeout_ms, 5_000);
        assert!(config.mirror_enabled);

        let worker = WorkerConfig::default();
        assert_eq!(worker.call_timeout_secs, 30);
        assert_eq!(worker.link.keepalive_secs, 20);
        assert!(!worker.link.require_auth);
    }

    #[test]
    fn test_partial_deserialization() {
        let link: LinkConfig =
            serde_json::from_str(r#"{"url": "ws://proxy/worker", "require_auth": true}"#).unwrap();
        assert!(link.require_auth);
        assert_eq!(link.initial_reconnect_delay_ms, 1_000);
        assert_eq!(link.max_reconnect_delay_ms, 30_000);
    }
}
