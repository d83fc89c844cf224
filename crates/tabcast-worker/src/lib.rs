//! Tabcast Worker - the shared hub hosting the MCP server
//!
//! One worker serves every same-origin tab. It owns the canonical tool
//! registry advertised over MCP, the tab table with its tool→tabs index,
//! the pending-call correlation map, and the WebSocket link to the remote
//! proxy that bridges external MCP clients.
//!
//! An incoming `tools/call` resolves to a proxy handler that routes the
//! call to one tab, broadcasts `CALL_TOOL` with the chosen `targetTabId`,
//! and awaits the matching `TOOL_CALL_RESULT` by `callId`.

pub mod config;
pub mod controller;
pub mod host;
pub mod link;
pub mod pending;
pub mod registry;
pub mod server;
pub mod tabs;

pub use config::Config;
pub use controller::McpController;
pub use host::LocalWorkerHost;
pub use link::{LinkState, WsLink};
pub use registry::{AdvertisedRegistry, ProxyHandler};
pub use tabs::{RouteDecision, RouteFailure, RouteReason, TabManager};
