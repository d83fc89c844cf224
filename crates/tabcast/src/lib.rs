//! # Tabcast - multi-tab MCP runtime
//!
//! Tabcast turns a set of browser tabs into one addressable MCP node:
//!
//! - **Core types** (`tabcast-core`) - Wire envelopes, tool types, ports
//! - **Tab** (`tabcast-tab`) - Per-tab adapter, refcounted registry,
//!   native model-context mirror
//! - **Worker** (`tabcast-worker`) - The shared hub: routing, MCP
//!   dispatch, and the WebSocket link to the remote proxy
//!
//! ## Features
//!
//! - `tab` (default) - Include the tab-side runtime
//! - `worker` (default) - Include the worker hub
//! - `full` - Include everything
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tabcast::{TabConfig, ToolDefinition, WorkerConfig};
//! use tabcast::tab::{TabAdapter, TabPage};
//! use tabcast::worker::{LocalWorkerHost, McpController};
//!
//! let controller = McpController::new(WorkerConfig::default());
//! let host = Arc::new(LocalWorkerHost::new(controller.clone()));
//!
//! let adapter = TabAdapter::new(
//!     TabConfig::new("ws://localhost:4797/worker"),
//!     TabPage::new("https://shop.example/cart", "Cart"),
//!     host,
//!     None,
//!     None,
//! );
//! adapter.init().await?;
//! adapter
//!     .register_tool(
//!         ToolDefinition::new("get_cart", "Read the cart"),
//!         Arc::new(|args| Box::pin(async move { Ok(args) })),
//!     )
//!     .await?;
//! ```

// Re-export core types - these are always available
pub use tabcast_core::*;

/// Tab-side runtime
///
/// Register tool handlers from page code and mirror them natively.
#[cfg(feature = "tab")]
pub mod tab {
    pub use tabcast_tab::*;
}

/// Worker hub (requires the `worker` feature)
#[cfg(feature = "worker")]
pub mod worker {
    pub use tabcast_worker::*;
}
