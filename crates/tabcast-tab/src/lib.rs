//! Tabcast Tab - per-tab runtime for the multi-tab MCP bridge
//!
//! Each browser tab owns one [`TabAdapter`]. The adapter keeps a local
//! refcounted [`LocalToolRegistry`] of handler closures, pushes
//! registrations to the shared worker over a message port, executes
//! `CALL_TOOL` broadcasts routed back to this tab, and optionally mirrors
//! the tool set into the native model-context surface so on-device agents
//! can discover it without the remote proxy.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabcast_tab::{TabAdapter, TabPage};
//! use tabcast_core::{TabConfig, ToolDefinition};
//!
//! let adapter = TabAdapter::new(
//!     TabConfig::new("ws://localhost:4797/worker"),
//!     TabPage::new("https://shop.example/cart", "Cart"),
//!     host,          // Arc<dyn WorkerHost>
//!     Some(store),   // Arc<dyn SessionStore>
//!     None,          // no native surface
//! );
//! adapter.init().await?;
//! adapter
//!     .register_tool(ToolDefinition::new("get_cart", "Read the cart"), handler)
//!     .await?;
//! ```

mod adapter;
mod mirror;
mod registry;
mod session;
mod transport;

pub use adapter::{TabAdapter, TabPage};
pub use mirror::NativeMirror;
pub use registry::{LocalToolRegistry, RegistrationState};
pub use session::{resolve_tab_id, MemorySessionStore, TAB_ID_STORAGE_KEY};
pub use transport::{connect_channel, ChannelKind, PortChannel, WorkerChannel};
