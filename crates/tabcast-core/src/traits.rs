//! Embedder seams: worker host, session store, native model context
//!
//! The runtime touches its surroundings only through these traits. A
//! browser embedding binds them to the real platform surfaces; tests and
//! native embeddings supply in-process implementations.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::BridgeResult;
use crate::port::MessagePort;

/// Future returned by a tool handler.
pub type ToolFuture = BoxFuture<'static, BridgeResult<Value>>;

/// A tool handler living in tab memory. Handlers are dispatched by name;
/// they are never serialized or shipped to another context.
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// Vends ports to the worker context.
///
/// The tab adapter tries [`shared_channel`](WorkerHost::shared_channel)
/// first and falls back to
/// [`service_channel`](WorkerHost::service_channel); both reach the same
/// hub, they differ only in how the platform materializes the worker.
pub trait WorkerHost: Send + Sync {
    /// Port to a worker shared by every same-origin tab.
    fn shared_channel(&self) -> BridgeResult<MessagePort>;

    /// Port to a service-style worker, used when no shared worker exists.
    fn service_channel(&self) -> BridgeResult<MessagePort>;
}

/// Session-scoped string storage (the `sessionStorage` seam).
///
/// Implementations may refuse writes (private modes); callers fall back
/// to non-persisted state when they do.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Returns false when the value could not be persisted.
    fn set(&self, key: &str, value: &str) -> bool;
}

/// A tool registration pushed into the native model-context surface.
pub struct NativeTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    /// The only annotation the native surface understands.
    pub read_only: bool,
    /// Delegates straight to the local handler; no proxying involved.
    pub execute: ToolHandler,
}

impl std::fmt::Debug for NativeTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeTool")
            .field("name", &self.name)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

/// The browser's `navigator.modelContext` surface, when present.
///
/// Duplicate names are an error at this layer; the mirror idempotently
/// unregisters before re-registering.
pub trait ModelContextSurface: Send + Sync {
    fn register_tool(&self, tool: NativeTool) -> BridgeResult<()>;

    fn unregister_tool(&self, name: &str) -> BridgeResult<()>;

    fn clear_context(&self) -> BridgeResult<()>;
}
