//! Tabcast Core - Shared types and primitives for the multi-tab MCP runtime
//!
//! This crate provides the foundational abstractions used by:
//! - `tabcast-tab` - Per-tab adapter, local tool registry, native mirror
//! - `tabcast-worker` - Worker hub hosting the MCP server
//!
//! # Overview
//!
//! Tabcast turns a set of browser tabs into a single addressable MCP node:
//! tabs register tool handlers locally and advertise them through a shared
//! worker, which routes incoming MCP calls back to the tab that owns the
//! handler. This crate defines the wire envelopes exchanged between tabs
//! and the worker, the message-port primitive that carries them, and the
//! seams (worker host, session store, native model-context surface) that
//! embedders implement.
//!
//! Handler closures never cross a context boundary; tool invocations are
//! correlated by an opaque `callId` instead.

mod config;
mod error;
mod messages;
mod port;
mod traits;
mod types;

pub use config::*;
pub use error::*;
pub use messages::*;
pub use port::*;
pub use traits::*;
pub use types::*;
