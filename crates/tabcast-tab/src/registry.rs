//! Local tool registry with reference counting
//!
//! The same tool may be provided by several UI components in one tab;
//! each acquires and releases independently. The map owns the records,
//! consumers only ever see names and cloned handles.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::warn;

use tabcast_core::{ToolDefinition, ToolHandler};

/// Registration state passed to change listeners; `None` means removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationState {
    pub ref_count: u32,
    pub is_registered: bool,
}

struct LocalToolRecord {
    definition: ToolDefinition,
    handler: ToolHandler,
    ref_count: u32,
    /// True once the worker has acknowledged the REGISTER_TOOL for this name.
    is_registered: bool,
}

type ChangeListener = Box<dyn Fn(Option<RegistrationState>) + Send + Sync>;

/// Name-keyed registry of this tab's tool handlers.
pub struct LocalToolRegistry {
    tools: Mutex<HashMap<String, LocalToolRecord>>,
    listeners: Mutex<HashMap<String, Vec<ChangeListener>>>,
}

impl Default for LocalToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register a tool, returning whether the name is new to this tab.
    ///
    /// Re-registration increments the refcount and replaces the handler
    /// with the most recently supplied closure.
    pub fn register(&self, definition: ToolDefinition, handler: ToolHandler) -> bool {
        let name = definition.name.clone();
        let (is_new, state) = {
            let mut tools = self.tools.lock();
            match tools.get_mut(&name) {
                Some(record) => {
                    record.ref_count += 1;
                    record.handler = handler;
                    record.definition = definition;
                    (
                        false,
                        RegistrationState {
                            ref_count: record.ref_count,
                            is_registered: record.is_registered,
                        },
                    )
                }
                None => {
                    tools.insert(
                        name.clone(),
                        LocalToolRecord {
                            definition,
                            handler,
                            ref_count: 1,
                            is_registered: false,
                        },
                    );
                    (
                        true,
                        RegistrationState {
                            ref_count: 1,
                            is_registered: false,
                        },
                    )
                }
            }
        };
        self.notify(&name, Some(state));
        is_new
    }

    /// Release one reference.
    ///
    /// Returns `None` for an unknown name, `Some(false)` when the record
    /// survives with a lower refcount, `Some(true)` when it was removed.
    pub fn unregister(&self, name: &str) -> Option<bool> {
        let (removed, state) = {
            let mut tools = self.tools.lock();
            let record = tools.get_mut(name)?;
            record.ref_count -= 1;
            if record.ref_count == 0 {
                tools.remove(name);
                (true, None)
            } else {
                (
                    false,
                    Some(RegistrationState {
                        ref_count: record.ref_count,
                        is_registered: record.is_registered,
                    }),
                )
            }
        };
        self.notify(name, state);
        Some(removed)
    }

    /// Record the worker's acknowledgement for a name.
    pub fn mark_registered(&self, name: &str, is_registered: bool) {
        let state = {
            let mut tools = self.tools.lock();
            let Some(record) = tools.get_mut(name) else {
                return;
            };
            record.is_registered = is_registered;
            RegistrationState {
                ref_count: record.ref_count,
                is_registered,
            }
        };
        self.notify(name, Some(state));
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.tools.lock().contains_key(name)
    }

    pub fn ref_count(&self, name: &str) -> Option<u32> {
        self.tools.lock().get(name).map(|r| r.ref_count)
    }

    pub fn definition(&self, name: &str) -> Option<ToolDefinition> {
        self.tools.lock().get(name).map(|r| r.definition.clone())
    }

    pub fn handler(&self, name: &str) -> Option<ToolHandler> {
        self.tools.lock().get(name).map(|r| r.handler.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.lock().keys().cloned().collect()
    }

    /// Definitions and handlers of every live record, for worker re-send
    /// and mirror repopulation.
    pub fn snapshot(&self) -> Vec<(ToolDefinition, ToolHandler)> {
        self.tools
            .lock()
            .values()
            .map(|r| (r.definition.clone(), r.handler.clone()))
            .collect()
    }

    /// Subscribe to state changes for one tool name.
    pub fn on_change(
        &self,
        name: impl Into<String>,
        listener: impl Fn(Option<RegistrationState>) + Send + Sync + 'static,
    ) {
        self.listeners
            .lock()
            .entry(name.into())
            .or_default()
            .push(Box::new(listener));
    }

    fn notify(&self, name: &str, state: Option<RegistrationState>) {
        let listeners = self.listeners.lock();
        let Some(subs) = listeners.get(name) else {
            return;
        };
        for listener in subs {
            // A panicking listener must not starve the others or undo the
            // mutation that triggered it.
            if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
                warn!(tool = name, "tool change listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn noop_handler() -> ToolHandler {
        Arc::new(|_args| Box::pin(async { Ok(serde_json::json!(null)) }))
    }

    fn marker_handler(marker: &'static str) -> ToolHandler {
        Arc::new(move |_args| Box::pin(async move { Ok(serde_json::json!(marker)) }))
    }

    #[test]
    fn test_register_is_new_then_increments() {
        let registry = LocalToolRegistry::new();
        assert!(registry.register(ToolDefinition::new("x", "d"), noop_handler()));
        assert!(!registry.register(ToolDefinition::new("x", "d"), noop_handler()));
        assert_eq!(registry.ref_count("x"), Some(2));
    }

    #[test]
    fn test_unregister_tri_state() {
        let registry = LocalToolRegistry::new();
        assert_eq!(registry.unregister("missing"), None);

        registry.register(ToolDefinition::new("x", "d"), noop_handler());
        registry.register(ToolDefinition::new("x", "d"), noop_handler());
        assert_eq!(registry.unregister("x"), Some(false));
        assert_eq!(registry.ref_count("x"), Some(1));
        assert_eq!(registry.unregister("x"), Some(true));
        assert!(!registry.is_registered("x"));
    }

    #[tokio::test]
    async fn test_latest_handler_wins() {
        let registry = LocalToolRegistry::new();
        registry.register(ToolDefinition::new("x", "d"), marker_handler("h1"));
        registry.register(ToolDefinition::new("x", "d"), marker_handler("h2"));
        registry.unregister("x");

        // One reference left; the surviving handler is the latest one.
        let handler = registry.handler("x").unwrap();
        let result = handler(serde_json::json!({})).await.unwrap();
        assert_eq!(result, serde_json::json!("h2"));
    }

    #[test]
    fn test_listeners_observe_lifecycle() {
        let registry = LocalToolRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        registry.on_change("x", move |state| {
            seen_clone.lock().push(state);
        });

        registry.register(ToolDefinition::new("x", "d"), noop_handler());
        registry.unregister("x");

        let events = seen.lock().clone();
        assert_eq!(
            events,
            vec![
                Some(RegistrationState {
                    ref_count: 1,
                    is_registered: false
                }),
                None,
            ]
        );
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry = LocalToolRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        registry.on_change("x", |_| panic!("bad listener"));
        let calls_clone = Arc::clone(&calls);
        registry.on_change("x", move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.register(ToolDefinition::new("x", "d"), noop_handler());

        // Registration completed and the second listener still ran.
        assert!(registry.is_registered("x"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
