//! Mirror of the local tool set into the native model-context surface
//!
//! When the browser exposes `navigator.modelContext`, every tool the
//! worker has accepted is also registered natively so on-device agents
//! can discover it without the remote proxy. All surface operations are
//! best effort: failures are logged and the mirror's registered set is
//! pruned so it never claims a tool the surface lost.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use tabcast_core::{ModelContextSurface, NativeTool, ToolDefinition, ToolHandler};

use crate::registry::LocalToolRegistry;

pub struct NativeMirror {
    surface: Option<Arc<dyn ModelContextSurface>>,
    registered: Mutex<HashSet<String>>,
    enabled: AtomicBool,
}

impl NativeMirror {
    pub fn new(surface: Option<Arc<dyn ModelContextSurface>>, enabled: bool) -> Self {
        Self {
            surface,
            registered: Mutex::new(HashSet::new()),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Whether the platform exposes a surface at all.
    pub fn is_available(&self) -> bool {
        self.surface.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Names currently registered on the surface.
    pub fn registered_names(&self) -> Vec<String> {
        self.registered.lock().iter().cloned().collect()
    }

    /// Register or update one tool on the surface.
    ///
    /// The native API forbids duplicate names, so an update unregisters
    /// first; both steps are best effort.
    pub fn register(&self, definition: &ToolDefinition, handler: ToolHandler) {
        if !self.is_enabled() {
            return;
        }
        let Some(surface) = &self.surface else {
            return;
        };

        let name = definition.name.clone();
        if self.registered.lock().contains(&name) {
            if let Err(err) = surface.unregister_tool(&name) {
                debug!(tool = %name, %err, "native unregister before update failed");
            }
        }

        let tool = NativeTool {
            name: name.clone(),
            description: definition.description.clone(),
            input_schema: definition.input_schema.clone(),
            read_only: definition
                .annotations
                .as_ref()
                .and_then(|a| a.read_only_hint)
                .unwrap_or(false),
            execute: handler,
        };

        match surface.register_tool(tool) {
            Ok(()) => {
                self.registered.lock().insert(name);
            }
            Err(err) => {
                warn!(tool = %name, %err, "native tool registration failed");
                self.registered.lock().remove(&name);
            }
        }
    }

    /// Remove one tool from the surface.
    pub fn unregister(&self, name: &str) {
        let Some(surface) = &self.surface else {
            return;
        };
        if !self.registered.lock().remove(name) {
            return;
        }
        if let Err(err) = surface.unregister_tool(name) {
            warn!(tool = %name, %err, "native tool unregistration failed");
        }
    }

    /// Drop everything from the surface, preferring `clearContext` with a
    /// per-name fallback.
    pub fn clear(&self) {
        let Some(surface) = &self.surface else {
            return;
        };
        let names: Vec<String> = {
            let mut registered = self.registered.lock();
            registered.drain().collect()
        };
        if let Err(err) = surface.clear_context() {
            debug!(%err, "clearContext failed; unregistering per name");
            for name in &names {
                if let Err(err) = surface.unregister_tool(name) {
                    warn!(tool = %name, %err, "native tool unregistration failed");
                }
            }
        }
    }

    /// Toggle mirroring at runtime: disabling flushes the surface,
    /// enabling repopulates it from the local registry.
    pub fn set_enabled(&self, enabled: bool, registry: &LocalToolRegistry) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was == enabled {
            return;
        }
        if enabled {
            for (definition, handler) in registry.snapshot() {
                self.register(&definition, handler);
            }
        } else {
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tabcast_core::{BridgeError, BridgeResult};

    #[derive(Default)]
    struct MockSurface {
        tools: Mutex<HashSet<String>>,
        clears: AtomicU32,
        fail_clear: AtomicBool,
        fail_register: AtomicBool,
    }

    impl ModelContextSurface for MockSurface {
        fn register_tool(&self, tool: NativeTool) -> BridgeResult<()> {
            if self.fail_register.load(Ordering::SeqCst) {
                return Err(BridgeError::RegistrationFailed("surface down".to_string()));
            }
            let mut tools = self.tools.lock();
            if !tools.insert(tool.name.clone()) {
                return Err(BridgeError::RegistrationFailed(format!(
                    "duplicate tool: {}",
                    tool.name
                )));
            }
            Ok(())
        }

        fn unregister_tool(&self, name: &str) -> BridgeResult<()> {
            self.tools.lock().remove(name);
            Ok(())
        }

        fn clear_context(&self) -> BridgeResult<()> {
            if self.fail_clear.load(Ordering::SeqCst) {
                return Err(BridgeError::RegistrationFailed("no clearContext".to_string()));
            }
            self.clears.fetch_add(1, Ordering::SeqCst);
            self.tools.lock().clear();
            Ok(())
        }
    }

    fn handler() -> ToolHandler {
        Arc::new(|_args| Box::pin(async { Ok(serde_json::json!(null)) }))
    }

    #[test]
    fn test_register_is_idempotent_on_update() {
        let surface = Arc::new(MockSurface::default());
        let mirror = NativeMirror::new(Some(surface.clone()), true);

        let def = ToolDefinition::new("x", "d");
        mirror.register(&def, handler());
        // Second register with the same name must not trip the duplicate check.
        mirror.register(&def, handler());

        assert_eq!(mirror.registered_names(), vec!["x".to_string()]);
        assert!(surface.tools.lock().contains("x"));
    }

    #[test]
    fn test_failed_register_prunes_set() {
        let surface = Arc::new(MockSurface::default());
        surface.fail_register.store(true, Ordering::SeqCst);
        let mirror = NativeMirror::new(Some(surface), true);

        mirror.register(&ToolDefinition::new("x", "d"), handler());
        assert!(mirror.registered_names().is_empty());
    }

    #[test]
    fn test_clear_falls_back_per_name() {
        let surface = Arc::new(MockSurface::default());
        let mirror = NativeMirror::new(Some(surface.clone()), true);
        mirror.register(&ToolDefinition::new("a", "d"), handler());
        mirror.register(&ToolDefinition::new("b", "d"), handler());

        surface.fail_clear.store(true, Ordering::SeqCst);
        mirror.clear();

        assert_eq!(surface.clears.load(Ordering::SeqCst), 0);
        assert!(surface.tools.lock().is_empty());
        assert!(mirror.registered_names().is_empty());
    }

    #[test]
    fn test_toggle_flushes_and_repopulates() {
        let surface = Arc::new(MockSurface::default());
        let mirror = NativeMirror::new(Some(surface.clone()), true);
        let registry = LocalToolRegistry::new();
        registry.register(ToolDefinition::new("x", "d"), handler());
        mirror.register(&ToolDefinition::new("x", "d"), handler());

        mirror.set_enabled(false, &registry);
        assert!(surface.tools.lock().is_empty());

        mirror.set_enabled(true, &registry);
        assert!(surface.tools.lock().contains("x"));
    }

    #[test]
    fn test_absent_surface_is_noop() {
        let mirror = NativeMirror::new(None, true);
        mirror.register(&ToolDefinition::new("x", "d"), handler());
        mirror.clear();
        assert!(!mirror.is_available());
        assert!(mirror.registered_names().is_empty());
    }
}
