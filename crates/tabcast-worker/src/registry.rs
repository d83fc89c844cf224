//! Canonical tool registry advertised to MCP clients
//!
//! One entry per tool name. The stored handler is always a generated
//! proxy: routing, `callId` correlation, and the broadcast to tabs all
//! live behind it. A name appears here iff at least one tab currently
//! provides the tool.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;

use tabcast_core::{BridgeResult, ToolDefinition};

/// Worker-side proxy handler: `(args, explicit target tab) -> result`.
pub type ProxyHandler =
    Arc<dyn Fn(Value, Option<String>) -> BoxFuture<'static, BridgeResult<Value>> + Send + Sync>;

#[derive(Default)]
pub struct AdvertisedRegistry {
    definitions: DashMap<String, ToolDefinition>,
    handlers: DashMap<String, ProxyHandler>,
}

impl AdvertisedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise a tool. The first registration for a name wins; callers
    /// only insert on the first providing tab.
    pub fn insert(&self, definition: ToolDefinition, handler: ProxyHandler) {
        let name = definition.name.clone();
        self.definitions.insert(name.clone(), definition);
        self.handlers.insert(name, handler);
    }

    /// Withdraw a tool. Returns whether it was advertised.
    pub fn remove(&self, name: &str) -> bool {
        self.handlers.remove(name);
        self.definitions.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn handler(&self, name: &str) -> Option<ProxyHandler> {
        self.handlers.get(name).map(|h| h.value().clone())
    }

    /// All advertised definitions, name-ordered for stable listings.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .definitions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn null_proxy() -> ProxyHandler {
        Arc::new(|_args, _tab| Box::pin(async { Ok(json!(null)) }))
    }

    #[test]
    fn test_insert_and_remove() {
        let registry = AdvertisedRegistry::new();
        registry.insert(ToolDefinition::new("calc", "d"), null_proxy());
        assert!(registry.contains("calc"));
        assert!(registry.handler("calc").is_some());

        assert!(registry.remove("calc"));
        assert!(!registry.contains("calc"));
        assert!(registry.handler("calc").is_none());
        assert!(!registry.remove("calc"));
    }

    #[test]
    fn test_definitions_are_name_ordered() {
        let registry = AdvertisedRegistry::new();
        registry.insert(ToolDefinition::new("zeta", "d"), null_proxy());
        registry.insert(ToolDefinition::new("alpha", "d"), null_proxy());
        let names: Vec<String> = registry
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
