//! Tab identity: a session-scoped UUID that survives reload, not duplication

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use tabcast_core::SessionStore;

/// Storage key for the tab UUID.
pub const TAB_ID_STORAGE_KEY: &str = "tabcast_tab_id";

/// Resolve this tab's id: reuse the stored one, otherwise mint a v4 UUID
/// and try to persist it. With no usable store (private modes), the id is
/// a random fallback scoped to this process.
pub fn resolve_tab_id(store: Option<&dyn SessionStore>) -> String {
    let Some(store) = store else {
        return Uuid::new_v4().to_string();
    };

    if let Some(existing) = store.get(TAB_ID_STORAGE_KEY) {
        if !existing.is_empty() {
            return existing;
        }
    }

    let id = Uuid::new_v4().to_string();
    if !store.set(TAB_ID_STORAGE_KEY, &id) {
        debug!("session store refused the tab id; using a non-persisted one");
    }
    id
}

/// In-memory [`SessionStore`], one per simulated tab session.
#[derive(Default)]
pub struct MemorySessionStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        self.values
            .lock()
            .insert(key.to_string(), value.to_string());
        true
    }
}
