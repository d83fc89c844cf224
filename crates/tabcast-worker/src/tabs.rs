//! Tab table, tool→tabs index, and the routing policy
//!
//! The worker owns this state exclusively; all mutation happens on the
//! hub's message path. Tool→tabs sets keep insertion order so the
//! "first by iteration order" fallback is deterministic.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use tabcast_core::TabInfo;

#[derive(Debug, Clone)]
pub struct TabRecord {
    pub tab_id: String,
    pub url: String,
    pub title: String,
    pub last_seen: DateTime<Utc>,
}

/// Why a tab was chosen for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    /// The caller named this tab and it provides the tool.
    ExplicitTarget,
    /// Only one tab provides the tool; focus is irrelevant.
    OnlyTab,
    /// The focused tab provides the tool.
    ActiveTab,
    /// The focused tab lacks the tool; fell back to the first provider.
    ActiveLacksTool,
    /// Nothing is focused; fell back to the first provider.
    NoActiveTab,
}

impl std::fmt::Display for RouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RouteReason::ExplicitTarget => "explicit target",
            RouteReason::OnlyTab => "only tab",
            RouteReason::ActiveTab => "active tab",
            RouteReason::ActiveLacksTool => "active lacks tool",
            RouteReason::NoActiveTab => "no active tab",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub target_tab_id: String,
    pub reason: RouteReason,
}

/// Why routing produced no target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteFailure {
    /// No tab has registered the tool (the set is empty).
    UnknownTool,
    /// The caller named a tab that does not provide the tool.
    TabNotHolding { available: Vec<String> },
}

/// Outcome of removing one `(tool, tab)` registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnregisterOutcome {
    /// The set became empty and the tool must be withdrawn.
    pub was_removed: bool,
    pub remaining_tabs: usize,
    pub was_active_tab: bool,
}

#[derive(Default)]
pub struct TabManager {
    tabs: HashMap<String, TabRecord>,
    active_tab: Option<String>,
    /// Tool name → providing tabs, in registration order.
    tool_tabs: HashMap<String, Vec<String>>,
}

impl TabManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or refresh a tab record. `timestamp` is the tab's clock in
    /// epoch milliseconds; an unparseable value falls back to now.
    pub fn register_tab(
        &mut self,
        tab_id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        timestamp: Option<u64>,
    ) {
        let tab_id = tab_id.into();
        let last_seen = timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single())
            .unwrap_or_else(Utc::now);
        self.tabs.insert(
            tab_id.clone(),
            TabRecord {
                tab_id,
                url: url.into(),
                title: title.into(),
                last_seen,
            },
        );
    }

    /// Focus tracking. Unknown tabs are ignored; exactly one tab is
    /// active, or none.
    pub fn set_active_tab(&mut self, tab_id: &str) {
        if self.tabs.contains_key(tab_id) {
            self.active_tab = Some(tab_id.to_string());
        } else {
            debug!(tab_id, "ignoring SET_ACTIVE_TAB for unknown tab");
        }
    }

    pub fn active_tab(&self) -> Option<&str> {
        self.active_tab.as_deref()
    }

    pub fn touch(&mut self, tab_id: &str) {
        if let Some(record) = self.tabs.get_mut(tab_id) {
            record.last_seen = Utc::now();
        }
    }

    pub fn contains(&self, tab_id: &str) -> bool {
        self.tabs.contains_key(tab_id)
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    /// Remove a tab and cascade through the tool index. Returns the tool
    /// names whose provider set became empty, so the advertised registry
    /// can withdraw them.
    pub fn remove_tab(&mut self, tab_id: &str) -> Vec<String> {
        self.tabs.remove(tab_id);
        if self.active_tab.as_deref() == Some(tab_id) {
            self.active_tab = None;
        }

        let mut emptied = Vec::new();
        self.tool_tabs.retain(|name, holders| {
            holders.retain(|holder| holder != tab_id);
            if holders.is_empty() {
                emptied.push(name.clone());
                false
            } else {
                true
            }
        });
        emptied
    }

    /// Record that `tab_id` provides `name`. Returns whether this is the
    /// first providing tab, i.e. the tool must be advertised.
    pub fn register_tool_for_tab(&mut self, name: &str, tab_id: &str) -> bool {
        let holders = self.tool_tabs.entry(name.to_string()).or_default();
        let first_tab = holders.is_empty();
        if !holders.iter().any(|holder| holder == tab_id) {
            holders.push(tab_id.to_string());
        }
        first_tab
    }

    /// Remove the `(name, tab_id)` entry. `None` when the pair was not
    /// registered.
    pub fn unregister_tool_from_tab(
        &mut self,
        name: &str,
        tab_id: &str,
    ) -> Option<UnregisterOutcome> {
        let holders = self.tool_tabs.get_mut(name)?;
        let before = holders.len();
        holders.retain(|holder| holder != tab_id);
        if holders.len() == before {
            return None;
        }

        let remaining_tabs = holders.len();
        let was_removed = remaining_tabs == 0;
        if was_removed {
            self.tool_tabs.remove(name);
        }
        Some(UnregisterOutcome {
            was_removed,
            remaining_tabs,
            was_active_tab: self.active_tab.as_deref() == Some(tab_id),
        })
    }

    /// Tabs currently providing `name`, in registration order.
    pub fn holders(&self, name: &str) -> Vec<String> {
        self.tool_tabs.get(name).cloned().unwrap_or_default()
    }

    /// The routing policy, as a single ordered decision tree.
    pub fn route_tool_call(
        &self,
        name: &str,
        explicit_tab_id: Option<&str>,
    ) -> Result<RouteDecision, RouteFailure> {
        let holders = match self.tool_tabs.get(name) {
            Some(holders) if !holders.is_empty() => holders,
            _ => return Err(RouteFailure::UnknownTool),
        };

        if let Some(explicit) = explicit_tab_id {
            if holders.iter().any(|holder| holder == explicit) {
                return Ok(RouteDecision {
                    target_tab_id: explicit.to_string(),
                    reason: RouteReason::ExplicitTarget,
                });
            }
            return Err(RouteFailure::TabNotHolding {
                available: holders.clone(),
            });
        }

        if holders.len() == 1 {
            return Ok(RouteDecision {
                target_tab_id: holders[0].clone(),
                reason: RouteReason::OnlyTab,
            });
        }

        if let Some(active) = self.active_tab.as_deref() {
            if holders.iter().any(|holder| holder == active) {
                return Ok(RouteDecision {
                    target_tab_id: active.to_string(),
                    reason: RouteReason::ActiveTab,
                });
            }
            return Ok(RouteDecision {
                target_tab_id: holders[0].clone(),
                reason: RouteReason::ActiveLacksTool,
            });
        }

        Ok(RouteDecision {
            target_tab_id: holders[0].clone(),
            reason: RouteReason::NoActiveTab,
        })
    }

    /// The tab table as broadcast to tabs and returned by the built-in
    /// discovery tool.
    pub fn snapshot(&self) -> Vec<TabInfo> {
        let mut tabs: Vec<TabInfo> = self
            .tabs
            .values()
            .map(|record| TabInfo {
                tab_id: record.tab_id.clone(),
                url: record.url.clone(),
                title: record.title.clone(),
                is_active: self.active_tab.as_deref() == Some(record.tab_id.as_str()),
                last_seen: record.last_seen,
            })
            .collect();
        tabs.sort_by(|a, b| a.tab_id.cmp(&b.tab_id));
        tabs
    }
}
