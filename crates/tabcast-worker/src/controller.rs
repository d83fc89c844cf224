//! The worker's single coordinator
//!
//! Owns the tab manager, the advertised registry, the pending-call
//! table, and the link. Tab ports attach here; every envelope a tab
//! sends lands in [`ControllerInner::handle_port_message`]. Proxy
//! handlers generated per advertised tool close the loop: route, assign
//! a `callId`, broadcast `CALL_TOOL`, await the correlated result.
//!
//! REGISTER_TOOL requests that arrive before the MCP transport is bound
//! are queued and drained in FIFO order at the first link open.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use jsonrpc_core::IoHandler;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use tabcast_core::{
    port_pair, BridgeError, BridgeResult, Envelope, MessagePort, PortMessage, PortSender, Reply,
    TabInfo, ToolDefinition, WorkerConfig,
};

use crate::link::WsLink;
use crate::pending::PendingCalls;
use crate::registry::{AdvertisedRegistry, ProxyHandler};
use crate::server::build_dispatcher;
use crate::tabs::{RouteFailure, TabManager};

struct QueuedRegistration {
    definition: ToolDefinition,
    tab_id: String,
    ack: Option<oneshot::Sender<Reply>>,
}

struct ControllerInner {
    config: WorkerConfig,
    tabs: RwLock<TabManager>,
    registry: Arc<AdvertisedRegistry>,
    pending: PendingCalls,
    ports: DashMap<u64, PortSender>,
    port_tabs: DashMap<u64, String>,
    next_port_id: AtomicU64,
    /// Latches true at the first link open; registrations queue until then.
    ready: AtomicBool,
    queued: Mutex<Vec<QueuedRegistration>>,
    connected: AtomicBool,
    link: OnceCell<Arc<WsLink>>,
    dispatcher: Arc<IoHandler>,
    link_events: mpsc::UnboundedSender<bool>,
}

/// Worker-side MCP controller; clones share one hub.
#[derive(Clone)]
pub struct McpController {
    inner: Arc<ControllerInner>,
}

impl McpController {
    pub fn new(config: WorkerConfig) -> Self {
        let registry = Arc::new(AdvertisedRegistry::new());
        let dispatcher = Arc::new(build_dispatcher(Arc::clone(&registry)));
        let (link_events, mut events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(ControllerInner {
            config,
            tabs: RwLock::new(TabManager::new()),
            registry,
            pending: PendingCalls::new(),
            ports: DashMap::new(),
            port_tabs: DashMap::new(),
            next_port_id: AtomicU64::new(1),
            ready: AtomicBool::new(false),
            queued: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            link: OnceCell::new(),
            dispatcher,
            link_events,
        });

        ControllerInner::register_builtin_tools(&inner);

        let pump = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(connected) = events_rx.recv().await {
                let Some(inner) = pump.upgrade() else { break };
                ControllerInner::on_link_event(&inner, connected);
            }
        });

        Self { inner }
    }

    /// Attach a new tab port. The port is immediately greeted with
    /// CONNECTION_STATUS (the worker-alive handshake); its messages are
    /// consumed for as long as the tab keeps its end open.
    pub fn attach_port(&self) -> MessagePort {
        let (worker_end, tab_end) = port_pair();
        let (sender, mut receiver) = worker_end.split();
        let port_id = self.inner.next_port_id.fetch_add(1, Ordering::SeqCst);
        self.inner.ports.insert(port_id, sender.clone());

        let _ = sender.send(Envelope::ConnectionStatus {
            connected: self.inner.connected.load(Ordering::SeqCst),
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                ControllerInner::handle_port_message(&inner, port_id, message);
            }
            ControllerInner::handle_port_closed(&inner, port_id);
        });

        tab_end
    }

    /// Dispatch one MCP JSON-RPC request, as the link does per frame.
    pub async fn handle_rpc(&self, request: &str) -> Option<String> {
        self.inner.dispatcher.handle_request(request).await
    }

    pub fn dispatcher(&self) -> Arc<IoHandler> {
        Arc::clone(&self.inner.dispatcher)
    }

    pub fn advertised(&self) -> Arc<AdvertisedRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn tabs_snapshot(&self) -> Vec<TabInfo> {
        self.inner.tabs.read().snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Dial the proxy using the configured link URL (used by embeddings
    /// that do not go through a tab INIT).
    pub fn connect_link(&self, token: Option<String>) -> BridgeResult<()> {
        let link = ControllerInner::ensure_link(&self.inner, None);
        if let Some(token) = token {
            link.set_token(token);
        }
        link.connect()
    }

    /// The MCP transport came up: drain queued registrations and tell
    /// the tabs. Invoked by the link pump; callable directly by
    /// embeddings that bind their own transport.
    pub fn transport_opened(&self) {
        ControllerInner::on_link_event(&self.inner, true);
    }

    /// The MCP transport went down.
    pub fn transport_closed(&self) {
        ControllerInner::on_link_event(&self.inner, false);
    }
}

impl ControllerInner {
    fn register_builtin_tools(inner: &Arc<ControllerInner>) {
        let definition = ToolDefinition::new(
            "list_browser_tabs",
            "List the open browser tabs known to this worker, including the tab ids used to \
             target tool calls at a specific tab",
        )
        .with_schema(json!({"type": "object", "properties": {}}))
        .read_only();

        let weak = Arc::downgrade(inner);
        let proxy: ProxyHandler = Arc::new(move |_args, _explicit_tab| {
            let weak = weak.clone();
            Box::pin(async move {
                let inner = weak.upgrade().ok_or(BridgeError::ChannelClosed)?;
                let tabs = inner.tabs.read().snapshot();
                Ok(serde_json::to_value(tabs)?)
            })
        });
        inner.registry.insert(definition, proxy);
    }

    fn ensure_link(inner: &Arc<ControllerInner>, url_override: Option<String>) -> Arc<WsLink> {
        inner
            .link
            .get_or_init(|| {
                let mut link_config = inner.config.link.clone();
                if let Some(url) = url_override {
                    link_config.url = url;
                }
                Arc::new(WsLink::new(
                    link_config,
                    Arc::clone(&inner.dispatcher),
                    inner.link_events.clone(),
                ))
            })
            .clone()
    }

    fn handle_port_message(inner: &Arc<ControllerInner>, port_id: u64, message: PortMessage) {
        let PortMessage { envelope, reply } = message;
        match envelope {
            Envelope::Init { backend_url, token } => {
                let link = Self::ensure_link(inner, Some(backend_url));
                if let Some(token) = token {
                    link.set_token(token);
                }
                match link.connect() {
                    Ok(()) => {}
                    Err(BridgeError::AuthGated) => {
                        debug!("link waiting for an auth token before dialing");
                    }
                    Err(err) => warn!(%err, "link connect failed"),
                }
                respond(reply, Reply::ok());
            }
            Envelope::SetAuthToken { token } => {
                let link = Self::ensure_link(inner, None);
                link.set_token(token);
                if let Err(err) = link.connect() {
                    debug!(%err, "link connect deferred");
                }
            }
            Envelope::RegisterTab {
                tab_id,
                url,
                title,
                timestamp,
            } => {
                inner.port_tabs.insert(port_id, tab_id.clone());
                inner
                    .tabs
                    .write()
                    .register_tab(tab_id, url, title, Some(timestamp));
                Self::broadcast_tab_list(inner);
            }
            Envelope::SetActiveTab { tab_id } => {
                {
                    let mut tabs = inner.tabs.write();
                    tabs.set_active_tab(&tab_id);
                    tabs.touch(&tab_id);
                }
                Self::broadcast_tab_list(inner);
            }
            Envelope::RegisterTool {
                definition,
                handler_type: _,
                tab_id,
            } => {
                let mut queued = inner.queued.lock();
                if inner.ready.load(Ordering::SeqCst) {
                    drop(queued);
                    let outcome = Self::do_register(inner, definition, &tab_id);
                    respond(reply, outcome);
                } else {
                    debug!(
                        tool = %definition.name,
                        "queueing registration until the MCP transport is bound"
                    );
                    queued.push(QueuedRegistration {
                        definition,
                        tab_id,
                        ack: reply,
                    });
                }
            }
            Envelope::UnregisterTool { name, tab_id } => {
                let outcome = inner.tabs.write().unregister_tool_from_tab(&name, &tab_id);
                let result = match outcome {
                    Some(outcome) => {
                        if outcome.was_removed {
                            inner.registry.remove(&name);
                            info!(tool = %name, "tool withdrawn");
                        }
                        Reply::ok()
                    }
                    None => Reply::err(format!(
                        "tool '{name}' is not registered by tab '{tab_id}'"
                    )),
                };
                respond(reply, result);
            }
            Envelope::GetConnectionStatus => {
                respond(
                    reply,
                    Reply::ok_with("connected", json!(inner.connected.load(Ordering::SeqCst))),
                );
            }
            Envelope::ToolCallResult {
                call_id,
                success,
                result,
                error,
            } => {
                let outcome = if success {
                    Ok(result.unwrap_or(Value::Null))
                } else {
                    Err(BridgeError::Handler(
                        error.unwrap_or_else(|| "tool handler failed".to_string()),
                    ))
                };
                inner.pending.complete(&call_id, outcome);
            }
            Envelope::GetEvents | Envelope::StoreEvent { .. } => {
                // Event tracking lives outside this worker.
                respond(reply, Reply::err("event tracker is not available"));
            }
            other => {
                debug!(kind = other.kind(), "unexpected envelope from tab");
            }
        }
    }

    fn handle_port_closed(inner: &Arc<ControllerInner>, port_id: u64) {
        inner.ports.remove(&port_id);
        let Some((_, tab_id)) = inner.port_tabs.remove(&port_id) else {
            return;
        };
        let emptied = inner.tabs.write().remove_tab(&tab_id);
        for name in &emptied {
            inner.registry.remove(name);
        }
        if !emptied.is_empty() {
            info!(
                tab = %tab_id,
                withdrawn = emptied.len(),
                "tab went away; sole-provider tools withdrawn"
            );
        }
        Self::broadcast_tab_list(inner);
    }

    fn do_register(
        inner: &Arc<ControllerInner>,
        definition: ToolDefinition,
        tab_id: &str,
    ) -> Reply {
        let first_tab = {
            let mut tabs = inner.tabs.write();
            tabs.touch(tab_id);
            tabs.register_tool_for_tab(&definition.name, tab_id)
        };
        if first_tab {
            info!(tool = %definition.name, tab = %tab_id, "tool advertised");
            let proxy = Self::make_proxy(inner, definition.name.clone());
            inner.registry.insert(definition, proxy);
        }
        Reply::ok()
    }

    /// The generated proxy handler for one advertised tool.
    fn make_proxy(inner: &Arc<ControllerInner>, name: String) -> ProxyHandler {
        let weak = Arc::downgrade(inner);
        Arc::new(move |args, explicit_tab| {
            let weak = weak.clone();
            let name = name.clone();
            Box::pin(async move {
                let inner = weak.upgrade().ok_or(BridgeError::ChannelClosed)?;
                ControllerInner::call_tool(&inner, &name, args, explicit_tab.as_deref()).await
            })
        })
    }

    async fn call_tool(
        inner: &Arc<ControllerInner>,
        name: &str,
        args: Value,
        explicit_tab: Option<&str>,
    ) -> BridgeResult<Value> {
        let decision = match inner.tabs.read().route_tool_call(name, explicit_tab) {
            Ok(decision) => decision,
            Err(RouteFailure::UnknownTool) => {
                return Err(BridgeError::NoRouteForTool {
                    tool: name.to_string(),
                    reason: "no tabs have registered this tool".to_string(),
                });
            }
            Err(RouteFailure::TabNotHolding { available }) => {
                return Err(BridgeError::NoRouteForTool {
                    tool: name.to_string(),
                    reason: format!(
                        "requested tab does not provide it; tabs providing it: [{}]",
                        available.join(", ")
                    ),
                });
            }
        };

        let (call_id, rx) = inner.pending.create();
        debug!(
            tool = name,
            target = %decision.target_tab_id,
            reason = %decision.reason,
            call_id = %call_id,
            "routing tool call"
        );
        Self::broadcast(
            inner,
            Envelope::CallTool {
                tool_name: name.to_string(),
                args,
                call_id: call_id.clone(),
                target_tab_id: Some(decision.target_tab_id),
            },
        );

        inner
            .pending
            .wait(
                &call_id,
                rx,
                Duration::from_secs(inner.config.call_timeout_secs),
            )
            .await
    }

    fn on_link_event(inner: &Arc<ControllerInner>, connected: bool) {
        inner.connected.store(connected, Ordering::SeqCst);
        if connected {
            Self::drain_registrations(inner);
        }
        Self::broadcast(inner, Envelope::ConnectionStatus { connected });
    }

    fn drain_registrations(inner: &Arc<ControllerInner>) {
        loop {
            let batch: Vec<QueuedRegistration> = {
                let mut queued = inner.queued.lock();
                if queued.is_empty() {
                    inner.ready.store(true, Ordering::SeqCst);
                    break;
                }
                std::mem::take(&mut *queued)
            };
            for item in batch {
                let outcome = Self::do_register(inner, item.definition, &item.tab_id);
                respond(item.ack, outcome);
            }
        }
    }

    fn broadcast(inner: &ControllerInner, envelope: Envelope) {
        for port in inner.ports.iter() {
            let _ = port.value().send(envelope.clone());
        }
    }

    fn broadcast_tab_list(inner: &ControllerInner) {
        let tabs = inner.tabs.read().snapshot();
        Self::broadcast(inner, Envelope::TabListUpdated { tabs });
    }
}

fn respond(reply: Option<oneshot::Sender<Reply>>, value: Reply) {
    if let Some(tx) = reply {
        let _ = tx.send(value);
    }
}
