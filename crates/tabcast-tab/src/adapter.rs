//! Per-tab facade over the shared worker
//!
//! One adapter per tab. It owns the tab's identity, the local tool
//! registry, and the native mirror; everything worker-facing flows
//! through a single bound channel. Calls made before the worker
//! handshake completes are parked in a FIFO and flushed after init, so
//! registration composes with reference counting even while the worker
//! is still coming up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{oneshot, watch};
use tracing::debug;

use tabcast_core::{
    BridgeError, BridgeResult, Envelope, ModelContextSurface, SessionStore, TabInfo,
    ToolDefinition, ToolHandler, WorkerHost, HANDLER_TYPE_PROXY,
};

use crate::mirror::NativeMirror;
use crate::registry::LocalToolRegistry;
use crate::session::resolve_tab_id;
use crate::transport::{connect_channel, ChannelKind, PortChannel, WorkerChannel};

/// The document this tab is showing, as reported to the worker.
#[derive(Debug, Clone)]
pub struct TabPage {
    pub url: String,
    pub title: String,
}

impl TabPage {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

struct QueuedRegistration {
    name: String,
    ack: oneshot::Sender<BridgeResult<()>>,
}

#[derive(Default)]
struct PendingQueue {
    /// Set once the post-init flush has drained the queue; later
    /// registrations go straight to the worker.
    flushed: bool,
    items: Vec<QueuedRegistration>,
}

struct AdapterInner {
    config: tabcast_core::TabConfig,
    page: TabPage,
    host: Arc<dyn WorkerHost>,
    tab_id: String,
    registry: Arc<LocalToolRegistry>,
    mirror: Arc<NativeMirror>,
    channel: OnceCell<Arc<PortChannel>>,
    pending: Mutex<PendingQueue>,
    buffered_token: Mutex<Option<String>>,
    status_listeners: Mutex<Vec<Box<dyn Fn(bool) + Send + Sync>>>,
    last_status: AtomicBool,
    tabs: Mutex<Vec<TabInfo>>,
    init_started: AtomicBool,
    init_tx: watch::Sender<bool>,
}

/// Per-tab entry point to the multi-tab MCP runtime.
#[derive(Clone)]
pub struct TabAdapter {
    inner: Arc<AdapterInner>,
}

impl TabAdapter {
    pub fn new(
        config: tabcast_core::TabConfig,
        page: TabPage,
        host: Arc<dyn WorkerHost>,
        store: Option<Arc<dyn SessionStore>>,
        surface: Option<Arc<dyn ModelContextSurface>>,
    ) -> Self {
        let tab_id = resolve_tab_id(store.as_deref());
        let mirror_enabled = config.mirror_enabled;
        let (init_tx, _init_rx) = watch::channel(false);
        Self {
            inner: Arc::new(AdapterInner {
                config,
                page,
                host,
                tab_id,
                registry: Arc::new(LocalToolRegistry::new()),
                mirror: Arc::new(NativeMirror::new(surface, mirror_enabled)),
                channel: OnceCell::new(),
                pending: Mutex::new(PendingQueue::default()),
                buffered_token: Mutex::new(None),
                status_listeners: Mutex::new(Vec::new()),
                last_status: AtomicBool::new(false),
                tabs: Mutex::new(Vec::new()),
                init_started: AtomicBool::new(false),
                init_tx,
            }),
        }
    }

    /// This tab's session-scoped UUID.
    pub fn tab_id(&self) -> &str {
        &self.inner.tab_id
    }

    /// Which worker variant the adapter bound to, once initialized.
    pub fn channel_kind(&self) -> Option<ChannelKind> {
        self.inner.channel.get().map(|c| c.kind())
    }

    pub fn registry(&self) -> Arc<LocalToolRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn mirror(&self) -> Arc<NativeMirror> {
        Arc::clone(&self.inner.mirror)
    }

    /// Connect to the worker and run the init protocol.
    ///
    /// Concurrent callers after the first one wait for that attempt to
    /// finish. A failed attempt clears the guard so init can be retried.
    pub async fn init(&self) -> BridgeResult<()> {
        if self.inner.init_started.swap(true, Ordering::SeqCst) {
            return self.wait_for_init().await;
        }
        match self.run_init().await {
            Ok(()) => {
                let _ = self.inner.init_tx.send(true);
                Ok(())
            }
            Err(err) => {
                self.inner.init_started.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Resolve once init has completed.
    pub async fn wait_for_init(&self) -> BridgeResult<()> {
        let mut rx = self.inner.init_tx.subscribe();
        loop {
            if *rx.borrow() {
                return Ok(());
            }
            rx.changed()
                .await
                .map_err(|_| BridgeError::ChannelClosed)?;
        }
    }

    async fn run_init(&self) -> BridgeResult<()> {
        let inner = &self.inner;
        let channel = Arc::new(connect_channel(inner.host.as_ref())?);
        let mut incoming = channel.take_incoming().ok_or_else(|| {
            BridgeError::TransportUnavailable("channel already bound".to_string())
        })?;

        // Worker-alive handshake: the hub greets every new port with
        // CONNECTION_STATUS.
        let handshake = Duration::from_millis(inner.config.init_timeout_ms);
        let connected = tokio::time::timeout(handshake, async {
            while let Some(msg) = incoming.recv().await {
                if let Envelope::ConnectionStatus { connected } = msg.envelope {
                    return Some(connected);
                }
            }
            None
        })
        .await
        .map_err(|_| {
            BridgeError::TransportUnavailable("worker did not answer the handshake".to_string())
        })?
        .ok_or(BridgeError::ChannelClosed)?;
        inner.last_status.store(connected, Ordering::SeqCst);

        let deadline = self.request_timeout();
        let token = inner.buffered_token.lock().clone();
        let reply = channel
            .send_with_reply(
                Envelope::Init {
                    backend_url: inner.config.backend_url.clone(),
                    token,
                },
                deadline,
            )
            .await?;
        if !reply.success {
            return Err(BridgeError::Worker(
                reply.error.unwrap_or_else(|| "INIT rejected".to_string()),
            ));
        }

        channel.send(Envelope::RegisterTab {
            tab_id: inner.tab_id.clone(),
            url: inner.page.url.clone(),
            title: inner.page.title.clone(),
            timestamp: Utc::now().timestamp_millis() as u64,
        })?;
        channel.send(Envelope::SetActiveTab {
            tab_id: inner.tab_id.clone(),
        })?;

        if inner.channel.set(Arc::clone(&channel)).is_err() {
            return Err(BridgeError::RegistrationFailed(
                "adapter already initialized".to_string(),
            ));
        }

        let loop_inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(msg) = incoming.recv().await {
                AdapterInner::handle_incoming(&loop_inner, msg.envelope);
            }
        });

        self.flush_pending(&channel, deadline).await;
        Ok(())
    }

    async fn flush_pending(&self, channel: &Arc<PortChannel>, deadline: Duration) {
        loop {
            let batch: Vec<QueuedRegistration> = {
                let mut pending = self.inner.pending.lock();
                if pending.items.is_empty() {
                    pending.flushed = true;
                    break;
                }
                std::mem::take(&mut pending.items)
            };
            for queued in batch {
                let result = self
                    .push_tool_to_worker(channel, &queued.name, deadline)
                    .await;
                let _ = queued.ack.send(result);
            }
        }
    }

    /// Send one REGISTER_TOOL and record the acknowledgement. Rolls the
    /// local refcount back when the worker does not accept the record.
    async fn push_tool_to_worker(
        &self,
        channel: &Arc<PortChannel>,
        name: &str,
        deadline: Duration,
    ) -> BridgeResult<()> {
        let Some(mut definition) = self.inner.registry.definition(name) else {
            // Unregistered while queued; nothing to tell the worker.
            return Ok(());
        };
        definition.input_schema = augment_schema(&definition.input_schema);

        let outcome = channel
            .send_with_reply(
                Envelope::RegisterTool {
                    definition,
                    handler_type: HANDLER_TYPE_PROXY.to_string(),
                    tab_id: self.inner.tab_id.clone(),
                },
                deadline,
            )
            .await
            .and_then(|reply| {
                if reply.success {
                    Ok(())
                } else {
                    Err(BridgeError::Worker(
                        reply
                            .error
                            .unwrap_or_else(|| "registration rejected".to_string()),
                    ))
                }
            });

        match outcome {
            Ok(()) => {
                self.inner.registry.mark_registered(name, true);
                if let (Some(def), Some(handler)) = (
                    self.inner.registry.definition(name),
                    self.inner.registry.handler(name),
                ) {
                    self.inner.mirror.register(&def, handler);
                }
                Ok(())
            }
            Err(err) => {
                self.inner.registry.unregister(name);
                Err(err)
            }
        }
    }

    /// Register a tool handler for this tab.
    ///
    /// The local record exists as soon as this is called; the returned
    /// future resolves when the worker has acknowledged the registration
    /// (immediately queued when the worker is still initializing).
    pub async fn register_tool(
        &self,
        definition: ToolDefinition,
        handler: ToolHandler,
    ) -> BridgeResult<()> {
        let name = definition.name.clone();
        self.inner.registry.register(definition, handler);

        let queued_rx = {
            let mut pending = self.inner.pending.lock();
            if pending.flushed {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                pending.items.push(QueuedRegistration {
                    name: name.clone(),
                    ack: tx,
                });
                Some(rx)
            }
        };

        match queued_rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(BridgeError::ChannelClosed)),
            None => {
                let channel = self.channel()?;
                self.push_tool_to_worker(&channel, &name, self.request_timeout())
                    .await
            }
        }
    }

    /// Release one reference to a tool. Returns whether the tool was
    /// fully removed from this tab (and withdrawn from the worker).
    pub async fn unregister_tool(&self, name: &str) -> BridgeResult<bool> {
        match self.inner.registry.unregister(name) {
            None | Some(false) => Ok(false),
            Some(true) => {
                self.inner.mirror.unregister(name);
                if let Some(channel) = self.inner.channel.get() {
                    let reply = channel
                        .send_with_reply(
                            Envelope::UnregisterTool {
                                name: name.to_string(),
                                tab_id: self.inner.tab_id.clone(),
                            },
                            self.request_timeout(),
                        )
                        .await?;
                    if !reply.success {
                        return Err(BridgeError::Worker(
                            reply
                                .error
                                .unwrap_or_else(|| "unregistration rejected".to_string()),
                        ));
                    }
                }
                Ok(true)
            }
        }
    }

    /// Buffer the auth token; forwarded immediately once init is done.
    pub fn set_auth_token(&self, token: impl Into<String>) -> BridgeResult<()> {
        let token = token.into();
        *self.inner.buffered_token.lock() = Some(token.clone());
        if let Some(channel) = self.inner.channel.get() {
            channel.send(Envelope::SetAuthToken { token })?;
        }
        Ok(())
    }

    /// Subscribe to link connectivity changes.
    pub fn on_connection_status(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        self.inner.status_listeners.lock().push(Box::new(listener));
    }

    /// Last observed link connectivity.
    pub fn connection_status(&self) -> bool {
        self.inner.last_status.load(Ordering::SeqCst)
    }

    /// Ask the worker for the link status. The local cache tracks
    /// broadcasts; this round-trips the port.
    pub async fn fetch_connection_status(&self) -> BridgeResult<bool> {
        let channel = self.channel()?;
        let reply = channel
            .send_with_reply(Envelope::GetConnectionStatus, self.request_timeout())
            .await?;
        if !reply.success {
            return Err(BridgeError::Worker(
                reply.error.unwrap_or_else(|| "status query failed".to_string()),
            ));
        }
        Ok(reply
            .data
            .get("connected")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    pub fn is_tool_registered(&self, name: &str) -> bool {
        self.inner.registry.is_registered(name)
    }

    pub fn registered_tools(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    /// Latest tab table broadcast by the worker.
    pub fn known_tabs(&self) -> Vec<TabInfo> {
        self.inner.tabs.lock().clone()
    }

    /// Toggle the native mirror; flushes or repopulates to match.
    pub fn set_mirror_enabled(&self, enabled: bool) {
        self.inner.mirror.set_enabled(enabled, &self.inner.registry);
    }

    /// Window focus / visibility-became-visible hook.
    pub fn handle_focus(&self) {
        if let Some(channel) = self.inner.channel.get() {
            let _ = channel.send(Envelope::SetActiveTab {
                tab_id: self.inner.tab_id.clone(),
            });
        }
    }

    /// Page unload hook (`beforeunload` / `pagehide`): best-effort
    /// withdrawal of every local tool, then the port is dropped so the
    /// worker reaps the tab record.
    pub fn handle_unload(&self) {
        if let Some(channel) = self.inner.channel.get() {
            for name in self.inner.registry.names() {
                let _ = channel.send(Envelope::UnregisterTool {
                    name,
                    tab_id: self.inner.tab_id.clone(),
                });
            }
            channel.close();
        }
        self.inner.mirror.clear();
    }

    fn channel(&self) -> BridgeResult<Arc<PortChannel>> {
        self.inner
            .channel
            .get()
            .cloned()
            .ok_or(BridgeError::ChannelClosed)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.inner.config.request_timeout_ms)
    }
}

impl AdapterInner {
    fn handle_incoming(inner: &Arc<AdapterInner>, envelope: Envelope) {
        match envelope {
            Envelope::ConnectionStatus { connected } => {
                inner.last_status.store(connected, Ordering::SeqCst);
                for listener in inner.status_listeners.lock().iter() {
                    listener(connected);
                }
            }
            Envelope::CallTool {
                tool_name,
                args,
                call_id,
                target_tab_id,
            } => {
                if let Some(target) = &target_tab_id {
                    if target != &inner.tab_id {
                        return;
                    }
                }
                let task_inner = Arc::clone(inner);
                tokio::spawn(async move {
                    AdapterInner::execute_call(task_inner, tool_name, args, call_id).await;
                });
            }
            Envelope::TabListUpdated { tabs } => {
                *inner.tabs.lock() = tabs;
            }
            other => {
                debug!(kind = other.kind(), "ignoring worker message");
            }
        }
    }

    async fn execute_call(inner: Arc<AdapterInner>, tool_name: String, args: Value, call_id: String) {
        let envelope = match inner.registry.handler(&tool_name) {
            Some(handler) => match handler(args).await {
                Ok(result) => Envelope::ToolCallResult {
                    call_id,
                    success: true,
                    result: Some(result),
                    error: None,
                },
                Err(err) => Envelope::ToolCallResult {
                    call_id,
                    success: false,
                    result: None,
                    error: Some(err.to_string()),
                },
            },
            None => Envelope::ToolCallResult {
                call_id,
                success: false,
                result: None,
                error: Some(format!("tool '{tool_name}' is not registered in this tab")),
            },
        };
        if let Some(channel) = inner.channel.get() {
            if let Err(err) = channel.send(envelope) {
                debug!(%err, "failed to send tool call result");
            }
        }
    }
}

/// Add the optional top-level `tabId` targeting property to an input
/// schema. Purely additive: an existing `tabId` property is left alone.
fn augment_schema(schema: &Value) -> Value {
    let mut schema = schema.clone();
    if let Some(object) = schema.as_object_mut() {
        let properties = object
            .entry("properties".to_string())
            .or_insert_with(|| json!({}));
        if let Some(properties) = properties.as_object_mut() {
            properties.entry("tabId".to_string()).or_insert_with(|| {
                json!({
                    "type": "string",
                    "description": "Optional id of the tab that should service this call",
                })
            });
        }
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::poll;
    use tabcast_core::{port_pair, MessagePort, PortMessage, Reply, TabConfig};
    use tokio::sync::mpsc;

    struct ManualHost {
        tab_side: Mutex<Option<MessagePort>>,
    }

    impl WorkerHost for ManualHost {
        fn shared_channel(&self) -> BridgeResult<MessagePort> {
            self.tab_side
                .lock()
                .take()
                .ok_or_else(|| BridgeError::TransportUnavailable("no shared worker".to_string()))
        }

        fn service_channel(&self) -> BridgeResult<MessagePort> {
            Err(BridgeError::TransportUnavailable(
                "no service worker".to_string(),
            ))
        }
    }

    fn manual_host() -> (Arc<ManualHost>, MessagePort) {
        let (tab_side, worker_side) = port_pair();
        (
            Arc::new(ManualHost {
                tab_side: Mutex::new(Some(tab_side)),
            }),
            worker_side,
        )
    }

    fn adapter_with(host: Arc<ManualHost>) -> TabAdapter {
        TabAdapter::new(
            TabConfig::new("ws://localhost:4797/worker"),
            TabPage::new("https://app.example/one", "One"),
            host,
            None,
            None,
        )
    }

    fn echo_handler() -> ToolHandler {
        Arc::new(|args| Box::pin(async move { Ok(args) }))
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<PortMessage>) -> PortMessage {
        rx.recv().await.expect("worker port closed")
    }

    #[tokio::test]
    async fn test_init_register_and_call_round_trip() {
        let (host, worker_side) = manual_host();
        let adapter = adapter_with(host);
        let (w_tx, mut w_rx) = worker_side.split();
        w_tx.send(Envelope::ConnectionStatus { connected: true })
            .unwrap();

        let worker = tokio::spawn(async move {
            let msg = recv(&mut w_rx).await;
            assert_eq!(msg.envelope.kind(), "INIT");
            msg.reply.unwrap().send(Reply::ok()).unwrap();

            assert_eq!(recv(&mut w_rx).await.envelope.kind(), "REGISTER_TAB");
            assert_eq!(recv(&mut w_rx).await.envelope.kind(), "SET_ACTIVE_TAB");

            let msg = recv(&mut w_rx).await;
            match &msg.envelope {
                Envelope::RegisterTool {
                    definition,
                    handler_type,
                    ..
                } => {
                    assert_eq!(definition.name, "echo");
                    assert_eq!(handler_type, HANDLER_TYPE_PROXY);
                    // Schema augmentation exposes explicit targeting.
                    assert!(definition.input_schema["properties"]["tabId"].is_object());
                }
                other => panic!("unexpected envelope: {other:?}"),
            }
            msg.reply.unwrap().send(Reply::ok()).unwrap();

            w_tx.send(Envelope::CallTool {
                tool_name: "echo".to_string(),
                args: json!({"value": 7}),
                call_id: "c1".to_string(),
                target_tab_id: None,
            })
            .unwrap();

            let msg = recv(&mut w_rx).await;
            match msg.envelope {
                Envelope::ToolCallResult {
                    call_id,
                    success,
                    result,
                    ..
                } => {
                    assert_eq!(call_id, "c1");
                    assert!(success);
                    assert_eq!(result.unwrap(), json!({"value": 7}));
                }
                other => panic!("unexpected envelope: {other:?}"),
            }
        });

        adapter.init().await.unwrap();
        adapter
            .register_tool(ToolDefinition::new("echo", "Echo"), echo_handler())
            .await
            .unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_before_init_is_queued() {
        let (host, worker_side) = manual_host();
        let adapter = adapter_with(host);
        let (w_tx, mut w_rx) = worker_side.split();
        w_tx.send(Envelope::ConnectionStatus { connected: true })
            .unwrap();

        let register = adapter.register_tool(ToolDefinition::new("early", "d"), echo_handler());
        futures::pin_mut!(register);
        assert!(poll!(register.as_mut()).is_pending());

        // The local record is synchronously visible before init.
        assert!(adapter.is_tool_registered("early"));

        let worker = tokio::spawn(async move {
            let mut kinds = Vec::new();
            while let Some(msg) = w_rx.recv().await {
                kinds.push(msg.envelope.kind().to_string());
                if let Some(reply) = msg.reply {
                    let _ = reply.send(Reply::ok());
                }
                if kinds.last().map(String::as_str) == Some("REGISTER_TOOL") {
                    break;
                }
            }
            kinds
        });

        adapter.init().await.unwrap();
        register.await.unwrap();

        let kinds = worker.await.unwrap();
        assert_eq!(
            kinds,
            vec!["INIT", "REGISTER_TAB", "SET_ACTIVE_TAB", "REGISTER_TOOL"]
        );
    }

    #[tokio::test]
    async fn test_call_for_other_tab_is_ignored() {
        let (host, worker_side) = manual_host();
        let adapter = adapter_with(host);
        let tab_id = adapter.tab_id().to_string();
        let (w_tx, mut w_rx) = worker_side.split();
        w_tx.send(Envelope::ConnectionStatus { connected: true })
            .unwrap();

        let worker = tokio::spawn(async move {
            // INIT / REGISTER_TAB / SET_ACTIVE_TAB / REGISTER_TOOL
            for _ in 0..4 {
                let msg = recv(&mut w_rx).await;
                if let Some(reply) = msg.reply {
                    let _ = reply.send(Reply::ok());
                }
            }

            w_tx.send(Envelope::CallTool {
                tool_name: "echo".to_string(),
                args: json!({}),
                call_id: "for-someone-else".to_string(),
                target_tab_id: Some("another-tab".to_string()),
            })
            .unwrap();
            w_tx.send(Envelope::CallTool {
                tool_name: "echo".to_string(),
                args: json!({}),
                call_id: "for-us".to_string(),
                target_tab_id: Some(tab_id),
            })
            .unwrap();

            let msg = recv(&mut w_rx).await;
            match msg.envelope {
                Envelope::ToolCallResult { call_id, .. } => assert_eq!(call_id, "for-us"),
                other => panic!("unexpected envelope: {other:?}"),
            }
        });

        adapter.init().await.unwrap();
        adapter
            .register_tool(ToolDefinition::new("echo", "Echo"), echo_handler())
            .await
            .unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_rejection_rolls_back_local_record() {
        let (host, worker_side) = manual_host();
        let adapter = adapter_with(host);
        let (w_tx, mut w_rx) = worker_side.split();
        w_tx.send(Envelope::ConnectionStatus { connected: true })
            .unwrap();

        let worker = tokio::spawn(async move {
            loop {
                let msg = recv(&mut w_rx).await;
                let is_register_tool = msg.envelope.kind() == "REGISTER_TOOL";
                if let Some(reply) = msg.reply {
                    let _ = reply.send(if is_register_tool {
                        Reply::err("registry full")
                    } else {
                        Reply::ok()
                    });
                }
                if is_register_tool {
                    break;
                }
            }
        });

        adapter.init().await.unwrap();
        let err = adapter
            .register_tool(ToolDefinition::new("rejected", "d"), echo_handler())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Worker(_)));
        assert!(!adapter.is_tool_registered("rejected"));
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_unload_withdraws_tools_and_drops_port() {
        let (host, worker_side) = manual_host();
        let adapter = adapter_with(host);
        let (w_tx, mut w_rx) = worker_side.split();
        w_tx.send(Envelope::ConnectionStatus { connected: true })
            .unwrap();

        let worker = tokio::spawn(async move {
            let mut registered = 0;
            while registered < 2 {
                let msg = recv(&mut w_rx).await;
                if msg.envelope.kind() == "REGISTER_TOOL" {
                    registered += 1;
                }
                if let Some(reply) = msg.reply {
                    let _ = reply.send(Reply::ok());
                }
            }

            let mut withdrawn = Vec::new();
            while let Some(msg) = w_rx.recv().await {
                if let Envelope::UnregisterTool { name, .. } = msg.envelope {
                    withdrawn.push(name);
                }
            }
            // The port closed after the best-effort withdrawals.
            withdrawn.sort();
            assert_eq!(withdrawn, vec!["a".to_string(), "b".to_string()]);
        });

        adapter.init().await.unwrap();
        adapter
            .register_tool(ToolDefinition::new("a", "d"), echo_handler())
            .await
            .unwrap();
        adapter
            .register_tool(ToolDefinition::new("b", "d"), echo_handler())
            .await
            .unwrap();

        adapter.handle_unload();
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let (host, _worker_side) = manual_host();
        let adapter = adapter_with(host);
        // The worker never greets the port.
        let err = adapter.init().await.unwrap_err();
        assert!(matches!(err, BridgeError::TransportUnavailable(_)));
    }

    #[test]
    fn test_augment_schema_is_additive() {
        let schema = json!({
            "type": "object",
            "properties": {"amount": {"type": "number"}},
        });
        let augmented = augment_schema(&schema);
        assert!(augmented["properties"]["amount"].is_object());
        assert_eq!(augmented["properties"]["tabId"]["type"], json!("string"));

        // An existing tabId property is preserved untouched.
        let custom = json!({
            "type": "object",
            "properties": {"tabId": {"type": "integer"}},
        });
        let augmented = augment_schema(&custom);
        assert_eq!(augmented["properties"]["tabId"]["type"], json!("integer"));
    }
}
