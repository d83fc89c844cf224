//! WebSocket link from the worker to the remote MCP proxy
//!
//! Dials out, authenticates with a query-string token, keeps the socket
//! alive with a periodic ping frame, and reconnects with exponential
//! backoff. While open, every inbound text frame is dispatched through
//! the JSON-RPC handler and the response is written back.
//!
//! A token change closes the socket cleanly and redials after a short
//! settle delay; the interim down/up edges are coalesced so subscribers
//! never observe a spurious disconnect.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use jsonrpc_core::IoHandler;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use tabcast_core::{BridgeError, BridgeResult, LinkConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Keepalive frame; a bare ping, not a JSON-RPC request.
const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// Settle delay between a token-driven close and the redial.
const TOKEN_RESTART_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

enum LinkCommand {
    /// Close with 1000 and redial (token change).
    Restart,
    Shutdown,
}

enum PumpOutcome {
    /// Local shutdown request.
    Shutdown,
    /// Token-driven restart; redial after the settle delay.
    Restart,
    /// Remote closed cleanly (1000); no auto-reconnect.
    CleanClose,
    /// Error or unclean close; back off and redial.
    Dropped,
}

pub struct WsLink {
    config: LinkConfig,
    dispatcher: Arc<IoHandler>,
    token: Mutex<Option<String>>,
    state: Mutex<LinkState>,
    reconnect_attempts: AtomicU32,
    suppress_down_edge: AtomicBool,
    last_emitted: Mutex<Option<bool>>,
    /// Connectivity edges for the controller to broadcast.
    events: mpsc::UnboundedSender<bool>,
    commands: Mutex<Option<mpsc::UnboundedSender<LinkCommand>>>,
    running: AtomicBool,
}

impl WsLink {
    pub fn new(
        config: LinkConfig,
        dispatcher: Arc<IoHandler>,
        events: mpsc::UnboundedSender<bool>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            token: Mutex::new(None),
            state: Mutex::new(LinkState::Idle),
            reconnect_attempts: AtomicU32::new(0),
            suppress_down_edge: AtomicBool::new(false),
            last_emitted: Mutex::new(None),
            events,
            commands: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Open
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Replace the auth token. A live socket closes with 1000 and
    /// redials with the new credentials; the bounce is not broadcast.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.lock() = Some(token.into());
        if let Some(commands) = self.commands.lock().as_ref() {
            let _ = commands.send(LinkCommand::Restart);
        }
    }

    /// Close and stop reconnecting.
    pub fn shutdown(&self) {
        if let Some(commands) = self.commands.lock().as_ref() {
            let _ = commands.send(LinkCommand::Shutdown);
        }
    }

    /// Start the connect/reconnect loop.
    ///
    /// Refuses to dial when auth is required and no token is set; a
    /// later [`set_token`](Self::set_token) unblocks the loop.
    pub fn connect(self: &Arc<Self>) -> BridgeResult<()> {
        if self.config.require_auth && self.token.lock().is_none() {
            return Err(BridgeError::AuthGated);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *self.commands.lock() = Some(command_tx);

        let link = Arc::clone(self);
        tokio::spawn(async move {
            link.run(command_rx).await;
        });
        Ok(())
    }

    async fn run(self: Arc<Self>, mut commands: mpsc::UnboundedReceiver<LinkCommand>) {
        loop {
            if self.config.require_auth && self.token.lock().is_none() {
                self.set_state(LinkState::Idle);
                match commands.recv().await {
                    Some(LinkCommand::Restart) => continue,
                    Some(LinkCommand::Shutdown) | None => break,
                }
            }

            self.set_state(LinkState::Connecting);
            let endpoint = match self.endpoint() {
                Ok(endpoint) => endpoint,
                Err(err) => {
                    warn!(%err, "link endpoint is unusable; giving up");
                    break;
                }
            };

            match connect_async(endpoint.as_str()).await {
                Ok((stream, _response)) => {
                    info!(url = %self.config.url, "link open");
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    self.set_state(LinkState::Open);
                    self.emit(true);

                    let outcome = self.pump(stream, &mut commands).await;
                    self.emit(false);
                    match outcome {
                        PumpOutcome::Shutdown => break,
                        PumpOutcome::CleanClose => {
                            info!("link closed by peer");
                            break;
                        }
                        PumpOutcome::Restart => {
                            sleep(TOKEN_RESTART_SETTLE).await;
                            continue;
                        }
                        PumpOutcome::Dropped => {}
                    }
                }
                Err(err) => {
                    warn!(%err, "link connect failed");
                }
            }

            let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
            let delay = backoff_delay(
                self.config.initial_reconnect_delay_ms,
                self.config.max_reconnect_delay_ms,
                attempt,
            );
            debug!(?delay, attempt, "link reconnecting");
            self.set_state(LinkState::Reconnecting);
            tokio::select! {
                _ = sleep(delay) => {}
                command = commands.recv() => match command {
                    Some(LinkCommand::Restart) => {}
                    Some(LinkCommand::Shutdown) | None => break,
                },
            }
        }

        self.set_state(LinkState::Closed);
        *self.commands.lock() = None;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Drive one open socket until it drops or a command ends it.
    async fn pump(
        &self,
        stream: WsStream,
        commands: &mut mpsc::UnboundedReceiver<LinkCommand>,
    ) -> PumpOutcome {
        let (mut sink, mut source) = stream.split();
        let mut keepalive = interval(Duration::from_secs(self.config.keepalive_secs.max(1)));
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the socket just opened.
        keepalive.tick().await;

        loop {
            tokio::select! {
                message = source.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(response) = self.dispatcher.handle_request(&text).await {
                            if sink.send(Message::Text(response)).await.is_err() {
                                return PumpOutcome::Dropped;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let clean = frame
                            .map(|f| f.code == CloseCode::Normal)
                            .unwrap_or(false);
                        return if clean {
                            PumpOutcome::CleanClose
                        } else {
                            PumpOutcome::Dropped
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%err, "link read error");
                        return PumpOutcome::Dropped;
                    }
                    None => return PumpOutcome::Dropped,
                },
                _ = keepalive.tick() => {
                    // Send errors are swallowed; a dead socket surfaces
                    // through the close path.
                    let _ = sink.send(Message::Text(PING_FRAME.to_string())).await;
                }
                command = commands.recv() => {
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    }));
                    match command {
                        Some(LinkCommand::Restart) => {
                            self.suppress_down_edge.store(true, Ordering::SeqCst);
                            let _ = sink.send(close).await;
                            return PumpOutcome::Restart;
                        }
                        Some(LinkCommand::Shutdown) | None => {
                            let _ = sink.send(close).await;
                            return PumpOutcome::Shutdown;
                        }
                    }
                }
            }
        }
    }

    /// Connection URL with the token as a query parameter.
    fn endpoint(&self) -> BridgeResult<Url> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|err| BridgeError::TransportUnavailable(format!("invalid link url: {err}")))?;
        if let Some(token) = self.token.lock().clone() {
            url.query_pairs_mut().append_pair("token", &token);
        }
        Ok(url)
    }

    fn set_state(&self, state: LinkState) {
        *self.state.lock() = state;
    }

    /// Report a connectivity edge, coalescing repeats and swallowing the
    /// down edge of a token-driven restart.
    fn emit(&self, connected: bool) {
        if !connected && self.suppress_down_edge.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut last = self.last_emitted.lock();
        if *last == Some(connected) {
            return;
        }
        *last = Some(connected);
        let _ = self.events.send(connected);
    }
}

/// Exponential backoff: initial delay doubled per attempt, capped.
fn backoff_delay(initial_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(16);
    Duration::from_millis(initial_ms.saturating_mul(factor).min(max_ms))
}
