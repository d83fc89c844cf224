//! Worker channel selection and the port-backed channel implementation
//!
//! Two worker variants share one wire format; the adapter feature-detects
//! once and binds concretely. The shared variant is preferred, the
//! service variant is the fallback.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use tabcast_core::{
    BridgeError, BridgeResult, Envelope, MessagePort, PortMessage, PortSender, Reply, WorkerHost,
};

/// Which worker variant the tab ended up bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Shared,
    Service,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Shared => write!(f, "shared"),
            ChannelKind::Service => write!(f, "service"),
        }
    }
}

/// Capability set of a bound worker channel.
#[async_trait]
pub trait WorkerChannel: Send + Sync {
    /// Send and await the `{success, error?, ...}` reply.
    async fn send_with_reply(&self, envelope: Envelope, deadline: Duration) -> BridgeResult<Reply>;

    /// Fire-and-forget send.
    fn send(&self, envelope: Envelope) -> BridgeResult<()>;

    /// Take the worker→tab stream; yields `None` after the first call.
    fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<PortMessage>>;

    /// Drop both halves of the port.
    fn close(&self);
}

/// [`WorkerChannel`] over an in-process [`MessagePort`].
pub struct PortChannel {
    kind: ChannelKind,
    sender: Mutex<Option<PortSender>>,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<PortMessage>>>,
}

impl PortChannel {
    pub fn new(kind: ChannelKind, port: MessagePort) -> Self {
        let (sender, receiver) = port.split();
        Self {
            kind,
            sender: Mutex::new(Some(sender)),
            incoming: Mutex::new(Some(receiver)),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn sender(&self) -> BridgeResult<PortSender> {
        self.sender
            .lock()
            .as_ref()
            .cloned()
            .ok_or(BridgeError::ChannelClosed)
    }
}

#[async_trait]
impl WorkerChannel for PortChannel {
    async fn send_with_reply(&self, envelope: Envelope, deadline: Duration) -> BridgeResult<Reply> {
        self.sender()?.request(envelope, deadline).await
    }

    fn send(&self, envelope: Envelope) -> BridgeResult<()> {
        self.sender()?.send(envelope)
    }

    fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<PortMessage>> {
        self.incoming.lock().take()
    }

    fn close(&self) {
        self.sender.lock().take();
        self.incoming.lock().take();
    }
}

/// Bind a channel to the worker: shared first, service as fallback.
///
/// A service-variant script load failure propagates as
/// [`BridgeError::RegistrationFailed`]; anything else collapses into
/// [`BridgeError::TransportUnavailable`].
pub fn connect_channel(host: &dyn WorkerHost) -> BridgeResult<PortChannel> {
    match host.shared_channel() {
        Ok(port) => Ok(PortChannel::new(ChannelKind::Shared, port)),
        Err(shared_err) => match host.service_channel() {
            Ok(port) => Ok(PortChannel::new(ChannelKind::Service, port)),
            Err(BridgeError::RegistrationFailed(reason)) => {
                Err(BridgeError::RegistrationFailed(reason))
            }
            Err(service_err) => Err(BridgeError::TransportUnavailable(format!(
                "shared: {shared_err}; service: {service_err}"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabcast_core::port_pair;

    struct FixedHost {
        shared: Mutex<Option<MessagePort>>,
        service: Mutex<Option<MessagePort>>,
        service_error: Option<BridgeError>,
    }

    impl WorkerHost for FixedHost {
        fn shared_channel(&self) -> BridgeResult<MessagePort> {
            self.shared
                .lock()
                .take()
                .ok_or_else(|| BridgeError::TransportUnavailable("no shared worker".to_string()))
        }

        fn service_channel(&self) -> BridgeResult<MessagePort> {
            if let Some(port) = self.service.lock().take() {
                return Ok(port);
            }
            Err(match &self.service_error {
                Some(BridgeError::RegistrationFailed(reason)) => {
                    BridgeError::RegistrationFailed(reason.clone())
                }
                _ => BridgeError::TransportUnavailable("no service worker".to_string()),
            })
        }
    }

    #[test]
    fn test_prefers_shared() {
        let (port, _peer) = port_pair();
        let host = FixedHost {
            shared: Mutex::new(Some(port)),
            service: Mutex::new(None),
            service_error: None,
        };
        let channel = connect_channel(&host).unwrap();
        assert_eq!(channel.kind(), ChannelKind::Shared);
    }

    #[test]
    fn test_falls_back_to_service() {
        let (port, _peer) = port_pair();
        let host = FixedHost {
            shared: Mutex::new(None),
            service: Mutex::new(Some(port)),
            service_error: None,
        };
        let channel = connect_channel(&host).unwrap();
        assert_eq!(channel.kind(), ChannelKind::Service);
    }

    #[test]
    fn test_neither_available() {
        let host = FixedHost {
            shared: Mutex::new(None),
            service: Mutex::new(None),
            service_error: None,
        };
        assert!(matches!(
            connect_channel(&host),
            Err(BridgeError::TransportUnavailable(_))
        ));
    }

    #[test]
    fn test_script_load_failure_propagates() {
        let host = FixedHost {
            shared: Mutex::new(None),
            service: Mutex::new(None),
            service_error: Some(BridgeError::RegistrationFailed(
                "worker script 404".to_string(),
            )),
        };
        assert!(matches!(
            connect_channel(&host),
            Err(BridgeError::RegistrationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_channel_close_rejects_sends() {
        let (port, _peer) = port_pair();
        let channel = PortChannel::new(ChannelKind::Shared, port);
        channel.close();
        assert!(matches!(
            channel.send(Envelope::GetEvents),
            Err(BridgeError::ChannelClosed)
        ));
        assert!(channel.take_incoming().is_none());
    }
}
