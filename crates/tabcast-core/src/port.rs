//! In-process message port connecting a tab context to the worker context
//!
//! Mirrors the browser message-channel idiom: fire-and-forget sends plus
//! requests that carry a fresh ephemeral reply slot. Delivery order is
//! preserved per port; contexts never share mutable state.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::error::{BridgeError, BridgeResult};
use crate::messages::{Envelope, Reply};

/// An envelope in flight, with an optional one-shot reply slot.
#[derive(Debug)]
pub struct PortMessage {
    pub envelope: Envelope,
    /// Present for requests; the receiver answers by sending exactly one
    /// [`Reply`]. Dropping the slot rejects the request.
    pub reply: Option<oneshot::Sender<Reply>>,
}

/// One end of a duplex port pair.
#[derive(Debug)]
pub struct MessagePort {
    sender: PortSender,
    receiver: mpsc::UnboundedReceiver<PortMessage>,
}

impl MessagePort {
    /// Split into the outgoing sender and the incoming stream.
    pub fn split(self) -> (PortSender, mpsc::UnboundedReceiver<PortMessage>) {
        (self.sender, self.receiver)
    }

    /// Clone the outgoing half without consuming the port.
    pub fn sender(&self) -> PortSender {
        self.sender.clone()
    }
}

/// Outgoing half of a port; cheap to clone.
#[derive(Debug, Clone)]
pub struct PortSender {
    tx: mpsc::UnboundedSender<PortMessage>,
}

impl PortSender {
    /// Fire-and-forget send.
    pub fn send(&self, envelope: Envelope) -> BridgeResult<()> {
        self.tx
            .send(PortMessage {
                envelope,
                reply: None,
            })
            .map_err(|_| BridgeError::ChannelClosed)
    }

    /// Send and await the single reply, bounded by `deadline`.
    ///
    /// A missed deadline removes the pending entry on this side; a late
    /// reply is dropped by the abandoned oneshot.
    pub async fn request(&self, envelope: Envelope, deadline: Duration) -> BridgeResult<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PortMessage {
                envelope,
                reply: Some(reply_tx),
            })
            .map_err(|_| BridgeError::ChannelClosed)?;

        match timeout(deadline, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BridgeError::ChannelClosed),
            Err(_) => Err(BridgeError::RequestTimeout(deadline)),
        }
    }

    /// Whether the peer context has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a connected pair of ports, one per context.
pub fn port_pair() -> (MessagePort, MessagePort) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MessagePort {
            sender: PortSender { tx: a_tx },
            receiver: a_rx,
        },
        MessagePort {
            sender: PortSender { tx: b_tx },
            receiver: b_rx,
        },
    )
}
