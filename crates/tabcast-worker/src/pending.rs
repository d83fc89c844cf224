//! Pending tool-call correlation
//!
//! Every routed CALL_TOOL gets an opaque `callId` and a one-shot slot.
//! The entry is consumed by exactly one of result, error, or timeout; a
//! late TOOL_CALL_RESULT for a timed-out call finds no entry and is
//! dropped.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use tabcast_core::{BridgeError, BridgeResult};

#[derive(Default)]
pub struct PendingCalls {
    calls: DashMap<String, oneshot::Sender<BridgeResult<Value>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a call id and its reply slot.
    pub fn create(&self) -> (String, oneshot::Receiver<BridgeResult<Value>>) {
        let call_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.calls.insert(call_id.clone(), tx);
        (call_id, rx)
    }

    /// Resolve a pending call. Returns false for an unknown (usually
    /// timed-out) id.
    pub fn complete(&self, call_id: &str, result: BridgeResult<Value>) -> bool {
        match self.calls.remove(call_id) {
            Some((_, tx)) => tx.send(result).is_ok(),
            None => {
                debug!(call_id, "dropping result for unknown or timed-out call");
                false
            }
        }
    }

    /// Await the result for `call_id`, clearing the entry on timeout.
    pub async fn wait(
        &self,
        call_id: &str,
        rx: oneshot::Receiver<BridgeResult<Value>>,
        deadline: Duration,
    ) -> BridgeResult<Value> {
        match timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::ChannelClosed),
            Err(_) => {
                self.calls.remove(call_id);
                Err(BridgeError::ToolCallTimeout(call_id.to_string()))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_complete_resolves_wait() {
        let pending = PendingCalls::new();
        let (call_id, rx) = pending.create();

        assert!(pending.complete(&call_id, Ok(json!({"ok": true}))));
        let result = pending
            .wait(&call_id, rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result, json!({"ok": true}));
        assert!(pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_entry_and_drops_late_result() {
        let pending = PendingCalls::new();
        let (call_id, rx) = pending.create();

        let err = pending
            .wait(&call_id, rx, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ToolCallTimeout(_)));
        assert!(pending.is_empty());

        // A result arriving after the timeout is dropped.
        assert!(!pending.complete(&call_id, Ok(json!(null))));
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let pending = PendingCalls::new();
        let (call_id, rx) = pending.create();
        pending.complete(&call_id, Err(BridgeError::Handler("boom".to_string())));

        let err = pending
            .wait(&call_id, rx, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Handler(message) if message == "boom"));
    }
}
