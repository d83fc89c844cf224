//! In-process worker host
//!
//! Both browser worker variants reach the same hub; natively the two
//! channels are just fresh ports onto one controller. Embedders that
//! simulate a missing shared worker can wrap this host and fail the
//! first variant.

use tabcast_core::{BridgeResult, MessagePort, WorkerHost};

use crate::controller::McpController;

/// [`WorkerHost`] that vends ports onto a local [`McpController`].
pub struct LocalWorkerHost {
    controller: McpController,
}

impl LocalWorkerHost {
    pub fn new(controller: McpController) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &McpController {
        &self.controller
    }
}

impl WorkerHost for LocalWorkerHost {
    fn shared_channel(&self) -> BridgeResult<MessagePort> {
        Ok(self.controller.attach_port())
    }

    fn service_channel(&self) -> BridgeResult<MessagePort> {
        Ok(self.controller.attach_port())
    }
}
