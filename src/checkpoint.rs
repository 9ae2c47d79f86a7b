//! Checkpoints: human-readable version comments on remote objects.
//!
//! Checkpointing is an audit side channel. A failed checkpoint is logged and
//! reported as `false`; it never fails the operation it belongs to.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::bridge::{CommandRequest, Operation, Transport};
use crate::token::{checkpoint_descriptor, Token};

/// Which kind of remote file the checkpoint goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointTarget {
    /// A USD-family descriptor (asset or assembly).
    Descriptor,
    /// A STEP-family exchange file.
    ExchangeFile,
}

impl CheckpointTarget {
    fn operation(self) -> Operation {
        match self {
            CheckpointTarget::Descriptor => Operation::AddCheckpointToUsd,
            CheckpointTarget::ExchangeFile => Operation::AddCheckpointToNonUsd,
        }
    }
}

#[derive(Clone)]
pub struct Checkpointer {
    transport: Arc<dyn Transport>,
}

impl Checkpointer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Attach `message` to the object at `url`. The remote side prefixes the
    /// token (or `NO_TOKEN`) itself. Returns whether the checkpoint landed.
    pub fn checkpoint(
        &self,
        target: CheckpointTarget,
        url: &str,
        token: Option<&Token>,
        message: &str,
    ) -> bool {
        let request = CommandRequest::new(target.operation())
            .with_url(url)
            .with_token(token)
            .with_checkpoint(message);
        let descriptor = checkpoint_descriptor(token, message);

        match self.transport.invoke(&request) {
            Ok(response) => {
                if let Some((sentinel, line)) = response.first_sentinel() {
                    warn!(url = %url, sentinel = sentinel.as_str(), line = %line, "Checkpoint rejected");
                    false
                } else if !response.exit.success {
                    warn!(url = %url, code = ?response.exit.code, "Checkpoint command failed");
                    false
                } else {
                    debug!(url = %url, checkpoint = %descriptor, "Checkpoint attached");
                    true
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Checkpoint could not be attached");
                false
            }
        }
    }
}
