//! Remote Command Bridge
//!
//! Invokes the remote-store CLI with a structured argument vector and hands
//! back its output lines, stderr and exit status. Error sentinels printed by
//! the CLI are data in the [`Response`]; only spawn and I/O failures are
//! [`BridgeError`]s.

pub mod command;
pub mod process;
pub mod response;

#[cfg(test)]
pub mod mock;

pub use command::{flags, CommandRequest, Operation};
pub use process::{resolve_program, ProcessTransport};
pub use response::{split_lines, ErrorSentinel, ExitInfo, Response};

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Remote CLI not found at: {0}")]
    NotFound(String),
    #[error("Failed to start remote CLI {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Serialize for BridgeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Seam between the sync engine and whatever runs the remote CLI.
pub trait Transport: Send + Sync {
    fn invoke(&self, request: &CommandRequest) -> Result<Response, BridgeError>;
}
