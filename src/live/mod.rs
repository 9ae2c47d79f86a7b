//! Live Session Protocol Handler
//!
//! Discovers live sessions for an assembly and runs the long-lived live CLI
//! process that streams other clients' transform edits into the workspace.

pub mod handler;
pub mod parser;

pub use handler::{LiveCommand, LiveEvent, LiveLineHandler, LiveSession, LiveTarget};
pub use parser::{parse_live_line, LiveUpdate};

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::bridge::{BridgeError, CommandRequest, Operation, ProcessTransport, Transport};

const SESSION_MARKER: &str = "SESSION_ID";
const NO_SESSION_MARKER: &str = "NO_SESSION_FOUND";

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("No live sessions available for {0}")]
    NoSessions(String),
    #[error("Live CLI error: {0}")]
    Bridge(#[from] BridgeError),
    #[error("Live session IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Live session is not running")]
    NotRunning,
    #[error("{0}")]
    Ended(String),
}

impl Serialize for LiveError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Everything needed to discover and start live sessions.
#[derive(Clone)]
pub struct LiveLauncher {
    program: PathBuf,
    transport: Arc<dyn Transport>,
}

impl LiveLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        Self {
            transport: Arc::new(ProcessTransport::new(program.clone())),
            program,
        }
    }

    /// Use a different transport for discovery while spawning `program`.
    pub fn with_transport(program: impl Into<PathBuf>, transport: Arc<dyn Transport>) -> Self {
        Self {
            program: program.into(),
            transport,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Names of the live sessions open on an assembly.
    pub fn find_sessions(&self, assembly_url: &str) -> Result<Vec<String>, LiveError> {
        let request = CommandRequest::new(Operation::FindSessions).with_url(assembly_url);
        let response = self.transport.invoke(&request)?;
        let sessions = parse_session_list(response.lines());
        if sessions.is_empty() {
            info!(assembly = %assembly_url, "No live sessions found");
            return Err(LiveError::NoSessions(assembly_url.to_string()));
        }
        debug!(assembly = %assembly_url, count = sessions.len(), "Found live sessions");
        Ok(sessions)
    }
}

/// Session names from `SESSION_ID <name>` lines.
pub fn parse_session_list<'a, I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sessions = Vec::new();
    for line in lines {
        if line.contains(NO_SESSION_MARKER) {
            continue;
        }
        let mut parts = line.split_whitespace();
        if parts.next() == Some(SESSION_MARKER) {
            if let Some(name) = parts.next() {
                if !sessions.iter().any(|s| s == name) {
                    sessions.push(name.to_string());
                }
            }
        }
    }
    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::MockTransport;

    #[test]
    fn test_parse_session_list() {
        let lines = ["Looking up sessions", "SESSION_ID review", "SESSION_ID design", "SESSION_ID review"];
        assert_eq!(parse_session_list(lines), vec!["review", "design"]);
        assert!(parse_session_list(["NO_SESSION_FOUND"]).is_empty());
    }

    #[test]
    fn test_no_sessions_is_reported() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Operation::FindSessions, "NO_SESSION_FOUND\r\n");
        let launcher = LiveLauncher::with_transport("live-cli", mock.clone());

        let err = launcher.find_sessions("omniverse://h/p/assembly/a.usda").unwrap_err();
        assert!(matches!(err, LiveError::NoSessions(_)));
        assert_eq!(mock.calls()[0].nucleus_url.as_deref(), Some("omniverse://h/p/assembly/a.usda"));
    }
}
