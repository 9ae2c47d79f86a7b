use serde::Serialize;
use thiserror::Error;

use crate::bridge::{BridgeError, ErrorSentinel};
use crate::cache::CacheError;
use crate::codec::CodecError;
use crate::live::LiveError;
use crate::names::{NameError, NAME_RULE};
use crate::scene::{ObjectId, SceneError};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Permission denied for {link}: {reason}")]
    PermissionDenied { link: String, reason: String },
    #[error("Remote object not found: {link} ({detail})")]
    LinkNotFound { link: String, detail: String },
    #[error("Authentication failed for {link}: {detail}")]
    AuthenticationFailed { link: String, detail: String },
    #[error("Asset {0} is an empty placeholder; push geometry to it before pulling")]
    PlaceholderAsset(String),
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("Invalid {kind} name '{name}': {rule}", rule = NAME_RULE)]
    InvalidName { kind: &'static str, name: String },
    #[error("Invalid link: {0}")]
    InvalidLink(String),
    #[error("No live sessions available for {0}")]
    NoSessionsAvailable(String),
    #[error("Live session '{session}' not found for {assembly}")]
    UnknownSession { session: String, assembly: String },
    #[error("Live session ended: {0}")]
    SessionEnded(String),
    #[error("Not connected to a project")]
    NotConnected,
    #[error("No assembly is open; create or open one first")]
    NoAssembly,
    #[error("No asset selected; create or select one first")]
    NoAsset,
    #[error("Object {0} has not been pushed to the project")]
    UntrackedObject(ObjectId),
    #[error("{operation} rejected by remote store: {message}")]
    RemoteRejected {
        operation: &'static str,
        message: String,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

impl Serialize for SyncError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<BridgeError> for SyncError {
    fn from(e: BridgeError) -> Self {
        SyncError::RemoteUnavailable(e.to_string())
    }
}

impl From<NameError> for SyncError {
    fn from(e: NameError) -> Self {
        match e {
            NameError::InvalidName { kind, name } => SyncError::InvalidName { kind, name },
            NameError::EmptyName { kind } => SyncError::InvalidName {
                kind,
                name: String::new(),
            },
            link @ (NameError::ReservedProjectLink(_) | NameError::MalformedLink(_)) => {
                SyncError::InvalidLink(link.to_string())
            }
        }
    }
}

impl From<LiveError> for SyncError {
    fn from(e: LiveError) -> Self {
        match e {
            LiveError::NoSessions(assembly) => SyncError::NoSessionsAvailable(assembly),
            LiveError::Ended(reason) => SyncError::SessionEnded(reason),
            other => SyncError::RemoteUnavailable(other.to_string()),
        }
    }
}

impl SyncError {
    /// Map an error sentinel printed for `link` to its taxonomy entry.
    pub fn from_sentinel(
        operation: &'static str,
        link: &str,
        sentinel: ErrorSentinel,
        line: &str,
    ) -> Self {
        let detail = line.trim().to_string();
        match sentinel {
            ErrorSentinel::NoPermission => SyncError::PermissionDenied {
                link: link.to_string(),
                reason: detail,
            },
            ErrorSentinel::NotFound => SyncError::LinkNotFound {
                link: link.to_string(),
                detail,
            },
            ErrorSentinel::NoAuth => SyncError::AuthenticationFailed {
                link: link.to_string(),
                detail,
            },
            ErrorSentinel::Error => SyncError::RemoteRejected {
                operation,
                message: detail,
            },
        }
    }
}
