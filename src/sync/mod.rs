//! Assembly Synchronization Engine
//!
//! Drives one local session through
//! `Disconnected -> ProjectSelected -> Ready`
//! and implements the asset and assembly operations on top of the bridge.
//! Identifying an assembly and becoming ready happen in one step, after the
//! assembly link is persisted.

pub mod engine;
pub mod error;

pub use engine::{
    is_placeholder, AccessCheck, AssetAccess, AssetLinks, OpenedAssembly, PullReport, PushReport,
    Session, SyncEngine, SyncState, PLACEHOLDER_CONTENT,
};
pub use error::SyncError;
