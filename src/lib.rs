// Nucleus Sync Library
// Exports the sync engine, protocol codecs and remote CLI bridge for the CLI binary

pub mod bridge;
pub mod cache;
pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod live;
pub mod names;
pub mod scene;
pub mod sync;
pub mod token;

// Re-export commonly used types for CLI
pub use bridge::{
    resolve_program, BridgeError, CommandRequest, ErrorSentinel, Operation, ProcessTransport,
    Response, Transport,
};
pub use cache::{LinkKind, PermissionStatus, Slot, StateCache};
pub use checkpoint::{CheckpointTarget, Checkpointer};
pub use codec::{
    decode_record, decode_records, decode_srt_argument, encode_record, encode_srt_argument,
    format_vec3, parse_vec3, CodecError, ComponentRecord, Vec3,
};
pub use config::{get_app_data_dir, Config, ConfigError, APP_IDENTIFIER};
pub use live::{LiveCommand, LiveError, LiveEvent, LiveLauncher, LiveSession, LiveTarget};
pub use names::{validate_name, validate_project_link, NameError};
pub use scene::{
    FileScene, ObjectId, Placement, PlacementUpdate, Scene, SceneError, SharedWorkspace,
    SyncMetadata, Workspace,
};
pub use sync::{
    AssetAccess, AssetLinks, OpenedAssembly, PullReport, PushReport, Session, SyncEngine,
    SyncError, SyncState,
};
pub use token::Token;
