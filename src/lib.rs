pub mod audio;
pub mod cloud;
pub mod config;
pub mod drops;
pub mod http;
pub mod storage;
pub mod store;

pub use audio::{AudioFrame, ClipConfig, ClipRecorder, RecordingResult};
pub use cloud::{CloudMirror, NatsRemoteSource, RemoteDrop, RemoteError, RemoteSource};
pub use config::Config;
pub use drops::{merge_remote_drops, AudioDrop, AudioRef, Coordinate, MergeOutcome, MergePolicy};
pub use http::{create_router, AppState};
pub use storage::{AudioStorage, DropRepository, JsonDropRepository, Materialized, StorageError};
pub use store::{DropEvent, DropStore, StoreHandle, SyncError, SyncReport};
