use async_trait::async_trait;
use thiserror::Error;

use crate::drops::AudioDrop;
use crate::storage::StorageError;

/// Cloud errors
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Failed to connect to remote: {0}")]
    Connect(String),

    #[error("Remote request failed: {0}")]
    Request(String),

    #[error("Remote request timed out after {0}s")]
    Timeout(u64),

    #[error("Remote rejected the request: {0}")]
    Rejected(String),

    #[error("Failed to decode remote response: {0}")]
    Decode(String),

    #[error("Failed to store remote audio: {0}")]
    Materialize(#[from] StorageError),
}

/// A drop as fetched from a remote source, with its audio asset if one was sent
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDrop {
    pub drop: AudioDrop,
    /// Bytes for a `File` drop, to be materialized under its filename
    pub asset: Option<Vec<u8>>,
}

impl RemoteDrop {
    pub fn new(drop: AudioDrop) -> Self {
        Self { drop, asset: None }
    }

    pub fn with_asset(drop: AudioDrop, asset: Vec<u8>) -> Self {
        Self {
            drop,
            asset: Some(asset),
        }
    }
}

/// Port for the remote drop collection
///
/// A fetch returns the complete collection or fails as a whole.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch every drop held remotely
    async fn fetch_all(&self) -> Result<Vec<RemoteDrop>, RemoteError>;

    /// Store one drop together with its audio bytes
    async fn save(&self, drop: &AudioDrop, audio: &[u8]) -> Result<(), RemoteError>;

    /// Name for logging
    fn name(&self) -> &str;
}
