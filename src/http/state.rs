use crate::cloud::CloudMirror;
use crate::storage::AudioStorage;
use crate::store::StoreHandle;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Single-writer handle to the drop collection
    pub store: StoreHandle,

    /// Optional cloud collaborator; no-op when disabled
    pub cloud: CloudMirror,
}

impl AppState {
    pub fn new(store: StoreHandle, cloud: CloudMirror) -> Self {
        Self { store, cloud }
    }

    /// Where `AudioRef::File` drops keep their bytes
    pub fn storage(&self) -> &AudioStorage {
        self.cloud.storage()
    }
}
