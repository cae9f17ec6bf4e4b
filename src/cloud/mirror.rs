use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::source::{RemoteError, RemoteSource};
use crate::drops::{AudioDrop, AudioRef};
use crate::storage::{is_portable_filename, AudioStorage};

/// Concurrent saves when pushing the whole collection
const PUSH_CONCURRENCY: usize = 4;

/// Optional cloud collaborator
///
/// Every operation is a no-op when no remote source is configured, so callers
/// never branch on whether the cloud is enabled.
#[derive(Clone)]
pub struct CloudMirror {
    source: Option<Arc<dyn RemoteSource>>,
    storage: AudioStorage,
}

impl CloudMirror {
    pub fn new(source: Arc<dyn RemoteSource>, storage: AudioStorage) -> Self {
        Self {
            source: Some(source),
            storage,
        }
    }

    pub fn disabled(storage: AudioStorage) -> Self {
        Self {
            source: None,
            storage,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    pub fn storage(&self) -> &AudioStorage {
        &self.storage
    }

    /// Fetch the remote collection and make every asset available locally.
    ///
    /// `Ok(None)` when disabled. A `File` drop whose name is not a bare
    /// portable filename is skipped. Any materialization failure other than
    /// the file already existing fails the whole fetch.
    pub async fn fetch_all(&self) -> Result<Option<Vec<AudioDrop>>, RemoteError> {
        let Some(source) = &self.source else {
            return Ok(None);
        };

        debug!("Fetching drops from {}", source.name());
        let fetched = source.fetch_all().await?;
        let mut drops = Vec::with_capacity(fetched.len());

        for remote in fetched {
            if let AudioRef::File { filename } = &remote.drop.audio {
                if !is_portable_filename(filename) {
                    warn!(
                        "Skipping remote drop {} with unusable filename {:?}",
                        remote.drop.id, filename
                    );
                    continue;
                }

                match &remote.asset {
                    Some(asset) => {
                        self.storage.materialize(filename, asset)?;
                    }
                    None if !self.storage.contains(filename) => {
                        debug!("Remote drop {} has no asset for {}", remote.drop.id, filename);
                    }
                    None => {}
                }
            }
            drops.push(remote.drop);
        }

        Ok(Some(drops))
    }

    /// Mirror one drop to the cloud; a no-op when disabled
    pub async fn save(&self, drop: &AudioDrop) -> Result<(), RemoteError> {
        let Some(source) = &self.source else {
            return Ok(());
        };

        let audio = match &drop.audio {
            AudioRef::Inline { data } => data.clone(),
            AudioRef::File { filename } => self.storage.read(filename)?,
        };

        source.save(drop, &audio).await
    }

    /// Save every drop, returning how many succeeded
    pub async fn push_all(&self, drops: &[AudioDrop]) -> usize {
        if !self.is_enabled() {
            return 0;
        }

        let results: Vec<bool> = stream::iter(drops)
            .map(|drop| async move {
                match self.save(drop).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to push drop {}: {}", drop.id, e);
                        false
                    }
                }
            })
            .buffer_unordered(PUSH_CONCURRENCY)
            .collect()
            .await;

        let pushed = results.into_iter().filter(|ok| *ok).count();
        info!("Pushed {}/{} drops to the cloud", pushed, drops.len());

        pushed
    }
}
