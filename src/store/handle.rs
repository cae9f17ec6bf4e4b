use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{DropEvent, DropEvents};
use super::store::DropStore;
use crate::audio::RecordingResult;
use crate::cloud::{CloudMirror, RemoteError};
use crate::drops::{AudioDrop, AudioRef, Coordinate, MergeOutcome};

/// Summary of one sync pass against the cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Drops received from the remote
    pub fetched: usize,
    /// Drops held locally after the merge
    pub total: usize,
    /// Whether the local collection changed
    pub changed: bool,
}

enum StoreCommand {
    Snapshot(oneshot::Sender<Vec<AudioDrop>>),
    Get(Uuid, oneshot::Sender<Option<AudioDrop>>),
    Nearby {
        center: Coordinate,
        within_meters: f64,
        reply: oneshot::Sender<Vec<AudioDrop>>,
    },
    Add(AudioDrop, oneshot::Sender<bool>),
    Remove(Uuid, oneshot::Sender<Option<AudioDrop>>),
    ApplyRemote(Vec<AudioDrop>, oneshot::Sender<MergeOutcome>),
    Flush(oneshot::Sender<Result<()>>),
}

/// Cloneable handle to a `DropStore` owned by a dedicated task
///
/// The owner task is the only writer, so reconciliation never races a local
/// mutation. The task ends when the last handle is dropped.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
    events: DropEvents,
}

impl StoreHandle {
    /// Move `store` into its owner task
    pub fn spawn(store: DropStore) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let events = store.events().clone();

        let task = tokio::spawn(run_store(store, rx));

        (Self { tx, events }, task)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DropEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Result<Vec<AudioDrop>> {
        self.call(StoreCommand::Snapshot).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<AudioDrop>> {
        self.call(|reply| StoreCommand::Get(id, reply)).await
    }

    pub async fn nearby(&self, center: Coordinate, within_meters: f64) -> Result<Vec<AudioDrop>> {
        self.call(|reply| StoreCommand::Nearby {
            center,
            within_meters,
            reply,
        })
        .await
    }

    /// Append a drop; `false` if its id is already stored
    pub async fn add(&self, drop: AudioDrop) -> Result<bool> {
        self.call(|reply| StoreCommand::Add(drop, reply)).await
    }

    /// Turn a finished recording into a drop at `coordinate` and store it
    pub async fn record(
        &self,
        recording: &RecordingResult,
        coordinate: Coordinate,
    ) -> Result<AudioDrop> {
        let drop = AudioDrop::with_id(
            recording.id,
            Utc::now(),
            coordinate,
            recording.duration_sec,
            AudioRef::file(recording.filename.clone()),
        );
        self.add(drop.clone()).await?;
        Ok(drop)
    }

    pub async fn remove(&self, id: Uuid) -> Result<Option<AudioDrop>> {
        self.call(|reply| StoreCommand::Remove(id, reply)).await
    }

    /// Reconcile an already fetched remote collection
    pub async fn apply_remote(&self, remote: Vec<AudioDrop>) -> Result<MergeOutcome> {
        self.call(|reply| StoreCommand::ApplyRemote(remote, reply)).await
    }

    /// Retry a failed write of the collection
    pub async fn flush(&self) -> Result<()> {
        self.call(StoreCommand::Flush).await?
    }

    /// Fetch from the cloud and reconcile.
    ///
    /// Returns `Ok(None)` when the cloud is disabled. On a fetch failure the
    /// local collection is left untouched and the error is returned.
    pub async fn sync(&self, cloud: &CloudMirror) -> Result<Option<SyncReport>, SyncError> {
        let remote = match cloud.fetch_all().await {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                debug!("Cloud disabled, skipping sync");
                return Ok(None);
            }
            Err(e) => {
                warn!("Sync skipped, remote fetch failed: {}", e);
                return Err(SyncError::Remote(e));
            }
        };

        let fetched = remote.len();
        let outcome = self.apply_remote(remote).await.map_err(SyncError::Store)?;
        let report = SyncReport {
            fetched,
            total: outcome.drops.len(),
            changed: outcome.changed,
        };

        info!(
            "Sync complete: fetched {}, total {}, changed {}",
            report.fetched, report.total, report.changed
        );

        Ok(Some(report))
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> StoreCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| anyhow!("Drop store task has stopped"))?;
        rx.await.map_err(|_| anyhow!("Drop store task dropped the request"))
    }
}

/// Why a sync pass did not complete
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Drop store unavailable: {0}")]
    Store(anyhow::Error),
}

async fn run_store(mut store: DropStore, mut rx: mpsc::Receiver<StoreCommand>) {
    info!("Drop store task started with {} drops", store.len());

    while let Some(command) = rx.recv().await {
        match command {
            StoreCommand::Snapshot(reply) => {
                let _ = reply.send(store.drops().to_vec());
            }
            StoreCommand::Get(id, reply) => {
                let _ = reply.send(store.get(id).cloned());
            }
            StoreCommand::Nearby {
                center,
                within_meters,
                reply,
            } => {
                let _ = reply.send(store.nearby(&center, within_meters));
            }
            StoreCommand::Add(drop, reply) => {
                let _ = reply.send(store.add(drop));
            }
            StoreCommand::Remove(id, reply) => {
                let _ = reply.send(store.remove(id));
            }
            StoreCommand::ApplyRemote(remote, reply) => {
                let _ = reply.send(store.apply_remote(&remote));
            }
            StoreCommand::Flush(reply) => {
                let _ = reply.send(store.flush());
            }
        }
    }

    if let Err(e) = store.flush() {
        warn!("Unsaved drops at shutdown: {:#}", e);
    }

    info!("Drop store task stopped");
}
