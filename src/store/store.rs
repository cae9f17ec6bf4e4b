use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use super::events::{DropEvent, DropEvents};
use crate::drops::{merge_remote_drops, AudioDrop, Coordinate, MergeOutcome, MergePolicy};
use crate::storage::{nearby, DropRepository};

/// Owned in-memory drop collection backed by a repository
///
/// All mutation goes through `&mut self`; share it across tasks with
/// [`StoreHandle`](super::StoreHandle) rather than a lock.
pub struct DropStore {
    /// Current collection, the source of truth for this session
    drops: Vec<AudioDrop>,

    /// Durable backing store
    repository: Box<dyn DropRepository>,

    /// Policy applied when reconciling remote drops
    policy: MergePolicy,

    /// Set when the last write to the repository failed
    dirty: bool,

    events: DropEvents,
}

impl DropStore {
    /// Open the store, loading whatever the repository holds.
    ///
    /// A load failure is logged and the store starts empty.
    pub fn open(repository: Box<dyn DropRepository>, policy: MergePolicy) -> Self {
        let drops = match repository.load_all() {
            Ok(drops) => {
                info!("Loaded {} drops", drops.len());
                drops
            }
            Err(e) => {
                warn!("Failed to load drops, starting empty: {:#}", e);
                Vec::new()
            }
        };

        Self {
            drops,
            repository,
            policy,
            dirty: false,
            events: DropEvents::default(),
        }
    }

    pub fn drops(&self) -> &[AudioDrop] {
        &self.drops
    }

    pub fn len(&self) -> usize {
        self.drops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drops.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&AudioDrop> {
        self.drops.iter().find(|d| d.id == id)
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Whether the in-memory collection has unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn nearby(&self, center: &Coordinate, within_meters: f64) -> Vec<AudioDrop> {
        nearby(&self.drops, center, within_meters)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DropEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &DropEvents {
        &self.events
    }

    /// Append a drop. Returns `false` if a drop with the same id is present.
    pub fn add(&mut self, drop: AudioDrop) -> bool {
        if self.get(drop.id).is_some() {
            warn!("Drop {} already stored, ignoring", drop.id);
            return false;
        }

        let id = drop.id;
        self.drops.push(drop);
        self.persist();
        self.events.emit(DropEvent::Added { id });

        true
    }

    pub fn remove(&mut self, id: Uuid) -> Option<AudioDrop> {
        let index = self.drops.iter().position(|d| d.id == id)?;
        let removed = self.drops.remove(index);
        self.persist();
        self.events.emit(DropEvent::Removed { id });

        Some(removed)
    }

    /// Reconcile `remote` into the collection, persisting when it changed
    pub fn apply_remote(&mut self, remote: &[AudioDrop]) -> MergeOutcome {
        let outcome = merge_remote_drops(&self.drops, remote, self.policy);

        if outcome.changed {
            info!(
                "Reconciled {} remote drops: {} -> {} total",
                remote.len(),
                self.drops.len(),
                outcome.drops.len()
            );
            self.drops = outcome.drops.clone();
            self.persist();
            self.events.emit(DropEvent::Reconciled {
                total: self.drops.len(),
            });
        }

        outcome
    }

    /// Retry a failed write. A no-op when nothing is pending.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.repository.save_all(&self.drops)?;
        self.dirty = false;
        Ok(())
    }

    fn persist(&mut self) {
        match self.repository.save_all(&self.drops) {
            Ok(()) => self.dirty = false,
            Err(e) => {
                warn!("Failed to persist drops, keeping in-memory state: {:#}", e);
                self.dirty = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drops::AudioRef;
    use anyhow::bail;
    use std::sync::{Arc, Mutex};

    /// Repository whose writes can be made to fail
    #[derive(Clone, Default)]
    struct FlakyRepository {
        saved: Arc<Mutex<Vec<AudioDrop>>>,
        failing: Arc<Mutex<bool>>,
        writes: Arc<Mutex<usize>>,
    }

    impl DropRepository for FlakyRepository {
        fn load_all(&self) -> Result<Vec<AudioDrop>> {
            Ok(self.saved.lock().unwrap().clone())
        }

        fn save_all(&self, drops: &[AudioDrop]) -> Result<()> {
            *self.writes.lock().unwrap() += 1;
            if *self.failing.lock().unwrap() {
                bail!("disk full");
            }
            *self.saved.lock().unwrap() = drops.to_vec();
            Ok(())
        }
    }

    fn sample_drop() -> AudioDrop {
        AudioDrop::new(Coordinate::new(1.0, 2.0), 3.0, AudioRef::file("a.wav"))
    }

    #[test]
    fn failed_write_keeps_memory_and_retries() {
        let repo = FlakyRepository::default();
        *repo.failing.lock().unwrap() = true;

        let mut store = DropStore::open(Box::new(repo.clone()), MergePolicy::RemoteWins);
        let drop = sample_drop();
        assert!(store.add(drop.clone()));

        assert_eq!(store.len(), 1);
        assert!(store.is_dirty());
        assert!(repo.saved.lock().unwrap().is_empty());
        assert!(store.flush().is_err());

        *repo.failing.lock().unwrap() = false;
        store.flush().unwrap();

        assert!(!store.is_dirty());
        assert_eq!(*repo.saved.lock().unwrap(), vec![drop]);
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let repo = FlakyRepository::default();
        let mut store = DropStore::open(Box::new(repo.clone()), MergePolicy::RemoteWins);
        let drop = sample_drop();

        assert!(store.add(drop.clone()));
        assert!(!store.add(drop));
        assert_eq!(store.len(), 1);
        assert_eq!(*repo.writes.lock().unwrap(), 1);
    }

    #[test]
    fn unchanged_reconcile_does_not_write() {
        let repo = FlakyRepository::default();
        let mut store = DropStore::open(Box::new(repo.clone()), MergePolicy::RemoteWins);
        let drop = sample_drop();
        store.add(drop.clone());

        let outcome = store.apply_remote(&[drop]);

        assert!(!outcome.changed);
        assert_eq!(*repo.writes.lock().unwrap(), 1);
    }

    #[test]
    fn flush_without_pending_changes_is_noop() {
        let repo = FlakyRepository::default();
        let mut store = DropStore::open(Box::new(repo.clone()), MergePolicy::RemoteWins);

        store.flush().unwrap();
        assert_eq!(*repo.writes.lock().unwrap(), 0);
    }
}
