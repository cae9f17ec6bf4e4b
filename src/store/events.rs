use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Change notifications published by the drop store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DropEvent {
    /// A new drop was appended
    Added { id: Uuid },

    /// A drop was deleted locally
    Removed { id: Uuid },

    /// The collection was replaced by a reconciliation pass
    Reconciled { total: usize },
}

/// Fan-out channel for `DropEvent`s
///
/// Publishing never blocks; subscribers that fall behind by more than the
/// channel capacity see `RecvError::Lagged` and skip ahead.
#[derive(Clone)]
pub struct DropEvents {
    tx: broadcast::Sender<DropEvent>,
}

impl DropEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DropEvent> {
        self.tx.subscribe()
    }

    /// Publish, ignoring the case where nobody is listening
    pub fn emit(&self, event: DropEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for DropEvents {
    fn default() -> Self {
        Self::new(256)
    }
}
