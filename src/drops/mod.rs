//! Drop records and the reconciliation of local and remote collections

pub mod model;
pub mod reconcile;

pub use model::{AudioDrop, AudioRef, Coordinate};
pub use reconcile::{merge_remote_drops, sort_drops, MergeOutcome, MergePolicy};
