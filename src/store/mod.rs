//! Owned drop collection with change notifications
//!
//! `DropStore` holds the collection and persists every change through a
//! `DropRepository`. `StoreHandle` runs it on a dedicated task so all
//! mutations, including reconciliation, go through a single writer.

mod events;
mod handle;
mod store;

pub use events::{DropEvent, DropEvents};
pub use handle::{StoreHandle, SyncError, SyncReport};
pub use store::DropStore;
