//! Local persistence: the drop collection file and the audio storage area

pub mod audio;
pub mod repository;

pub use audio::{is_portable_filename, AudioStorage, Materialized, StorageError};
pub use repository::{nearby, DropRepository, JsonDropRepository};
