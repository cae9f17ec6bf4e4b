use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the audio storage area
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid audio filename: \"{0}\"")]
    InvalidFilename(String),

    #[error("Audio file not found: {0}")]
    NotFound(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of materializing a payload into storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    /// The bytes were written to a new file
    Written,
    /// A file with that name already existed and was left untouched
    AlreadyPresent,
}

/// The directory holding audio files referenced by `AudioRef::File`
#[derive(Debug, Clone)]
pub struct AudioStorage {
    base_dir: PathBuf,
}

impl AudioStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create the storage directory if needed
    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_dir).map_err(|source| StorageError::Io {
            path: self.base_dir.clone(),
            source,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a portable filename to its path in this storage area
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, StorageError> {
        if !is_portable_filename(filename) {
            return Err(StorageError::InvalidFilename(filename.to_string()));
        }
        Ok(self.base_dir.join(filename))
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.resolve(filename).map(|p| p.exists()).unwrap_or(false)
    }

    /// Write `bytes` under `filename` unless a file of that name exists.
    ///
    /// Never overwrites. A file that appears between the existence check and
    /// the create counts as already present.
    pub fn materialize(&self, filename: &str, bytes: &[u8]) -> Result<Materialized, StorageError> {
        let path = self.resolve(filename)?;

        if path.exists() {
            debug!("Audio {} already present, skipping", filename);
            return Ok(Materialized::AlreadyPresent);
        }

        self.ensure_dir()?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Audio {} appeared concurrently, skipping", filename);
                return Ok(Materialized::AlreadyPresent);
            }
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        if let Err(source) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            drop(file);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove partial audio file {}: {}", path.display(), e);
            }
            return Err(StorageError::Io { path, source });
        }

        info!("Materialized audio {} ({} bytes)", filename, bytes.len());

        Ok(Materialized::Written)
    }

    /// Copy an existing file into storage under `filename`, never overwriting
    pub fn import_file(&self, source: &Path, filename: &str) -> Result<Materialized, StorageError> {
        let bytes = fs::read(source).map_err(|e| StorageError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        self.materialize(filename, &bytes)
    }

    pub fn read(&self, filename: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(filename)?;
        fs::read(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                StorageError::NotFound(filename.to_string())
            } else {
                StorageError::Io { path, source }
            }
        })
    }

    /// Delete a stored file; a missing file is not an error
    pub fn remove(&self, filename: &str) -> Result<(), StorageError> {
        let path = self.resolve(filename)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

/// A bare file name with no directory components
pub fn is_portable_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portable_filenames() {
        assert!(is_portable_filename("drop-20261019T074300.000Z.wav"));
        assert!(!is_portable_filename(""));
        assert!(!is_portable_filename("."));
        assert!(!is_portable_filename(".."));
        assert!(!is_portable_filename(".hidden"));
        assert!(!is_portable_filename("../escape.wav"));
        assert!(!is_portable_filename("dir/file.wav"));
        assert!(!is_portable_filename("dir\\file.wav"));
    }

    #[test]
    fn resolve_rejects_paths() {
        let storage = AudioStorage::new("/tmp/hearhere-audio");
        assert!(matches!(
            storage.resolve("../x.wav"),
            Err(StorageError::InvalidFilename(_))
        ));
        assert_eq!(
            storage.resolve("x.wav").unwrap(),
            PathBuf::from("/tmp/hearhere-audio/x.wav")
        );
    }
}
