use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::drops::{AudioDrop, Coordinate};

/// Durable storage for the local drop collection
pub trait DropRepository: Send {
    /// Load every stored drop; an absent store yields an empty list
    fn load_all(&self) -> Result<Vec<AudioDrop>>;

    /// Replace the stored collection. Must be atomic: readers see either the
    /// old or the new collection, never a partial write.
    fn save_all(&self, drops: &[AudioDrop]) -> Result<()>;

    /// Append a single drop
    fn add(&self, drop: &AudioDrop) -> Result<()> {
        let mut existing = self.load_all()?;
        existing.push(drop.clone());
        self.save_all(&existing)
    }
}

/// Drop collection stored as one JSON array file
#[derive(Debug, Clone)]
pub struct JsonDropRepository {
    path: PathBuf,
}

impl JsonDropRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl DropRepository for JsonDropRepository {
    fn load_all(&self) -> Result<Vec<AudioDrop>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let drops: Vec<AudioDrop> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        debug!("Loaded {} drops from {}", drops.len(), self.path.display());

        Ok(drops)
    }

    fn save_all(&self, drops: &[AudioDrop]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let tmp_path = self.tmp_path();
        let bytes = serde_json::to_vec_pretty(drops).context("Failed to serialize drops")?;

        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!("Saved {} drops to {}", drops.len(), self.path.display());

        Ok(())
    }
}

/// Drops within `within_meters` of `center`, nearest first
pub fn nearby(drops: &[AudioDrop], center: &Coordinate, within_meters: f64) -> Vec<AudioDrop> {
    let mut hits: Vec<(f64, &AudioDrop)> = drops
        .iter()
        .map(|d| (d.distance_to(center), d))
        .filter(|(distance, _)| *distance <= within_meters)
        .collect();

    hits.sort_by(|(da, a), (db, b)| {
        da.total_cmp(db)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    hits.into_iter().map(|(_, d)| d.clone()).collect()
}
