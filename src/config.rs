use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::drops::MergePolicy;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Root data directory; `~` is expanded
    pub data_dir: String,
    #[serde(default = "default_drops_file")]
    pub drops_file: String,
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub enabled: bool,
    pub nats_url: String,
    pub subject_prefix: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub policy: MergePolicy,
    /// Period of background sync in `serve`; 0 disables it
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub max_duration_secs: u64,
}

fn default_drops_file() -> String {
    "drops.json".to_string()
}

fn default_audio_dir() -> String {
    "audio".to_string()
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "hearhere.drops".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            policy: MergePolicy::RemoteWins,
            interval_secs: 300,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 30,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("HEARHERE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).as_ref())
    }

    pub fn drops_path(&self) -> PathBuf {
        self.data_dir().join(&self.drops_file)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.data_dir().join(&self.audio_dir)
    }
}

impl CloudConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RecordingConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}
