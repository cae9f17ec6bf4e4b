use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::source::RemoteDrop;
use crate::drops::{AudioDrop, AudioRef, Coordinate};
use crate::storage::is_portable_filename;

/// A drop record as exchanged with the cloud service
///
/// Every field is optional on the wire; `decode_record` decides what is usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDropRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Server-side record name, used when `identifier` is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>, // RFC3339 timestamp

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Base64 file contents accompanying `filename`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_asset: Option<String>,

    /// Base64 inline payload, for drops without a filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
}

impl RemoteDropRecord {
    /// Build the outgoing record for `drop`, attaching `audio` as the asset
    pub fn from_drop(drop: &AudioDrop, audio: &[u8]) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        let (filename, audio_asset, audio_data) = match &drop.audio {
            AudioRef::File { filename } => {
                (Some(filename.clone()), Some(engine.encode(audio)), None)
            }
            AudioRef::Inline { data } => (None, None, Some(engine.encode(data))),
        };

        Self {
            identifier: Some(drop.id.to_string()),
            record_name: Some(drop.id.to_string()),
            created_at: Some(drop.created_at.to_rfc3339()),
            duration: Some(drop.duration_sec),
            latitude: Some(drop.coordinate.latitude),
            longitude: Some(drop.coordinate.longitude),
            filename,
            audio_asset,
            audio_data,
        }
    }

    /// Convert into a drop, or `None` when a required field is missing or
    /// unparsable, or the filename is not a bare portable name
    pub fn into_remote_drop(self) -> Option<RemoteDrop> {
        let engine = base64::engine::general_purpose::STANDARD;

        let identifier = self.identifier.or(self.record_name)?;
        let id = Uuid::parse_str(&identifier).ok()?;
        let created_at = DateTime::parse_from_rfc3339(self.created_at.as_deref()?)
            .ok()?
            .with_timezone(&Utc);
        let duration = self.duration?;
        let coordinate = Coordinate::new(self.latitude?, self.longitude?);

        if !coordinate.is_valid() {
            return None;
        }

        if let Some(filename) = self.filename {
            if !is_portable_filename(&filename) {
                return None;
            }
            let asset = match self.audio_asset {
                Some(encoded) => Some(engine.decode(encoded.as_bytes()).ok()?),
                None => None,
            };
            let audio = AudioRef::file(filename);
            let drop = AudioDrop::with_id(id, created_at, coordinate, duration, audio);
            return Some(RemoteDrop { drop, asset });
        }

        let data = engine.decode(self.audio_data?.as_bytes()).ok()?;
        let drop = AudioDrop::with_id(id, created_at, coordinate, duration, AudioRef::inline(data));

        Some(RemoteDrop::new(drop))
    }
}

/// Decode one raw record, dropping it when malformed
pub fn decode_record(value: serde_json::Value) -> Option<RemoteDrop> {
    let record: RemoteDropRecord = match serde_json::from_value(value) {
        Ok(record) => record,
        Err(e) => {
            debug!("Skipping undecodable remote record: {}", e);
            return None;
        }
    };

    let label = record
        .identifier
        .clone()
        .or_else(|| record.record_name.clone())
        .unwrap_or_else(|| "<unnamed>".to_string());

    let decoded = record.into_remote_drop();
    if decoded.is_none() {
        debug!("Skipping malformed remote record {}", label);
    }
    decoded
}

/// Decode a batch, keeping every well-formed record
pub fn decode_records(values: Vec<serde_json::Value>) -> Vec<RemoteDrop> {
    values.into_iter().filter_map(decode_record).collect()
}

/// Request for one page of the remote collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Continuation token from the previous page
    pub cursor: Option<String>,
}

/// One page of the remote collection
///
/// Records stay as raw JSON so one bad record cannot fail the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchPage {
    #[serde(default)]
    pub records: Vec<serde_json::Value>,
    /// `None` on the last page
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Reply to a save request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAck {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}
