use super::state::AppState;
use crate::audio::{drop_filename, probe_duration};
use crate::drops::{AudioDrop, AudioRef, Coordinate};
use crate::storage::{Materialized, StorageError};
use crate::store::SyncError;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Radius used by /drops/nearby when none is given
const DEFAULT_NEARBY_METERS: f64 = 500.0;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDropRequest {
    pub latitude: f64,
    pub longitude: f64,

    /// Clip length; probed from the audio when omitted
    pub duration_sec: Option<f64>,

    /// Base64-encoded audio bytes
    pub audio: String,

    /// File extension for stored clips (default: "wav")
    pub extension: Option<String>,

    /// Keep the audio inside the record instead of the storage directory
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lon: f64,
    /// Radius in metres
    pub within: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn store_unavailable(e: anyhow::Error) -> Response {
    error!("Drop store unavailable: {:#}", e);
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        format!("Drop store unavailable: {}", e),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /drops
pub async fn list_drops(State(state): State<AppState>) -> Response {
    match state.store.snapshot().await {
        Ok(drops) => (StatusCode::OK, Json(drops)).into_response(),
        Err(e) => store_unavailable(e),
    }
}

/// GET /drops/nearby
pub async fn nearby_drops(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Response {
    let center = Coordinate::new(query.lat, query.lon);
    if !center.is_valid() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid coordinate: {}, {}", query.lat, query.lon),
        );
    }

    let within = query.within.unwrap_or(DEFAULT_NEARBY_METERS);
    if !within.is_finite() || within < 0.0 {
        return error_response(StatusCode::BAD_REQUEST, format!("Invalid radius: {}", within));
    }

    match state.store.nearby(center, within).await {
        Ok(drops) => (StatusCode::OK, Json(drops)).into_response(),
        Err(e) => store_unavailable(e),
    }
}

/// POST /drops
/// Store a new clip and append it as a drop
pub async fn create_drop(
    State(state): State<AppState>,
    Json(req): Json<CreateDropRequest>,
) -> Response {
    let coordinate = Coordinate::new(req.latitude, req.longitude);
    if !coordinate.is_valid() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid coordinate: {}, {}", req.latitude, req.longitude),
        );
    }

    let bytes = match base64::engine::general_purpose::STANDARD.decode(req.audio.as_bytes()) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => {
            return error_response(StatusCode::BAD_REQUEST, "Audio payload is empty".to_string())
        }
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid base64 audio: {}", e),
            )
        }
    };

    let id = Uuid::new_v4();
    let created_at = Utc::now();

    let (audio, duration_sec) = if req.inline {
        (AudioRef::inline(bytes), req.duration_sec.unwrap_or(0.0))
    } else {
        let extension = req.extension.as_deref().unwrap_or("wav");
        let filename = drop_filename(id, created_at, extension);

        match state.storage().materialize(&filename, &bytes) {
            Ok(Materialized::Written) => {}
            Ok(Materialized::AlreadyPresent) => {
                error!("Audio {} already exists, refusing to share it", filename);
                return error_response(
                    StatusCode::CONFLICT,
                    format!("Audio file {} already exists", filename),
                );
            }
            Err(e) => {
                error!("Failed to store audio {}: {}", filename, e);
                let status = match e {
                    StorageError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                return error_response(status, format!("Failed to store audio: {}", e));
            }
        }

        let duration_sec = match req.duration_sec {
            Some(duration) => duration,
            None => probed_duration(&state, &filename),
        };

        (AudioRef::file(filename), duration_sec)
    };

    let drop = AudioDrop::with_id(id, created_at, coordinate, duration_sec, audio);

    let added = state.store.add(drop.clone()).await;
    if !matches!(added, Ok(true)) {
        discard_audio(&state, &drop);
    }
    match added {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                StatusCode::CONFLICT,
                format!("Drop {} already exists", drop.id),
            )
        }
        Err(e) => return store_unavailable(e),
    }

    info!("Created drop {} at {:?}", drop.id, drop.coordinate);

    let cloud = state.cloud.clone();
    let mirrored = drop.clone();
    tokio::spawn(async move {
        if let Err(e) = cloud.save(&mirrored).await {
            warn!("Failed to mirror drop {} to the cloud: {}", mirrored.id, e);
        }
    });

    (StatusCode::CREATED, Json(drop)).into_response()
}

/// Remove the stored audio of a drop that was not kept
fn discard_audio(state: &AppState, drop: &AudioDrop) {
    if let Some(filename) = drop.audio.filename() {
        if let Err(e) = state.storage().remove(filename) {
            warn!("Failed to remove orphaned audio {}: {}", filename, e);
        }
    }
}

fn probed_duration(state: &AppState, filename: &str) -> f64 {
    let probed = state
        .storage()
        .resolve(filename)
        .map_err(anyhow::Error::from)
        .and_then(|path| probe_duration(&path));

    match probed {
        Ok(duration) => duration,
        Err(e) => {
            warn!("Could not determine duration of {}: {:#}", filename, e);
            0.0
        }
    }
}

/// GET /drops/:drop_id
pub async fn get_drop(State(state): State<AppState>, Path(drop_id): Path<Uuid>) -> Response {
    match state.store.get(drop_id).await {
        Ok(Some(drop)) => (StatusCode::OK, Json(drop)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Drop {} not found", drop_id)),
        Err(e) => store_unavailable(e),
    }
}

/// GET /drops/:drop_id/audio
/// Raw audio of a drop, from the record itself or the storage directory
pub async fn get_drop_audio(State(state): State<AppState>, Path(drop_id): Path<Uuid>) -> Response {
    let drop = match state.store.get(drop_id).await {
        Ok(Some(drop)) => drop,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, format!("Drop {} not found", drop_id))
        }
        Err(e) => return store_unavailable(e),
    };

    match drop.audio {
        AudioRef::Inline { data } => {
            ([(header::CONTENT_TYPE, "application/octet-stream")], data).into_response()
        }
        AudioRef::File { filename } => match state.storage().read(&filename) {
            Ok(bytes) => {
                ([(header::CONTENT_TYPE, content_type_for(&filename))], bytes).into_response()
            }
            Err(StorageError::NotFound(_)) => error_response(
                StatusCode::NOT_FOUND,
                format!("Audio for drop {} is not available locally", drop_id),
            ),
            Err(e) => {
                error!("Failed to read audio {}: {}", filename, e);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to read audio: {}", e),
                )
            }
        },
    }
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()).as_deref() {
        Some("wav") => "audio/wav",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("ogg") | Some("opus") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// DELETE /drops/:drop_id
/// Local deletion only; the cloud copy is untouched
pub async fn delete_drop(State(state): State<AppState>, Path(drop_id): Path<Uuid>) -> Response {
    match state.store.remove(drop_id).await {
        Ok(Some(drop)) => {
            if let Some(filename) = drop.audio.filename() {
                if let Err(e) = state.storage().remove(filename) {
                    warn!("Failed to delete audio {}: {}", filename, e);
                }
            }
            info!("Deleted drop {}", drop_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Drop {} not found", drop_id)),
        Err(e) => store_unavailable(e),
    }
}

/// POST /drops/sync
/// Fetch from the cloud and reconcile into the local collection
pub async fn sync_drops(State(state): State<AppState>) -> Response {
    match state.store.sync(&state.cloud).await {
        Ok(Some(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(SyncError::Remote(e)) => {
            error_response(StatusCode::BAD_GATEWAY, format!("Sync failed: {}", e))
        }
        Err(SyncError::Store(e)) => store_unavailable(e),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
