//! HTTP API over the drop collection
//!
//! - GET /drops - List all drops, oldest first
//! - POST /drops - Store a new clip as a drop
//! - GET /drops/nearby?lat=&lon=&within= - Drops within a radius, nearest first
//! - GET /drops/:id - One drop
//! - GET /drops/:id/audio - Raw audio bytes of a drop
//! - DELETE /drops/:id - Delete a drop locally
//! - POST /drops/sync - Reconcile with the cloud
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{CreateDropRequest, ErrorResponse, NearbyQuery};
pub use routes::create_router;
pub use state::AppState;
