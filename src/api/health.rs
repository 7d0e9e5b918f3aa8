//! Health and status endpoints

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::config::PerType;
use crate::media::MediaType;
use crate::services::{LibraryState, ScanStatus};
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub scan: ScanStatus,
    pub plex_connected: bool,
    /// Refresh requests waiting in the queue
    pub plex_queue: usize,
    /// Requests held for the time-of-day flush
    pub plex_pending: usize,
    /// Folder names no provider could match
    pub unmatched: PerType<Vec<String>>,
    /// Matched titles the image service had no poster for
    pub missing_posters: PerType<Vec<String>>,
}

/// Health check - always returns OK if the server is running
async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        scan: state.scanner.status(),
        plex_connected: state.refresh.is_connected(),
        plex_queue: state.refresh.queue_len(),
        plex_pending: state.refresh.pending_len(),
        unmatched: per_type(&state.state, LibraryState::unmatched_keys),
        missing_posters: per_type(&state.state, LibraryState::missing_poster_keys),
    })
}

fn per_type(library: &LibraryState, keys: fn(&LibraryState, MediaType) -> Vec<String>) -> PerType<Vec<String>> {
    PerType {
        movie: keys(library, MediaType::Movie),
        series: keys(library, MediaType::Series),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
}
