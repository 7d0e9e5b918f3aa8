//! Radarr and Sonarr webhook receivers

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::services::webhooks::{RadarrPayload, SonarrPayload};
use crate::services::WebhookOutcome;
use crate::AppState;

fn respond(outcome: WebhookOutcome) -> (StatusCode, String) {
    match outcome {
        WebhookOutcome::Queued(_) => (StatusCode::OK, "Success".to_string()),
        WebhookOutcome::NotUseful(event_type) => (StatusCode::OK, format!("{} event is not useful", event_type)),
        WebhookOutcome::Duplicate => (StatusCode::OK, "Duplicate event ignored".to_string()),
        WebhookOutcome::PathInaccessible(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Path inaccessible".to_string()),
    }
}

async fn radarr(State(state): State<AppState>, Json(payload): Json<RadarrPayload>) -> (StatusCode, String) {
    respond(state.webhooks.radarr(payload))
}

async fn sonarr(State(state): State<AppState>, Json(payload): Json<SonarrPayload>) -> (StatusCode, String) {
    respond(state.webhooks.sonarr(payload))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/radarr", post(radarr))
        .route("/sonarr", post(sonarr))
}
