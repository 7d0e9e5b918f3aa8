//! Manual scan triggers, cancellation and re-matching

use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::ActionResponse;
use crate::error::ScanError;
use crate::media::MediaType;
use crate::services::ScanTarget;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ScanQuery {
    /// Restrict an overwrite scan to one media type
    #[serde(rename = "type")]
    pub media_type: Option<MediaType>,
    /// One configured media folder
    pub folder: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct RematchRequest {
    /// Folder key, optionally with its parent disambiguator
    pub folder: String,
    /// IMDb id or a URL containing one
    pub id: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
}

#[derive(Debug, serde::Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

fn target(media_type: Option<MediaType>, folder: Option<PathBuf>) -> Result<ScanTarget, ScanError> {
    match (media_type, folder) {
        (Some(media_type), Some(folder)) => Ok(ScanTarget::Folder(media_type, folder)),
        (None, Some(folder)) => Err(ScanError::FolderNotFound(folder.display().to_string())),
        (Some(media_type), None) => Ok(ScanTarget::Type(media_type)),
        (None, None) => Ok(ScanTarget::All),
    }
}

/// `all`, a media type, or `overwrite`
async fn scan(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ScanQuery>,
) -> Result<Json<ActionResponse>, (StatusCode, Json<ActionResponse>)> {
    let into_response = |e: ScanError| (e.status_code(), Json(ActionResponse::failed(e.to_string())));

    let queued = match kind.as_str() {
        "all" => {
            let target = target(query.media_type, query.folder).map_err(into_response)?;
            state.scanner.run_full_scan(target)
        }
        "overwrite" => {
            let target = target(query.media_type, query.folder).map_err(into_response)?;
            state.scanner.force_overwrite_scan(target)
        }
        other => match other.parse::<MediaType>() {
            Ok(media_type) => {
                let target = target(Some(media_type), query.folder).map_err(into_response)?;
                state.scanner.run_full_scan(target)
            }
            Err(e) => return Err((StatusCode::NOT_FOUND, Json(ActionResponse::failed(e)))),
        },
    }
    .map_err(into_response)?;

    info!(kind = %kind, queued = queued, "Scan requested");
    Ok(Json(ActionResponse::queued(queued)))
}

async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.scanner.cancel(),
    })
}

async fn rematch(
    State(state): State<AppState>,
    Json(body): Json<RematchRequest>,
) -> Result<Json<ActionResponse>, ScanError> {
    state.scanner.rematch(&body.folder, &body.id, body.media_type)?;
    Ok(Json(ActionResponse::ok()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scan/{kind}", post(scan))
        .route("/cancel", post(cancel))
        .route("/rematch", post(rematch))
}
