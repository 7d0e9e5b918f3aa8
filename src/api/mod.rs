//! HTTP routes
//!
//! Status and scan triggers for the local UI, plus the Radarr and Sonarr
//! webhook receivers.

pub mod health;
pub mod scan;
pub mod webhooks;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::ScanError;

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            queued: None,
            error: None,
        }
    }

    pub fn queued(count: usize) -> Self {
        Self {
            queued: Some(count),
            ..Self::ok()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            queued: None,
            error: Some(error.into()),
        }
    }
}

impl ScanError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScanError::TooSoon => StatusCode::TOO_MANY_REQUESTS,
            ScanError::AlreadyRunning => StatusCode::CONFLICT,
            ScanError::InvalidId(_) => StatusCode::BAD_REQUEST,
            ScanError::FolderNotFound(_) => StatusCode::NOT_FOUND,
            ScanError::MissingApiKey => StatusCode::PRECONDITION_FAILED,
        }
    }
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ActionResponse::failed(self.to_string()))).into_response()
    }
}
