use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use tracing::error;

use crate::{dto::image::ImageParseError, orchestrator::OrchestratorError, registry::RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("a reconciliation pass is already running")]
    PassInProgress,
    #[error("no tag of '{image}' matches pattern '{pattern}'")]
    NoMatch {
        image: String,
        pattern: String,
    },
    #[error("{0}")]
    InvalidImage(#[from] ImageParseError),
    #[error("{0}")]
    Registry(#[from] RegistryError),
    #[error("{0}")]
    Orchestrator(#[from] OrchestratorError),
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub error: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::PassInProgress => StatusCode::CONFLICT,
            AppError::NoMatch { .. } => StatusCode::NOT_FOUND,
            AppError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            AppError::Registry(_) | AppError::Orchestrator(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (
            status,
            Json(ErrorMessage { error: self.to_string() }),
        ).into_response()
    }
}
