use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use prism_core::{SessionId, StartError};

use crate::api::ApiResponse;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    InvalidRequest(#[from] StartError),

    #[error("session {0} already has an active publish run")]
    SessionActive(SessionId),

    #[error("no active publish run for session {0}")]
    RunNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(e) => e.error_kind(),
            Self::SessionActive(_) => "session_active",
            Self::RunNotFound(_) => "run_not_found",
            Self::Io(_) => "io",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SessionActive(_) => StatusCode::CONFLICT,
            Self::RunNotFound(_) => StatusCode::NOT_FOUND,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(ApiResponse::<serde_json::Value>::error(self.to_string()))).into_response()
    }
}
