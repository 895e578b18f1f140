//! API error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::services::QueryError;

/// HTTP-facing error; renders as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed path or query parameter.
    #[error("{0}")]
    BadRequest(String),

    /// Nothing to return.
    #[error("{0}")]
    NotFound(&'static str),

    /// Upstream source failed.
    #[error("{0}")]
    BadGateway(String),

    /// Store or runtime failure.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Map a query failure, using `not_found` as the no-data message.
    #[must_use]
    pub fn from_query(error: QueryError, not_found: &'static str) -> Self {
        match error {
            QueryError::NoData(_) => Self::NotFound(not_found),
            QueryError::MissingParameter(_) => {
                Self::BadRequest("Start and end dates are required".to_string())
            }
            QueryError::InvalidRange { .. } => Self::BadRequest(error.to_string()),
            QueryError::Upstream(e) => Self::BadGateway(e.to_string()),
            QueryError::Storage(e) => Self::Internal(e.to_string()),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(message) => tracing::error!(error = %message, "Request failed"),
            Self::BadGateway(message) => tracing::warn!(error = %message, "Upstream request failed"),
            Self::BadRequest(_) | Self::NotFound(_) => {}
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
