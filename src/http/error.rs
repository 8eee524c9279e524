//! HTTP-facing error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::response::too_many_requests;
use crate::catalog::CatalogError;
use crate::ratelimit::{RateLimitDecision, RateLimitError};

/// Every way a request can end without success.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The client spent its limit for the current minute.
    #[error("Rate limit of {} per minute exceeded", .0.limit)]
    RateLimitExceeded(RateLimitDecision),

    #[error("Write permission denied")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    /// The counter store could not be reached; the request fails closed.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::RateLimitExceeded(decision) = &self {
            return too_many_requests(decision);
        }

        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = json!({
            "error": {
                "status": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let message = err.to_string();
        match err {
            CatalogError::NotFound(_) => ApiError::NotFound(message),
            CatalogError::Conflict(_) => ApiError::Conflict(message),
            CatalogError::InvalidInput(_) => ApiError::InvalidInput(message),
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        ApiError::UpstreamUnavailable(err.to_string())
    }
}
