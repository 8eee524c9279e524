//! The per-request pipeline.
//!
//! `rate limit -> [write gate] -> operation -> rate limit headers`. A denied
//! rate limit check ends the request with the 429 page, a denied write with
//! 403; everything after the rate limit check carries its headers.

use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::net::IpAddr;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use super::error::ApiError;
use super::response::with_rate_limit_headers;
use super::state::AppState;
use crate::catalog::FlavorCatalog;

/// Whether an endpoint mutates the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn for_method(method: &Method) -> Self {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => Access::Read,
            _ => Access::Write,
        }
    }
}

/// Run `operation` for a client once the rate limit and write gate allow it.
pub async fn dispatch<F>(state: &AppState, client: IpAddr, method: &Method, operation: F) -> Response
where
    F: FnOnce(&FlavorCatalog) -> Result<Value, ApiError>,
{
    let span = info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %method,
        client = %client,
    );

    async move {
        let client = client.to_string();
        let now = state.clock.unix_seconds();

        let decision = match state.limiter.evaluate(&client, method.as_str(), now).await {
            Ok(decision) => decision,
            Err(e) => return ApiError::from(e).into_response(),
        };

        if decision.exceeded {
            info!(limit = decision.limit, reset = decision.reset_seconds, "Request rate limited");
            return ApiError::RateLimitExceeded(decision).into_response();
        }

        let allowed = match Access::for_method(method) {
            Access::Read => true,
            Access::Write => state.gate.is_write_allowed(&client).await,
        };
        let result = if allowed {
            operation(&state.catalog)
        } else {
            info!("Write denied");
            Err(ApiError::Forbidden)
        };

        let response = match result {
            Ok(body) => Json(body).into_response(),
            Err(e) => e.into_response(),
        };

        debug!(
            status = response.status().as_u16(),
            remaining = decision.remaining,
            "Request handled"
        );
        with_rate_limit_headers(response, &decision)
    }
    .instrument(span)
    .await
}
