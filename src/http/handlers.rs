//! Flavor endpoint handlers.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use super::error::ApiError;
use super::pipeline::dispatch;
use super::response::FlavorView;
use super::state::AppState;

/// `GET /api/v1/flavors`
pub async fn list_flavors(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let base_url = state.base_url(&headers);
    dispatch(&state, peer.ip(), &method, |catalog| {
        let flavors = catalog.list();
        if flavors.is_empty() {
            return Err(ApiError::NotFound("No flavors available".to_string()));
        }
        let views: Vec<FlavorView> = flavors.iter().map(|f| FlavorView::new(f, &base_url)).collect();
        Ok(json!({ "flavors": views }))
    })
    .await
}

/// `GET /api/v1/flavors/{name}`
pub async fn get_flavor(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    name: Result<Path<String>, PathRejection>,
) -> Response {
    let base_url = state.base_url(&headers);
    dispatch(&state, peer.ip(), &method, |catalog| {
        let name = path_name(name)?;
        let flavor = catalog.get(&name)?;
        Ok(json!({ "flavor": FlavorView::new(&flavor, &base_url) }))
    })
    .await
}

/// `POST /api/v1/flavors`
pub async fn create_flavor(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let base_url = state.base_url(&headers);
    dispatch(&state, peer.ip(), &method, |catalog| {
        let payload = parse_body(body)?;
        let flavor = catalog.create_from_payload(&payload)?;
        Ok(json!({ "flavor": FlavorView::new(&flavor, &base_url) }))
    })
    .await
}

/// `PUT /api/v1/flavors/{name}`
pub async fn update_flavor(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    headers: HeaderMap,
    name: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let base_url = state.base_url(&headers);
    dispatch(&state, peer.ip(), &method, |catalog| {
        let name = path_name(name)?;
        // An unknown flavor is reported before a malformed body.
        catalog.get(&name)?;
        let payload = parse_body(body)?;
        let flavor = catalog.update_from_payload(&name, &payload)?;
        Ok(json!({ "flavor": FlavorView::new(&flavor, &base_url) }))
    })
    .await
}

/// `DELETE /api/v1/flavors/{name}`
pub async fn delete_flavor(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    name: Result<Path<String>, PathRejection>,
) -> Response {
    dispatch(&state, peer.ip(), &method, |catalog| {
        let name = path_name(name)?;
        catalog.delete(&name)?;
        Ok(json!({ "deleted": true }))
    })
    .await
}

/// Path rejections are reported from inside the pipeline so they are still rate limited.
fn path_name(name: Result<Path<String>, PathRejection>) -> Result<String, ApiError> {
    name.map(|Path(name)| name).map_err(|e| ApiError::InvalidInput(e.body_text()))
}

/// An empty body is `null`; anything else must be valid JSON.
fn parse_body(body: Result<Bytes, BytesRejection>) -> Result<Value, ApiError> {
    let body = body.map_err(|e| ApiError::InvalidInput(e.body_text()))?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidInput(format!("request body is not valid JSON: {}", e)))
}
