//! Response assembly: rate limit headers, the 429 page and flavor representations.

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;

use crate::catalog::FlavorRecord;
use crate::ratelimit::{RateLimitDecision, INTERVAL_LABEL};

pub const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-rate-limit-limit");
pub const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-rate-limit-remaining");
pub const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-rate-limit-reset");

/// Collection path; item paths append the encoded name.
pub const FLAVORS_PATH: &str = "/api/v1/flavors";

const TOO_MANY_REQUESTS_TEMPLATE: &str = include_str!("../../templates/429.html");

/// Characters escaped in a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Attach the `X-Rate-Limit-*` headers for `decision`.
///
/// `remaining` is reported as zero once the limit is spent.
pub fn with_rate_limit_headers(mut response: Response, decision: &RateLimitDecision) -> Response {
    insert_rate_limit_headers(response.headers_mut(), decision);
    response
}

pub fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining.max(0)));
    headers.insert(X_RATE_LIMIT_RESET, HeaderValue::from(decision.reset_seconds));
}

/// Render the 429 page.
pub fn render_too_many_requests(decision: &RateLimitDecision) -> String {
    TOO_MANY_REQUESTS_TEMPLATE
        .replace("{{ limit }}", &decision.limit.to_string())
        .replace("{{ interval }}", INTERVAL_LABEL)
        .replace("{{ reset }}", &decision.reset_seconds.to_string())
}

/// The 429 response, headers included.
pub fn too_many_requests(decision: &RateLimitDecision) -> Response {
    let response = (
        StatusCode::TOO_MANY_REQUESTS,
        [(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
        render_too_many_requests(decision),
    )
        .into_response();
    with_rate_limit_headers(response, decision)
}

/// Absolute URL of the item endpoint for `name`.
pub fn flavor_uri(base_url: &str, name: &str) -> String {
    let segment = name.to_lowercase();
    format!(
        "{}{}/{}",
        base_url.trim_end_matches('/'),
        FLAVORS_PATH,
        utf8_percent_encode(&segment, PATH_SEGMENT)
    )
}

/// A flavor as clients see it: the numeric id is replaced by its URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlavorView {
    pub uri: String,
    pub name: String,
    pub stock: i64,
}

impl FlavorView {
    pub fn new(record: &FlavorRecord, base_url: &str) -> Self {
        Self {
            uri: flavor_uri(base_url, &record.name),
            name: record.name.clone(),
            stock: record.stock,
        }
    }
}
