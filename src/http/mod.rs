//! HTTP surface of the flavor API.

pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod response;
pub mod server;
pub mod state;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;

pub use error::ApiError;
pub use pipeline::Access;
pub use response::{FlavorView, FLAVORS_PATH, X_RATE_LIMIT_LIMIT, X_RATE_LIMIT_REMAINING, X_RATE_LIMIT_RESET};
pub use server::HttpServer;
pub use state::AppState;

/// Build the flavor API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/v1/flavors",
            get(handlers::list_flavors).post(handlers::create_flavor),
        )
        .route(
            "/api/v1/flavors/{name}",
            get(handlers::get_flavor)
                .put(handlers::update_flavor)
                .delete(handlers::delete_flavor),
        )
        .with_state(state)
}
