//! Route table for the external HTTP contract (spec §6):
//!
//! - `GET|POST /api/search`
//! - `GET /api/health`
//!
//! Concurrency is bounded at the router, not per-handler, via
//! `tower::limit::ConcurrencyLimitLayer(HTTP_MAX_CONNS)`, layered in the
//! same position a nested router would otherwise apply per-route auth or
//! rate-limit middleware, swapped for the one ambient concern this
//! system actually has.

use axum::routing::get;
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;

use super::handlers::{health, search_get, search_post, AppState};
use super::middleware::{cors_layer, request_id_middleware, request_logging_middleware, security_headers_middleware};
use crate::config::Config;

/// Build the full application router.
pub fn create_router(state: AppState, config: &Config) -> Router {
    let api_routes = Router::new()
        .route("/search", get(search_get).post(search_post))
        .route("/health", get(health));

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id_middleware))
                .layer(axum::middleware::from_fn(security_headers_middleware))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(cors_layer())
                .layer(ConcurrencyLimitLayer::new(config.http_max_conns)),
        )
        .with_state(state)
}
