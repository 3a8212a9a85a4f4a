//! Rate-limited caching proxy in front of the OpenWeatherMap API.
//!
//! Inbound `/api/...` requests are admitted by the two-tier rate limiter,
//! classified into one of four endpoints, served from the response cache
//! when possible and otherwise forwarded upstream with the server-side key.

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod sweeper;
pub mod upstream;

use axum::Router;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    diagnostics_handler, health_handler, metrics_handler, not_found_handler, proxy_handler,
};
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;

/// Builds the full application router around shared state.
pub fn router(state: Arc<AppState>) -> Router {
    // only proxied calls count against the rate limit
    let proxied = Router::new()
        .route("/api/{*path}", get(proxy_handler))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(86_400));

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/diagnostics", get(diagnostics_handler))
        .route("/metrics", get(metrics_handler))
        .merge(proxied)
        .fallback(not_found_handler)
        // header layers sit outside CORS so preflight replies get them too
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("x-xss-protection"),
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
