use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::error::GatewayError;
use crate::gateway::client_identifier;
use crate::metrics::{RATE_LIMITED, TRACKED_CLIENTS};
use crate::rate_limit::RateDecision;
use crate::state::AppState;

/// Admits or throttles a request before it reaches a proxy handler.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let identifier = client_identifier(
        request.headers(),
        request.extensions(),
        state.config.trust_forwarded_for,
    );

    let decision = state.rate_limiter.admit(&identifier, Instant::now()).await;
    TRACKED_CLIENTS.set(state.rate_limiter.tracked_clients() as f64);

    match decision {
        RateDecision::Allowed => next.run(request).await,
        RateDecision::Throttled { retry_after_secs } => {
            RATE_LIMITED.inc();
            warn!(client = %identifier, retry_after_secs, "rate limit exceeded");
            GatewayError::RateLimited { retry_after_secs }.into_response()
        }
    }
}
