use axum::body::{Body, Bytes};
use axum::extract::{RawQuery, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::response::Response;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::cache::make_cache_key;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{classify, require_api_key};
use crate::metrics::{CACHE_HITS, CACHE_MISSES, REQUEST_TOTAL};
use crate::state::AppState;

// GET /api/* - classify, serve from cache or forward upstream
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    RawQuery(raw_query): RawQuery,
) -> GatewayResult<Response> {
    REQUEST_TOTAL.inc();

    let api_key = require_api_key(state.api_key())?;
    let query = parse_query(raw_query.as_deref());
    let request = classify(uri.path(), &query)?;

    let cache_key = make_cache_key(&request);

    // check cache first
    if let Some((body, remaining)) = state.cache.get(&cache_key, Instant::now()) {
        CACHE_HITS.inc();
        debug!(endpoint = %request.kind, "cache hit");
        return Ok(json_response(body, remaining));
    }

    // identical misses queue here, and all but the first find the cache filled
    let _flight = state.cache.single_flight(&cache_key).await;
    if let Some((body, remaining)) = state.cache.get(&cache_key, Instant::now()) {
        CACHE_HITS.inc();
        debug!(endpoint = %request.kind, "cache filled while waiting");
        return Ok(json_response(body, remaining));
    }
    CACHE_MISSES.inc();

    let url = state.upstream.build_url(&request, api_key);
    let body = state
        .upstream
        .forward(request.kind, url, api_key)
        .await
        .into_result(uri.path())?;

    state.cache.insert(cache_key, body.clone(), Instant::now());
    Ok(json_response(body, state.cache.ttl()))
}

pub async fn not_found_handler() -> GatewayError {
    GatewayError::NotFound
}

// Later duplicates win, matching how most frameworks read a query string
fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    raw.map(|raw| {
        url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect()
    })
    .unwrap_or_default()
}

// Success is passed through untouched, with a cache directive for clients.
// `max_age` is whatever freshness the body has left, rounded down
fn json_response(body: Bytes, max_age: Duration) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", max_age.as_secs())) {
        headers.insert(CACHE_CONTROL, value);
    }
    response
}
