use axum::Json;
use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::error::upstream_status;
use crate::models::{DiagnosticsResponse, EndpointKind, ProxyRequest};
use crate::state::AppState;
use crate::upstream::UpstreamOutcome;

// fixed point near Tokyo, always covered by the provider
const TEST_LAT: &str = "35";
const TEST_LON: &str = "139";

// GET /api/diagnostics - one live current-weather call to check the key.
// Never cached, never rate limited.
pub async fn diagnostics_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(api_key) = state.api_key() else {
        return report(
            StatusCode::INTERNAL_SERVER_ERROR,
            diagnostics(false, None, 0, "API key not configured".to_string()),
        );
    };

    let request = ProxyRequest {
        kind: EndpointKind::CurrentWeather,
        params: BTreeMap::from([
            ("lat".to_string(), TEST_LAT.to_string()),
            ("lon".to_string(), TEST_LON.to_string()),
        ]),
    };
    let url = state.upstream.build_url(&request, api_key);
    let outcome = state.upstream.forward(request.kind, url, api_key).await;

    let key_len = api_key.chars().count();
    let (code, mut body) = match outcome {
        UpstreamOutcome::Ok(bytes) => {
            let city = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|json| json.get("name")?.as_str().map(str::to_string));
            let mut body = diagnostics(
                true,
                Some(200),
                key_len,
                "API key is valid and working".to_string(),
            );
            body.city = city;
            (StatusCode::OK, body)
        }
        UpstreamOutcome::ProviderError { code, message, .. } => (
            upstream_status(code),
            diagnostics(false, Some(code), key_len, message),
        ),
        UpstreamOutcome::TransportFailure(cause) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            diagnostics(false, None, key_len, cause),
        ),
        UpstreamOutcome::PayloadInvalid(reason) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            diagnostics(
                false,
                Some(200),
                key_len,
                format!("Invalid response from weather API: {reason}"),
            ),
        ),
    };

    // provider messages are echoed back, make sure none of them carry the key
    body.message = body.message.replace(api_key, "[API_KEY]");
    info!(success = body.success, status = ?body.status, "diagnostics call finished");
    report(code, body)
}

fn diagnostics(
    success: bool,
    status: Option<u16>,
    api_key_length: usize,
    message: String,
) -> DiagnosticsResponse {
    DiagnosticsResponse {
        success,
        status,
        api_key_length,
        message,
        city: None,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

fn report(code: StatusCode, body: DiagnosticsResponse) -> Response {
    let mut response = (code, Json(body)).into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
