//! Upstream forwarder: builds the provider URL for a validated request,
//! performs exactly one GET and classifies what came back.

use axum::body::Bytes;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::config::{ConfigError, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::metrics::{UPSTREAM_LATENCY, UPSTREAM_REQUESTS};
use crate::models::{EndpointKind, ProxyRequest};

const PREVIEW_CHARS: usize = 200;

// Largest provider body we are willing to buffer. Real responses are a few KiB
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// What a single upstream call produced.
#[derive(Debug)]
pub enum UpstreamOutcome {
    /// 2xx with a JSON body and no embedded error code. Raw bytes as sent.
    Ok(Bytes),
    /// Non-2xx status, or a 2xx JSON body whose `cod` field says otherwise.
    ProviderError {
        code: u16,
        message: String,
        details: Value,
    },
    TransportFailure(String),
    PayloadInvalid(String),
}

impl UpstreamOutcome {
    fn label(&self) -> &'static str {
        match self {
            UpstreamOutcome::Ok(_) => "ok",
            UpstreamOutcome::ProviderError { .. } => "provider_error",
            UpstreamOutcome::TransportFailure(_) => "transport_failure",
            UpstreamOutcome::PayloadInvalid(_) => "payload_invalid",
        }
    }

    /// Maps the outcome onto the caller-facing error taxonomy. `path` is the
    /// inbound path, echoed back on transport failures.
    pub fn into_result(self, path: &str) -> GatewayResult<Bytes> {
        match self {
            UpstreamOutcome::Ok(body) => Ok(body),
            UpstreamOutcome::ProviderError {
                code,
                message,
                details,
            } => Err(GatewayError::Upstream {
                status: code,
                message,
                details,
            }),
            UpstreamOutcome::TransportFailure(message) => Err(GatewayError::UpstreamUnreachable {
                message,
                path: path.to_string(),
            }),
            UpstreamOutcome::PayloadInvalid(reason) => {
                Err(GatewayError::InvalidUpstreamPayload { reason })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    current_url: Url,
    forecast_url: Url,
    air_pollution_url: Url,
    geocoding_url: Url,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|error| ConfigError::HttpClient(error.to_string()))?;

        Ok(Self {
            client,
            current_url: endpoint_url(&config.weather_url, EndpointKind::CurrentWeather)?,
            forecast_url: endpoint_url(&config.weather_url, EndpointKind::Forecast)?,
            air_pollution_url: endpoint_url(&config.weather_url, EndpointKind::AirPollution)?,
            geocoding_url: endpoint_url(&config.geo_url, EndpointKind::Geocoding)?,
            timeout: config.upstream_timeout,
        })
    }

    fn base_for(&self, kind: EndpointKind) -> &Url {
        match kind {
            EndpointKind::CurrentWeather => &self.current_url,
            EndpointKind::Forecast => &self.forecast_url,
            EndpointKind::AirPollution => &self.air_pollution_url,
            EndpointKind::Geocoding => &self.geocoding_url,
        }
    }

    /// Provider URL for a validated request. Weather and forecast calls are
    /// always metric; the key is appended last.
    pub fn build_url(&self, request: &ProxyRequest, api_key: &str) -> Url {
        let mut url = self.base_for(request.kind).clone();
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in &request.params {
                query.append_pair(name, value);
            }
            if matches!(
                request.kind,
                EndpointKind::CurrentWeather | EndpointKind::Forecast
            ) {
                query.append_pair("units", "metric");
            }
            query.append_pair("appid", api_key);
        }
        url
    }

    pub async fn forward(&self, kind: EndpointKind, url: Url, api_key: &str) -> UpstreamOutcome {
        let redacted = url.as_str().replace(api_key, "[API_KEY]");
        debug!(endpoint = %kind, url = %redacted, "fetching from provider");

        let start = Instant::now();
        let outcome = self.fetch(url).await;
        UPSTREAM_LATENCY.observe(start.elapsed().as_secs_f64());
        UPSTREAM_REQUESTS
            .with_label_values(&[kind.as_str(), outcome.label()])
            .inc();

        match &outcome {
            UpstreamOutcome::Ok(body) => {
                debug!(endpoint = %kind, bytes = body.len(), "provider call succeeded")
            }
            UpstreamOutcome::ProviderError { code, message, .. } => {
                warn!(endpoint = %kind, code, %message, "provider returned an error")
            }
            UpstreamOutcome::TransportFailure(cause) => {
                warn!(endpoint = %kind, %cause, "provider unreachable")
            }
            UpstreamOutcome::PayloadInvalid(reason) => {
                warn!(endpoint = %kind, %reason, "provider returned an unusable body")
            }
        }
        outcome
    }

    async fn fetch(&self, url: Url) -> UpstreamOutcome {
        let response = match self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => return UpstreamOutcome::TransportFailure(self.describe(error)),
        };

        let status = response.status();
        let body = match self.read_body(response).await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        if !status.is_success() {
            let parsed = serde_json::from_slice::<Value>(&body).ok();
            let message = parsed
                .as_ref()
                .and_then(|json| json.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            let details = parsed.unwrap_or_else(|| Value::String(preview(&body)));
            return UpstreamOutcome::ProviderError {
                code: status.as_u16(),
                message,
                details,
            };
        }

        let json = match serde_json::from_slice::<Value>(&body) {
            Ok(json) => json,
            Err(error) => {
                debug!(preview = %preview(&body), "unparsable provider body");
                return UpstreamOutcome::PayloadInvalid(error.to_string());
            }
        };

        match embedded_error(&json) {
            Some((code, message)) => UpstreamOutcome::ProviderError {
                code,
                message,
                details: json,
            },
            None => UpstreamOutcome::Ok(body),
        }
    }

    // Buffers the body chunk by chunk, giving up once it passes MAX_BODY_BYTES
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Bytes, UpstreamOutcome> {
        let too_large =
            || UpstreamOutcome::PayloadInvalid(format!("body exceeds {MAX_BODY_BYTES} bytes"));

        if response
            .content_length()
            .is_some_and(|len| len > MAX_BODY_BYTES as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if body.len() + chunk.len() > MAX_BODY_BYTES {
                        return Err(too_large());
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => return Ok(Bytes::from(body)),
                Err(error) => return Err(UpstreamOutcome::TransportFailure(self.describe(error))),
            }
        }
    }

    // reqwest errors carry the request URL, which carries the key
    fn describe(&self, error: reqwest::Error) -> String {
        if error.is_timeout() {
            format!(
                "weather API did not respond within {}s",
                self.timeout.as_secs()
            )
        } else if error.is_connect() {
            "could not connect to weather API".to_string()
        } else {
            error.without_url().to_string()
        }
    }
}

fn endpoint_url(base: &Url, kind: EndpointKind) -> Result<Url, ConfigError> {
    let raw = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        kind.upstream_path()
    );
    Url::parse(&raw).map_err(|error| ConfigError::InvalidUrl {
        name: kind.as_str(),
        reason: error.to_string(),
    })
}

/// The provider reports some failures inside a 200 body, as `cod` holding a
/// number or a numeric string.
pub fn embedded_error(json: &Value) -> Option<(u16, String)> {
    let code = match json.get("cod")? {
        Value::Number(number) => number.as_u64().and_then(|code| u16::try_from(code).ok())?,
        Value::String(text) => text.trim().parse::<u16>().ok()?,
        _ => return None,
    };

    if code == 200 {
        return None;
    }

    let message = json
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("weather API reported an error")
        .to_string();
    Some((code, message))
}

fn preview(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(PREVIEW_CHARS)
        .collect()
}
