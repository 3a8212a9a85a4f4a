use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// The four logical operations the gateway proxies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    CurrentWeather,
    Forecast,
    AirPollution,
    Geocoding,
}

impl EndpointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointKind::CurrentWeather => "current",
            EndpointKind::Forecast => "forecast",
            EndpointKind::AirPollution => "air_pollution",
            EndpointKind::Geocoding => "geocoding",
        }
    }

    // Path segment on the provider side
    pub fn upstream_path(self) -> &'static str {
        match self {
            EndpointKind::CurrentWeather => "weather",
            EndpointKind::Forecast => "forecast",
            EndpointKind::AirPollution => "air_pollution",
            EndpointKind::Geocoding => "direct",
        }
    }

    pub fn is_location_based(self) -> bool {
        !matches!(self, EndpointKind::Geocoding)
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Validated request - endpoint plus the upstream parameters it needs
// (already normalised, defaults applied, API key not included)
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    pub kind: EndpointKind,
    pub params: BTreeMap<String, String>,
}

impl ProxyRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

// /api/health response format
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub api_key_configured: bool,
    pub version: &'static str,
}

// /api/diagnostics response format. Reports on the key, never its value
#[derive(Debug, Serialize)]
pub struct DiagnosticsResponse {
    pub success: bool,
    // provider status, absent when the provider was never reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub api_key_length: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub timestamp: String,
}

// JSON error envelope, `error` is always present
#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}
