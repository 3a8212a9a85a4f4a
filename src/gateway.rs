//! Request admission: turns a raw `/api/...` path and query string into a
//! validated [`ProxyRequest`], and decides which identifier a request is
//! rate limited under.

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Extensions};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use crate::config::EXPECTED_API_KEY_LEN;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{EndpointKind, ProxyRequest};

pub const DEFAULT_LANG: &str = "en";
pub const DEFAULT_GEO_LIMIT: u32 = 5;
pub const UNKNOWN_CLIENT: &str = "unknown";

// Substring patterns, checked in order
const ROUTES: &[(&str, EndpointKind)] = &[
    ("/weather/current", EndpointKind::CurrentWeather),
    ("/weather/forecast", EndpointKind::Forecast),
    ("/weather/air-pollution", EndpointKind::AirPollution),
    ("/geo/direct", EndpointKind::Geocoding),
    ("/geocoding", EndpointKind::Geocoding),
];

pub fn endpoint_for_path(path: &str) -> Option<EndpointKind> {
    ROUTES
        .iter()
        .find(|(pattern, _)| path.contains(pattern))
        .map(|(_, kind)| *kind)
}

/// Classifies a request and validates its parameters.
pub fn classify(path: &str, query: &HashMap<String, String>) -> GatewayResult<ProxyRequest> {
    let kind = endpoint_for_path(path).ok_or(GatewayError::InvalidEndpoint)?;
    let mut params = BTreeMap::new();

    if kind.is_location_based() {
        let (lat, lon) = coordinates(query)?;
        params.insert("lat".to_string(), lat);
        params.insert("lon".to_string(), lon);

        if kind != EndpointKind::AirPollution {
            let lang = non_blank(query, "lang").unwrap_or(DEFAULT_LANG);
            params.insert("lang".to_string(), lang.to_string());
        }
    } else {
        let q = non_blank(query, "q").ok_or_else(|| {
            GatewayError::MissingParameters("City name (q) is required".to_string())
        })?;
        params.insert("q".to_string(), q.to_string());
        params.insert("limit".to_string(), geo_limit(query)?.to_string());
    }

    Ok(ProxyRequest { kind, params })
}

fn non_blank<'a>(query: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    query
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn coordinates(query: &HashMap<String, String>) -> GatewayResult<(String, String)> {
    let lat = non_blank(query, "lat");
    let lon = non_blank(query, "lon");

    let (lat, lon) = match (lat, lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        (None, None) => {
            return Err(GatewayError::MissingParameters(
                "Latitude (lat) and longitude (lon) are required".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(GatewayError::MissingParameters(
                "Latitude (lat) is required".to_string(),
            ));
        }
        (Some(_), None) => {
            return Err(GatewayError::MissingParameters(
                "Longitude (lon) is required".to_string(),
            ));
        }
    };

    check_coordinate("lat", lat, 90.0)?;
    check_coordinate("lon", lon, 180.0)?;
    Ok((lat.to_string(), lon.to_string()))
}

fn check_coordinate(name: &str, raw: &str, bound: f64) -> GatewayResult<()> {
    let value: f64 = raw
        .parse()
        .map_err(|_| GatewayError::InvalidParameter(format!("{name} must be a number, got '{raw}'")))?;

    if !value.is_finite() || value.abs() > bound {
        return Err(GatewayError::InvalidParameter(format!(
            "{name} must be between -{bound} and {bound}, got {raw}"
        )));
    }
    Ok(())
}

fn geo_limit(query: &HashMap<String, String>) -> GatewayResult<u32> {
    match non_blank(query, "limit") {
        None => Ok(DEFAULT_GEO_LIMIT),
        Some(raw) => match raw.parse::<u32>() {
            Ok(limit) if limit > 0 => Ok(limit),
            _ => Err(GatewayError::InvalidParameter(format!(
                "limit must be a positive integer, got '{raw}'"
            ))),
        },
    }
}

/// Server-side key checks done before anything goes upstream.
pub fn require_api_key(api_key: Option<&str>) -> GatewayResult<&str> {
    let key = api_key.ok_or(GatewayError::MissingApiKey)?;
    if key.len() != EXPECTED_API_KEY_LEN {
        return Err(GatewayError::MalformedApiKey {
            expected: EXPECTED_API_KEY_LEN,
            actual: key.len(),
        });
    }
    Ok(key)
}

/// Rate limit identifier for a request: the peer IP, or the first
/// forwarded address when the gateway sits behind a trusted proxy.
pub fn client_identifier(headers: &HeaderMap, extensions: &Extensions, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .or_else(|| headers.get("x-real-ip").and_then(|value| value.to_str().ok()))
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
