use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::config::ConfigError;
use crate::models::ErrorBody;

const KEY_HELP: &str = "Set OWM_API_KEY to a valid OpenWeatherMap API key and restart the gateway";

/// Every way a proxied request can fail. Converted into the JSON error
/// envelope at the HTTP boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("API key should be {expected} characters, got {actual}")]
    MalformedApiKey { expected: usize, actual: usize },

    #[error("Invalid endpoint")]
    InvalidEndpoint,

    #[error("{0}")]
    MissingParameters(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("Too many requests, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Weather API error {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
        details: serde_json::Value,
    },

    #[error("Weather API returned an unusable payload")]
    InvalidUpstreamPayload { reason: String },

    #[error("Failed to reach weather API: {message}")]
    UpstreamUnreachable { message: String, path: String },

    #[error("Endpoint not found")]
    NotFound,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingApiKey | GatewayError::MalformedApiKey { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::InvalidEndpoint
            | GatewayError::MissingParameters(_)
            | GatewayError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream { status, .. } => upstream_status(*status),
            GatewayError::InvalidUpstreamPayload { .. } | GatewayError::UpstreamUnreachable { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            GatewayError::MissingApiKey => ErrorBody {
                error: self.to_string(),
                message: Some("The OWM_API_KEY environment variable is not set".to_string()),
                help: Some(KEY_HELP.to_string()),
                ..Default::default()
            },
            GatewayError::MalformedApiKey { .. } => ErrorBody {
                error: "Invalid API key format".to_string(),
                message: Some(self.to_string()),
                help: Some(KEY_HELP.to_string()),
                ..Default::default()
            },
            GatewayError::InvalidEndpoint | GatewayError::NotFound => ErrorBody {
                error: self.to_string(),
                ..Default::default()
            },
            GatewayError::MissingParameters(message) => ErrorBody {
                error: "Missing required parameters".to_string(),
                message: Some(message.clone()),
                ..Default::default()
            },
            GatewayError::InvalidParameter(message) => ErrorBody {
                error: "Invalid parameter".to_string(),
                message: Some(message.clone()),
                ..Default::default()
            },
            GatewayError::RateLimited { retry_after_secs } => ErrorBody {
                error: "Too many requests".to_string(),
                message: Some("Please try again later".to_string()),
                retry_after_seconds: Some(*retry_after_secs),
                ..Default::default()
            },
            GatewayError::Upstream {
                status,
                message,
                details,
            } => ErrorBody {
                error: "Weather API error".to_string(),
                status: Some(*status),
                message: Some(message.clone()),
                details: Some(details.clone()),
                ..Default::default()
            },
            GatewayError::InvalidUpstreamPayload { reason } => ErrorBody {
                error: "Invalid response from weather API".to_string(),
                message: Some(format!("{self}: {reason}")),
                hint: Some(
                    "The provider may be down or returning an error page; try again shortly"
                        .to_string(),
                ),
                ..Default::default()
            },
            GatewayError::UpstreamUnreachable { message, path } => ErrorBody {
                error: "Failed to fetch data".to_string(),
                message: Some(message.clone()),
                path: Some(path.clone()),
                ..Default::default()
            },
        }
    }
}

// Provider 4xx/5xx statuses reach the caller unchanged, anything else is ours
pub(crate) fn upstream_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_client_error() || code.is_server_error() => code,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self.body())).into_response();

        if let GatewayError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Anything that stops the server from starting or keeps it from serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
