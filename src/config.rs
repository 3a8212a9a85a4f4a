use clap::Parser;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::rate_limit::RateLimitPolicy;

pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5";
pub const DEFAULT_GEO_URL: &str = "https://api.openweathermap.org/geo/1.0";

// OpenWeatherMap keys are 32 hex characters
pub const EXPECTED_API_KEY_LEN: usize = 32;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "weather-gateway")]
#[command(about = "Rate-limited caching proxy for the OpenWeatherMap API")]
pub struct Args {
    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    // Provider API key, injected into every upstream call
    #[arg(long, env = "OWM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    // Start without a key and answer 500 per request instead of exiting
    #[arg(long, env = "ALLOW_MISSING_API_KEY", default_value_t = false)]
    pub allow_missing_api_key: bool,

    // Max requests per client within one window
    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 60)]
    pub rate_limit: u32,

    // Max requests across all clients within one window (0 = no global cap)
    #[arg(long, env = "GLOBAL_RATE_LIMIT_MAX", default_value_t = 600)]
    pub global_rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value_t = 60)]
    pub rate_window: u64,

    // Cache TTL in seconds, also used as the Cache-Control max-age
    #[arg(short, long, env = "CACHE_TTL", default_value_t = 600)]
    pub cache_ttl: u64,

    // Upstream request timeout in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT", default_value_t = 8)]
    pub upstream_timeout: u64,

    #[arg(long, env = "OWM_WEATHER_URL", default_value = DEFAULT_WEATHER_URL)]
    pub weather_url: String,

    #[arg(long, env = "OWM_GEO_URL", default_value = DEFAULT_GEO_URL)]
    pub geo_url: String,

    // How often stale rate windows and cache entries are swept, in seconds
    #[arg(long, env = "SWEEP_INTERVAL", default_value_t = 60)]
    pub sweep_interval: u64,

    // Use X-Forwarded-For / X-Real-IP as the client identifier
    #[arg(long, env = "TRUST_FORWARDED_FOR", default_value_t = false)]
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OWM_API_KEY is required (set ALLOW_MISSING_API_KEY=true to start without it)")]
    MissingApiKey,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("invalid {name}: {reason}")]
    InvalidUrl { name: &'static str, reason: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub rate_limit: RateLimitPolicy,
    pub cache_ttl: Duration,
    pub upstream_timeout: Duration,
    pub weather_url: Url,
    pub geo_url: Url,
    pub sweep_interval: Duration,
    pub trust_forwarded_for: bool,
}

impl GatewayConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let api_key = args
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        if api_key.is_none() && !args.allow_missing_api_key {
            return Err(ConfigError::MissingApiKey);
        }
        if args.rate_limit == 0 {
            return Err(ConfigError::Zero("RATE_LIMIT_MAX"));
        }
        if args.rate_window == 0 {
            return Err(ConfigError::Zero("RATE_LIMIT_WINDOW"));
        }
        if args.upstream_timeout == 0 {
            return Err(ConfigError::Zero("UPSTREAM_TIMEOUT"));
        }
        if args.sweep_interval == 0 {
            return Err(ConfigError::Zero("SWEEP_INTERVAL"));
        }

        Ok(Self {
            host: args.host,
            port: args.port,
            api_key,
            rate_limit: RateLimitPolicy {
                per_client_max: args.rate_limit,
                global_max: args.global_rate_limit,
                window: Duration::from_secs(args.rate_window),
            },
            cache_ttl: Duration::from_secs(args.cache_ttl),
            upstream_timeout: Duration::from_secs(args.upstream_timeout),
            weather_url: parse_base_url("OWM_WEATHER_URL", &args.weather_url)?,
            geo_url: parse_base_url("OWM_GEO_URL", &args.geo_url)?,
            sweep_interval: Duration::from_secs(args.sweep_interval),
            trust_forwarded_for: args.trust_forwarded_for,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Base URLs are joined with a trailing path segment later, so keep them
// without a trailing slash
fn parse_base_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim_end_matches('/')).map_err(|error| ConfigError::InvalidUrl {
        name,
        reason: error.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            name,
            reason: format!("{raw} cannot be used as a base URL"),
        });
    }
    Ok(url)
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
