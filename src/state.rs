use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::{ConfigError, GatewayConfig};
use crate::rate_limit::{InMemoryRateLimiter, RateLimitStore};
use crate::upstream::UpstreamClient;

// app's shared state
pub struct AppState {
    pub config: GatewayConfig,
    pub upstream: UpstreamClient,
    pub cache: ResponseCache,                   // successful bodies, keyed per request
    pub rate_limiter: Arc<dyn RateLimitStore>, // global + per-client windows
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let limiter = Arc::new(InMemoryRateLimiter::new(config.rate_limit));
        Self::with_rate_limiter(config, limiter)
    }

    // Swap in another counter backend (shared store, test double)
    pub fn with_rate_limiter(
        config: GatewayConfig,
        rate_limiter: Arc<dyn RateLimitStore>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            upstream: UpstreamClient::new(&config)?,
            cache: ResponseCache::new(config.cache_ttl),
            rate_limiter,
            config,
        })
    }

    pub fn api_key(&self) -> Option<&str> {
        self.config.api_key.as_deref()
    }
}
