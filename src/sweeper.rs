use std::sync::Arc;
use std::time::Instant;
use tokio::time::{Duration, interval};
use tracing::{debug, info};

use crate::metrics::TRACKED_CLIENTS;
use crate::state::AppState;

// One pass: prune rate windows, forget idle clients, drop stale cache entries
pub async fn sweep_once(state: &AppState, now: Instant) -> (usize, usize) {
    let evicted = state.rate_limiter.sweep(now).await;
    let purged = state.cache.purge_expired(now);
    TRACKED_CLIENTS.set(state.rate_limiter.tracked_clients() as f64);
    (evicted, purged)
}

// Background sweeper - runs every `every` until the process exits
pub async fn sweeper(state: Arc<AppState>, every: Duration) {
    let mut interval = interval(every);

    info!(interval = ?every, "sweeper started");

    loop {
        interval.tick().await;

        let (evicted, purged) = sweep_once(&state, Instant::now()).await;
        if evicted > 0 || purged > 0 {
            debug!(
                evicted_clients = evicted,
                purged_cache_entries = purged,
                remaining_clients = state.rate_limiter.tracked_clients(),
                "sweep completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Args, GatewayConfig};
    use axum::body::Bytes;
    use clap::Parser;

    #[tokio::test]
    async fn sweep_clears_idle_clients_and_stale_cache() {
        let args = Args::parse_from(["weather-gateway", "--allow-missing-api-key"]);
        let state = AppState::new(GatewayConfig::from_args(args).unwrap()).unwrap();
        let now = Instant::now();

        state.rate_limiter.admit("10.0.0.1", now).await;
        state.rate_limiter.admit("10.0.0.2", now).await;
        state
            .cache
            .insert("key".to_string(), Bytes::from_static(b"{}"), now);

        assert_eq!(sweep_once(&state, now).await, (0, 0));

        let later = now + Duration::from_secs(3600);
        assert_eq!(sweep_once(&state, later).await, (2, 1));
        assert_eq!(state.rate_limiter.tracked_clients(), 0);
        assert!(state.cache.is_empty());
    }
}
