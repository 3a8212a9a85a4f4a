use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, IntCounterVec, register_counter, register_gauge,
    register_histogram, register_int_counter_vec,
};

// Registration only fails on a duplicate name, which is a programming error
lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("weather_gateway_requests_total", "Total number of proxied requests")
            .unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("weather_gateway_rate_limited_total", "Requests rejected with 429")
            .unwrap();
    pub static ref UPSTREAM_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "weather_gateway_upstream_requests_total",
        "Upstream calls by endpoint and outcome",
        &["endpoint", "outcome"]
    )
    .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("weather_gateway_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("weather_gateway_cache_misses_total", "Total cache misses").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "weather_gateway_upstream_latency_seconds",
        "Upstream call latency in seconds"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("weather_gateway_cache_size", "Current number of items in cache").unwrap();
    pub static ref TRACKED_CLIENTS: Gauge = register_gauge!(
        "weather_gateway_tracked_clients",
        "Client identifiers with an active rate window"
    )
    .unwrap();
}
