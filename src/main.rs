use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use weather_gateway::config::{self, Args, EXPECTED_API_KEY_LEN, GatewayConfig};
use weather_gateway::error::StartupError;
use weather_gateway::state::AppState;
use weather_gateway::sweeper::sweeper;

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();
    config::init_tracing();

    // parse cli arguments (env vars fill in anything not on the command line)
    let args = Args::parse();
    let config = GatewayConfig::from_args(args)?;

    match config.api_key.as_deref() {
        None => warn!("OWM_API_KEY not configured, weather requests will answer 500"),
        Some(key) if key.len() != EXPECTED_API_KEY_LEN => warn!(
            length = key.len(),
            expected = EXPECTED_API_KEY_LEN,
            "OWM_API_KEY looks malformed, weather requests will answer 500"
        ),
        Some(_) => info!("OWM_API_KEY configured"),
    }

    let state = Arc::new(AppState::new(config.clone())?);

    // spawn the background sweeper
    tokio::spawn(sweeper(Arc::clone(&state), config.sweep_interval));

    let app = weather_gateway::router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "weather gateway listening");
    info!(
        upstream = %config.weather_url,
        geocoding = %config.geo_url,
        "forwarding to provider"
    );
    info!(
        per_client = config.rate_limit.per_client_max,
        global = config.rate_limit.global_max,
        window_secs = config.rate_limit.window.as_secs(),
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "rate limit and cache configured"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server shut down");
    Ok(())
}

// Wait for Ctrl+C; if the handler can't be installed, run until killed
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
