use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use trip_lease::api;
use trip_lease::clock::system_clock;
use trip_lease::config::Config;
use trip_lease::error::EngineError;
use trip_lease::notify::{run_notification_worker, LogNotificationPort};
use trip_lease::state::AppState;
use trip_lease::store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store = Arc::new(MemoryStore::new());
    let (app_state, notification_rx) = AppState::new(store, system_clock(), &config);
    let shared_state = Arc::new(app_state);

    tokio::spawn(run_notification_worker(
        Arc::new(LogNotificationPort),
        notification_rx,
        shared_state.events_tx.clone(),
        shared_state.metrics.clone(),
    ));

    tokio::spawn(run_expiry_sweep(shared_state.clone(), config.clone()));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| EngineError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        match_expiry_hours = config.match_expiry_hours,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| EngineError::Internal(format!("server error: {err}")))?;

    Ok(())
}

/// Periodic cleanup only; `respond` enforces expiry on its own.
async fn run_expiry_sweep(state: Arc<AppState>, config: Config) {
    let mut ticker = tokio::time::interval(config.sweep_interval());
    tracing::info!(
        interval_secs = config.sweep_interval().as_secs(),
        "expiry sweep started"
    );

    loop {
        ticker.tick().await;
        if let Err(err) = state.negotiation.sweep_expired(state.clock.utc()).await {
            tracing::error!(error = %err, "expiry sweep failed");
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
