use std::sync::Arc;

use fleet_dispatch::api;
use fleet_dispatch::config::{Config, LogFormat};
use fleet_dispatch::error::AppError;
use fleet_dispatch::hub::protocol::OutboundEvent;
use fleet_dispatch::hub::HubHandle;
use fleet_dispatch::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let http_port = config.http_port;
    let env = config.env.clone();
    let (app_state, connection_hub) = AppState::new(config);
    let hub = app_state.hub.clone();
    let shared_state = Arc::new(app_state);

    tokio::spawn(connection_hub.run());

    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, env = %env, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    tracing::info!("http server stopped");
    Ok(())
}

async fn shutdown_signal(hub: HubHandle) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }

    if let Err(err) = hub.broadcast(&OutboundEvent::ServerShutdown) {
        tracing::warn!(error = %err, "failed to notify drivers of shutdown");
    }
}
