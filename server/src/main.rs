use std::sync::Arc;

use anyhow::Context;
use courier_gateway::{create_router, GatewayState};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("starting Courier backend");

    let config = courier_config::load().context("failed to load configuration")?;

    let pool = courier_database::initialize_database(&config.database)
        .await
        .context("failed to initialize database")?;

    let state = GatewayState::new(pool, &config);
    let app = create_router(state.clone());

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(%address, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .context("server error")?;

    // Connection tasks tear themselves down on the shutdown signal; the
    // drain sweeps up anything that raced past it.
    let drained = state.realtime.registry.drain().await;
    info!(connections = drained.len(), "drained remaining sessions");

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(state: Arc<GatewayState>) {
    if let Err(error) = signal::ctrl_c().await {
        error!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
    // Release every connection task parked on its client's socket so
    // graceful shutdown can finish without waiting on the clients.
    state.realtime.begin_shutdown();
}
