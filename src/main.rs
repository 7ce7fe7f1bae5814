use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use edge_gateway::config::LogFormat;
use edge_gateway::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // LOG_FORMAT is read before the config so that config errors are logged
    // in the requested format.
    init_tracing();

    info!("Starting Edge Gateway v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

fn init_tracing() {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    match format {
        LogFormat::Json => builder.json().with_current_span(true).init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Run the gateway, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        routes = config.routes.len(),
        upstream_timeout = ?config.upstream_timeout,
        local_override = config.cors_local_override,
        log_format = %config.log_format,
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;

    let state = AppState::new(config).map_err(|e| {
        error!("Failed to build gateway state: {e}");
        exitcode::CONFIG
    })?;
    for route in state.routes.iter() {
        info!(
            "  {:<22} → {} (auth: {})",
            route.id, route.upstream, route.auth_required
        );
    }
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;
    info!("Gateway listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?;

    info!("Gateway shutdown complete");
    Ok(())
}
