pub mod analysis;
pub mod api;
pub mod chart;
pub mod config;
pub mod dashboard;
pub mod data_structures;
pub mod market_data;
pub mod page;
pub mod yahoo;

use crate::chart::ChartOptions;
use crate::data_structures::{AppState, SharedProvider};
use std::{net::SocketAddr, process, sync::Arc};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let app_config = match config::AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            process::exit(1);
        }
    };

    // Set a global span with node_name for all subsequent logs
    let _span = tracing::info_span!("node", name = %app_config.node_name).entered();

    tracing::info!("Starting stock-dashboard");
    tracing::info!(
        ?app_config.environment,
        port = app_config.port,
        provider = %app_config.provider.base_url,
        history_range = %app_config.provider.history_range,
        timeout = ?app_config.request_timeout(),
        "Loaded configuration"
    );

    let provider: SharedProvider = match yahoo::YahooClient::new(&app_config.provider) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize market data client");
            process::exit(1);
        }
    };

    let labels = chart::register_chart_font(app_config.chart_font_path.as_deref());
    let app_state = AppState::new(provider, ChartOptions { labels });
    let app = api::router(app_state, &app_config.rate_limit);

    let addr = SocketAddr::from(([0, 0, 0, 0], app_config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind listener");
            process::exit(1);
        }
    };
    tracing::info!(%addr, "Server listening");

    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        process::exit(1);
    }
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
