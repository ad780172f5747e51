use crate::chart::ChartOptions;
use crate::market_data::MarketDataProvider;
use axum::extract::FromRef;
use std::sync::Arc;

// --- Type Aliases for Shared State ---

// Upstream market-data client shared by all requests
pub type SharedProvider = Arc<dyn MarketDataProvider>;

// Read-only state handed to every handler; nothing here is mutated per request
#[derive(Clone)]
pub struct AppState {
    pub provider: SharedProvider,
    pub chart: ChartOptions,
}

impl AppState {
    pub fn new(provider: SharedProvider, chart: ChartOptions) -> Self {
        Self { provider, chart }
    }
}

impl FromRef<AppState> for SharedProvider {
    fn from_ref(app_state: &AppState) -> SharedProvider {
        app_state.provider.clone()
    }
}

impl FromRef<AppState> for ChartOptions {
    fn from_ref(app_state: &AppState) -> ChartOptions {
        app_state.chart
    }
}
