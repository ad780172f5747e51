use crate::analysis::{AnalysisError, LinearFit, PriceStats, predict_next_close};
use crate::chart::{ChartError, ChartImage, ChartOptions, render_price_chart};
use crate::market_data::{MarketDataProvider, ProviderError};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("No data found for '{ticker}'.")]
    NoDataFound { ticker: String },
    #[error("⚠️ Error: {0}")]
    Unhandled(String),
}

impl DashboardError {
    fn no_data(ticker: &str) -> Self {
        DashboardError::NoDataFound {
            ticker: ticker.to_string(),
        }
    }
}

impl From<ProviderError> for DashboardError {
    fn from(error: ProviderError) -> Self {
        DashboardError::Unhandled(error.to_string())
    }
}

impl From<AnalysisError> for DashboardError {
    fn from(error: AnalysisError) -> Self {
        DashboardError::Unhandled(error.to_string())
    }
}

impl From<ChartError> for DashboardError {
    fn from(error: ChartError) -> Self {
        DashboardError::Unhandled(error.to_string())
    }
}

/// Everything the results page shows for one ticker.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub ticker: String,
    pub name: String,
    pub stats: PriceStats,
    pub predicted_price: f64,
    pub chart: ChartImage,
}

pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Fetch history, derive statistics, fit the trend, render the chart and
/// look up the company name.
#[instrument(skip(provider, options))]
pub async fn build_dashboard(
    provider: &dyn MarketDataProvider,
    raw_ticker: &str,
    options: ChartOptions,
) -> Result<Dashboard, DashboardError> {
    let ticker = normalize_ticker(raw_ticker);
    if ticker.is_empty() {
        return Err(DashboardError::no_data(&ticker));
    }

    let history = match provider.daily_history(&ticker).await {
        Ok(rows) => rows,
        Err(ProviderError::NoData) => return Err(DashboardError::no_data(&ticker)),
        Err(e) => return Err(e.into()),
    };
    // A single row has no previous close to compare against
    if history.len() < 2 {
        debug!(rows = history.len(), "History too short");
        return Err(DashboardError::no_data(&ticker));
    }

    let stats = PriceStats::from_history(&history)?;
    let closes: Vec<f64> = history.iter().map(|row| row.close).collect();
    let fit = LinearFit::fit(&closes)?;
    let predicted_price = predict_next_close(&fit, history.len());
    let trend_values = fit.fitted(history.len());

    debug!(
        rows = history.len(),
        slope = fit.slope,
        intercept = fit.intercept,
        predicted_price,
        "Fitted trend line"
    );

    let chart_ticker = ticker.clone();
    let chart = tokio::task::spawn_blocking(move || {
        render_price_chart(&chart_ticker, &history, &trend_values, options)
    })
    .await
    .map_err(|e| ChartError::Task(e.to_string()))??;

    let name = match provider.short_name(&ticker).await {
        Ok(Some(name)) => name,
        Ok(None) | Err(ProviderError::NoData) => ticker.clone(),
        Err(e) => return Err(e.into()),
    };

    info!(
        %ticker,
        price = stats.price,
        change = stats.change,
        trend = %stats.trend,
        predicted_price,
        "Built dashboard"
    );

    Ok(Dashboard {
        ticker,
        name,
        stats,
        predicted_price,
        chart,
    })
}
