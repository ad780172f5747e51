use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("provider responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode provider response: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid provider base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("no data returned for symbol")]
    NoData,
}

/// One daily bar as returned by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PricePoint {
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        }
    }
}

/// Source of daily price history and descriptive metadata for a ticker.
///
/// `daily_history` must return rows in chronological order and signal an
/// unknown symbol with [`ProviderError::NoData`] rather than a hard failure.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn daily_history(&self, ticker: &str) -> Result<Vec<PricePoint>, ProviderError>;

    /// Short display name, `None` when the provider has no name for the symbol.
    async fn short_name(&self, ticker: &str) -> Result<Option<String>, ProviderError>;
}
