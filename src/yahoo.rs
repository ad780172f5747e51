use crate::config::ProviderConfig;
use crate::market_data::{MarketDataProvider, PricePoint, ProviderError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

// --- Chart API payload ---

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
    #[serde(default)]
    adjclose: Vec<AdjCloseColumn>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseColumn {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

pub struct YahooClient {
    client: Client,
    base_url: Url,
    history_range: String,
    user_agents: Vec<String>,
    random_agent: bool,
}

impl YahooClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let user_agents = vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.3 Safari/605.1.15".to_string(),
        ];

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ProviderError::InvalidBaseUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidBaseUrl(config.base_url.clone()));
        }

        Ok(YahooClient {
            client,
            base_url,
            history_range: config.history_range.clone(),
            user_agents,
            random_agent: config.random_agent,
        })
    }

    fn get_user_agent(&self) -> &str {
        if self.random_agent {
            self.user_agents
                .choose(&mut rand::rng())
                .unwrap_or(&self.user_agents[0])
        } else {
            &self.user_agents[0]
        }
    }

    // The ticker is pushed as one encoded path segment
    fn chart_url(&self, ticker: &str) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", ticker]);
        Ok(url)
    }

    async fn fetch_chart(&self, ticker: &str, range: &str) -> Result<ChartResult, ProviderError> {
        let url = self.chart_url(ticker)?;
        debug!(%url, range, "Requesting chart data");

        let response = self
            .client
            .get(url)
            .query(&[("range", range), ("interval", "1d"), ("events", "history")])
            .header("Accept", "application/json, text/plain, */*")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("User-Agent", self.get_user_agent())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<ChartEnvelope>(&body) {
            Ok(envelope) => extract_result(envelope),
            Err(e) if status.is_success() => Err(ProviderError::Serialization(e)),
            Err(_) => {
                warn!(status = status.as_u16(), "Provider returned an unreadable error body");
                Err(ProviderError::Status {
                    status: status.as_u16(),
                    message: body.chars().take(200).collect(),
                })
            }
        }
    }
}

#[async_trait]
impl MarketDataProvider for YahooClient {
    #[instrument(skip(self))]
    async fn daily_history(&self, ticker: &str) -> Result<Vec<PricePoint>, ProviderError> {
        let result = self.fetch_chart(ticker, &self.history_range).await?;
        let rows = parse_history(&result)?;
        debug!(rows = rows.len(), "Parsed daily history");
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn short_name(&self, ticker: &str) -> Result<Option<String>, ProviderError> {
        let result = self.fetch_chart(ticker, "1d").await?;
        Ok(result.meta.short_name.filter(|name| !name.trim().is_empty()))
    }
}

fn extract_result(envelope: ChartEnvelope) -> Result<ChartResult, ProviderError> {
    if let Some(error) = envelope.chart.error {
        if error.code == "Not Found" {
            return Err(ProviderError::NoData);
        }
        return Err(ProviderError::InvalidResponse(format!(
            "{}: {}",
            error.code,
            error.description.unwrap_or_default()
        )));
    }

    envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or(ProviderError::NoData)
}

// Rows without a close are skipped. When an adjusted close is present the
// whole bar is rescaled by adjclose / close so prices account for splits and
// dividends.
fn parse_history(result: &ChartResult) -> Result<Vec<PricePoint>, ProviderError> {
    let empty = QuoteColumns::default();
    let quote = result
        .indicators
        .as_ref()
        .and_then(|indicators| indicators.quote.first())
        .unwrap_or(&empty);
    let adjclose = result
        .indicators
        .as_ref()
        .and_then(|indicators| indicators.adjclose.first())
        .map(|column| column.adjclose.as_slice());

    let length = result.timestamp.len();
    if quote.close.len() != length {
        return Err(ProviderError::InvalidResponse(format!(
            "timestamp count {} does not match close count {}",
            length,
            quote.close.len()
        )));
    }

    let mut rows = Vec::with_capacity(length);
    for (i, &timestamp) in result.timestamp.iter().enumerate() {
        let Some(close) = value_at(&quote.close, i) else {
            continue;
        };

        let time = DateTime::<Utc>::from_timestamp(timestamp + result.meta.gmtoffset, 0).ok_or_else(|| {
            ProviderError::InvalidResponse(format!("Cannot convert timestamp {} at index {}", timestamp, i))
        })?;

        let ratio = match adjclose.and_then(|column| value_at(column, i)) {
            Some(adjusted) if close != 0.0 => adjusted / close,
            _ => 1.0,
        };

        rows.push(PricePoint {
            date: time.date_naive(),
            open: value_at(&quote.open, i).unwrap_or(close) * ratio,
            high: value_at(&quote.high, i).unwrap_or(close) * ratio,
            low: value_at(&quote.low, i).unwrap_or(close) * ratio,
            close: close * ratio,
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
        });
    }

    rows.sort_by_key(|row| row.date);
    Ok(rows)
}

fn value_at(column: &[Option<f64>], i: usize) -> Option<f64> {
    column.get(i).copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, extract::Path, http::StatusCode, response::IntoResponse, routing::get};
    use chrono::NaiveDate;

    const NOT_FOUND_BODY: &str = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;

    fn chart_body(short_name: Option<&str>) -> String {
        let meta = match short_name {
            Some(name) => serde_json::json!({ "symbol": "TEST", "gmtoffset": -14400, "shortName": name }),
            None => serde_json::json!({ "symbol": "TEST", "gmtoffset": -14400 }),
        };
        serde_json::json!({
            "chart": {
                "result": [{
                    "meta": meta,
                    // 2024-01-02..2024-01-05 at 14:30 UTC (09:30 New York)
                    "timestamp": [1704205800, 1704292200, 1704378600, 1704465000],
                    "indicators": {
                        "quote": [{
                            "open": [99.0, 101.0, null, 104.0],
                            "high": [101.0, 103.0, null, 106.0],
                            "low": [98.0, 100.0, null, 103.0],
                            "close": [100.0, 102.0, null, 105.0],
                            "volume": [1000, 2000, null, 3000]
                        }],
                        "adjclose": [{ "adjclose": [50.0, 51.0, null, 52.5] }]
                    }
                }],
                "error": null
            }
        })
        .to_string()
    }

    fn envelope(body: &str) -> ChartEnvelope {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_parse_history_skips_null_closes_and_adjusts() {
        let result = extract_result(envelope(&chart_body(None))).unwrap();
        let rows = parse_history(&result).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(rows[2].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert!((rows[0].close - 50.0).abs() < 1e-9);
        assert!((rows[0].open - 49.5).abs() < 1e-9);
        assert!((rows[2].close - 52.5).abs() < 1e-9);
        assert_eq!(rows[1].volume, 2000);
    }

    #[test]
    fn test_gmtoffset_moves_late_bars_to_local_date() {
        // 2024-01-03 02:00 UTC is still 2024-01-02 in New York
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":-18000},"timestamp":[1704247200],
            "indicators":{"quote":[{"close":[10.0]}]}}],"error":null}}"#;
        let rows = parse_history(&extract_result(envelope(body)).unwrap()).unwrap();
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(rows[0].open, 10.0);
    }

    #[test]
    fn test_not_found_maps_to_no_data() {
        let result = extract_result(envelope(NOT_FOUND_BODY));
        assert!(matches!(result, Err(ProviderError::NoData)));
    }

    #[test]
    fn test_other_chart_error_is_invalid_response() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input"}}}"#;
        match extract_result(envelope(body)) {
            Err(ProviderError::InvalidResponse(message)) => {
                assert_eq!(message, "Bad Request: Invalid input");
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.timestamp)),
        }
    }

    #[test]
    fn test_empty_result_has_no_rows() {
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":0}}],"error":null}}"#;
        let rows = parse_history(&extract_result(envelope(body)).unwrap()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_mismatched_columns_rejected() {
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":0},"timestamp":[1,2],
            "indicators":{"quote":[{"close":[1.0]}]}}],"error":null}}"#;
        let result = parse_history(&extract_result(envelope(body)).unwrap());
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }

    #[test]
    fn test_user_agent_fixed_when_not_random() {
        let config = ProviderConfig {
            random_agent: false,
            ..ProviderConfig::default()
        };
        let client = YahooClient::new(&config).unwrap();
        assert_eq!(client.get_user_agent(), client.user_agents[0]);
        assert_eq!(
            client.chart_url("AAPL").unwrap().as_str(),
            "https://query1.finance.yahoo.com/v8/finance/chart/AAPL"
        );
    }

    #[test]
    fn test_chart_url_encodes_ticker_as_one_segment() {
        let client = YahooClient::new(&ProviderConfig::default()).unwrap();
        let url = client.chart_url("AAPL?range=max").unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/AAPL%3Frange=max");
        assert_eq!(url.query(), None);

        let url = client.chart_url("A#B").unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/A%23B");
        assert_eq!(url.fragment(), None);

        assert_eq!(client.chart_url("../x").unwrap().path(), "/v8/finance/chart/..%2Fx");
        assert_eq!(client.chart_url("BRK.B").unwrap().path(), "/v8/finance/chart/BRK.B");
    }

    #[test]
    fn test_chart_url_keeps_base_path() {
        let client = YahooClient::new(&ProviderConfig {
            base_url: "http://localhost:8080/proxy/".to_string(),
            ..ProviderConfig::default()
        })
        .unwrap();
        assert_eq!(
            client.chart_url("MSFT").unwrap().as_str(),
            "http://localhost:8080/proxy/v8/finance/chart/MSFT"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = ProviderConfig {
            base_url: "not a url".to_string(),
            ..ProviderConfig::default()
        };
        assert!(matches!(YahooClient::new(&config), Err(ProviderError::InvalidBaseUrl(_))));
    }

    async fn spawn_provider() -> String {
        let app = Router::new().route(
            "/v8/finance/chart/{ticker}",
            get(|Path(ticker): Path<String>| async move {
                match ticker.as_str() {
                    "TEST" => (StatusCode::OK, chart_body(Some("Test Corp"))).into_response(),
                    "NONAME" => (StatusCode::OK, chart_body(None)).into_response(),
                    "BROKEN" => (StatusCode::BAD_GATEWAY, "upstream down").into_response(),
                    _ => (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response(),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn local_client(base_url: String) -> YahooClient {
        YahooClient::new(&ProviderConfig {
            base_url,
            request_timeout_secs: 5,
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_client_against_local_provider() {
        let client = local_client(spawn_provider().await);

        let rows = client.daily_history("TEST").await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(client.short_name("TEST").await.unwrap().as_deref(), Some("Test Corp"));
        assert_eq!(client.short_name("NONAME").await.unwrap(), None);
        assert!(matches!(client.daily_history("NOPE").await, Err(ProviderError::NoData)));
        // Query and fragment characters stay inside the ticker segment
        assert!(matches!(client.daily_history("TEST?range=max").await, Err(ProviderError::NoData)));
        assert!(matches!(client.daily_history("TEST#x").await, Err(ProviderError::NoData)));

        match client.daily_history("BROKEN").await {
            Err(ProviderError::Status { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
