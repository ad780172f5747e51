use crate::market_data::PricePoint;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use thiserror::Error;

/// Added to the history length to get the extrapolation index.
///
/// With N rows indexed 0..N-1 the prediction is taken at N + 1, one index
/// past the next trading day. Kept at 1 so predictions stay comparable with
/// earlier releases of the dashboard.
pub const NEXT_DAY_INDEX_OFFSET: usize = 1;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("need at least 2 closing prices, got {rows}")]
    InsufficientHistory { rows: usize },
    #[error("linear regression produced a non-finite fit")]
    NonFiniteFit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn from_change(change: f64) -> Self {
        if change > 0.0 {
            Trend::Up
        } else if change < 0.0 {
            Trend::Down
        } else {
            Trend::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Day-over-day statistics from the last two closes.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceStats {
    pub price: f64,
    pub previous: f64,
    pub change: f64,
    pub change_percent: f64,
    pub trend: Trend,
}

impl PriceStats {
    pub fn from_history(history: &[PricePoint]) -> Result<Self, AnalysisError> {
        let [.., previous, latest] = history else {
            return Err(AnalysisError::InsufficientHistory { rows: history.len() });
        };

        let change = round2(latest.close - previous.close);
        // Percent change is taken from the already rounded change
        let change_percent = round2(change / previous.close * 100.0);

        Ok(Self {
            price: round2(latest.close),
            previous: previous.close,
            change,
            change_percent,
            trend: Trend::from_change(change),
        })
    }
}

/// Ordinary least squares fit of `y = slope * x + intercept` with x = 0..n-1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn fit(values: &[f64]) -> Result<Self, AnalysisError> {
        let n = values.len();
        if n < 2 {
            return Err(AnalysisError::InsufficientHistory { rows: n });
        }
        let n_f = n as f64;

        let (sum_x, sum_y, sum_xy, sum_x2) = values
            .iter()
            .enumerate()
            .fold((0.0, 0.0, 0.0, 0.0), |(sx, sy, sxy, sx2), (i, &y)| {
                let x = i as f64;
                (sx + x, sy + y, sxy + x * y, sx2 + x * x)
            });

        // Distinct x values keep this positive for n >= 2
        let denom = n_f * sum_x2 - sum_x * sum_x;
        let slope = (n_f * sum_xy - sum_x * sum_y) / denom;
        let intercept = (sum_y - slope * sum_x) / n_f;

        if !slope.is_finite() || !intercept.is_finite() {
            return Err(AnalysisError::NonFiniteFit);
        }

        Ok(Self { slope, intercept })
    }

    pub fn predict(&self, index: usize) -> f64 {
        self.slope * index as f64 + self.intercept
    }

    /// In-sample values for indices 0..len.
    pub fn fitted(&self, len: usize) -> Vec<f64> {
        (0..len).map(|i| self.predict(i)).collect()
    }
}

pub fn next_day_index(history_len: usize) -> usize {
    history_len + NEXT_DAY_INDEX_OFFSET
}

pub fn predict_next_close(fit: &LinearFit, history_len: usize) -> f64 {
    round2(fit.predict(next_day_index(history_len)))
}

/// Rounds to cents from the exact decimal value of `value`, ties to even.
///
/// `10.125` is an exact tie and becomes `10.12`; `1.115` is stored just below
/// the tie and becomes `1.11`. Non-finite input is returned unchanged.
pub fn round2(value: f64) -> f64 {
    let Some(exact) = Decimal::from_f64_retain(value) else {
        return value;
    };
    let mut cents = exact.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    cents.rescale(2);
    // Adding 0.0 turns a negative zero into zero so it never prints as "-0.00"
    if cents.scale() == 2 {
        cents.mantissa() as f64 / 100.0 + 0.0
    } else {
        cents.to_f64().unwrap_or(value) + 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn history(closes: &[f64]) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint::from_close(start + Duration::days(i as i64), close))
            .collect()
    }

    #[test]
    fn test_stats_up_day() {
        let stats = PriceStats::from_history(&history(&[100.0, 102.0, 101.0, 105.0, 107.0])).unwrap();
        assert_eq!(stats.price, 107.0);
        assert_eq!(stats.previous, 105.0);
        assert_eq!(stats.change, 2.0);
        assert_eq!(stats.change_percent, 1.9);
        assert_eq!(stats.trend, Trend::Up);
    }

    #[test]
    fn test_stats_down_and_stable() {
        let down = PriceStats::from_history(&history(&[50.0, 48.5])).unwrap();
        assert_eq!(down.change, -1.5);
        assert_eq!(down.change_percent, -3.0);
        assert_eq!(down.trend, Trend::Down);

        let stable = PriceStats::from_history(&history(&[12.34, 12.34])).unwrap();
        assert_eq!(stable.change, 0.0);
        assert_eq!(stable.trend, Trend::Stable);
    }

    #[test]
    fn test_sub_cent_change_rounds_to_stable() {
        let stats = PriceStats::from_history(&history(&[10.001, 10.003])).unwrap();
        assert_eq!(stats.change, 0.0);
        assert_eq!(stats.trend, Trend::Stable);
    }

    #[test]
    fn test_round2_has_no_negative_zero() {
        assert!(round2(-0.002).is_sign_positive());
        assert_eq!(round2(-1.005), -1.0);
    }

    #[test]
    fn test_round2_breaks_ties_to_even_on_exact_value() {
        assert_eq!(round2(10.125), 10.12);
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(1.115), 1.11);
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(-10.125), -10.12);
        assert_eq!(round2(109.80000000000001), 109.8);
        assert_eq!(round2(107.0), 107.0);
        assert!(round2(f64::NAN).is_nan());
    }

    #[test]
    fn test_stats_round_half_cent_to_even() {
        let stats = PriceStats::from_history(&history(&[10.0, 10.125])).unwrap();
        assert_eq!(stats.price, 10.12);
        assert_eq!(stats.change, 0.12);
        assert_eq!(stats.change_percent, 1.2);
        assert_eq!(stats.trend, Trend::Up);
    }

    #[test]
    fn test_stats_rounding() {
        let stats = PriceStats::from_history(&history(&[187.4449, 189.2551])).unwrap();
        assert_eq!(stats.price, 189.26);
        assert_eq!(stats.change, 1.81);
        assert_eq!(stats.change_percent, 0.97);
    }

    #[test]
    fn test_stats_require_two_rows() {
        assert_eq!(
            PriceStats::from_history(&history(&[])),
            Err(AnalysisError::InsufficientHistory { rows: 0 })
        );
        assert_eq!(
            PriceStats::from_history(&history(&[42.0])),
            Err(AnalysisError::InsufficientHistory { rows: 1 })
        );
    }

    #[test]
    fn test_fit_example_series() {
        let fit = LinearFit::fit(&[100.0, 102.0, 101.0, 105.0, 107.0]).unwrap();
        assert!((fit.slope - 1.7).abs() < 1e-9);
        assert!((fit.intercept - 99.6).abs() < 1e-9);
        // Evaluated at index 6 (N + 1), not 5
        assert_eq!(next_day_index(5), 6);
        assert_eq!(predict_next_close(&fit, 5), 109.8);
    }

    #[test]
    fn test_perfect_line_extrapolates_past_next_index() {
        let (a, b) = (0.75, 20.0);
        let n = 1250;
        let closes: Vec<f64> = (0..n).map(|i| a * i as f64 + b).collect();
        let fit = LinearFit::fit(&closes).unwrap();

        let expected = round2(a * (n + 1) as f64 + b);
        assert_eq!(predict_next_close(&fit, n), expected);
        assert_ne!(predict_next_close(&fit, n), round2(a * n as f64 + b));
    }

    #[test]
    fn test_fitted_values_follow_line() {
        let fit = LinearFit { slope: 2.0, intercept: 1.0 };
        assert_eq!(fit.fitted(4), vec![1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_fit_rejects_non_finite_input() {
        assert_eq!(LinearFit::fit(&[1.0, f64::NAN, 3.0]), Err(AnalysisError::NonFiniteFit));
        assert_eq!(
            LinearFit::fit(&[5.0]),
            Err(AnalysisError::InsufficientHistory { rows: 1 })
        );
    }

    #[test]
    fn test_trend_labels() {
        assert_eq!(Trend::from_change(0.01).to_string(), "up");
        assert_eq!(Trend::from_change(-0.01).as_str(), "down");
        assert_eq!(Trend::from_change(0.0).as_str(), "stable");
    }
}
