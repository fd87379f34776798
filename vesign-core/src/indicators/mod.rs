//! Indicator trait and the concrete indicators behind the feature engine.
//!
//! Indicators are pure functions: bar history in, numeric series out. Each
//! series has the same length as its input; warmup positions are `f64::NAN`.
//!
//! # Look-ahead contamination guard
//! No indicator value at bar t may depend on price data from bar t+1 or
//! later. Every indicator must pass the truncated-vs-full series test.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod roc;
pub mod rsi;

pub use bollinger::{Bollinger, BollingerBand};
pub use ema::{ema_of_series, Ema};
pub use macd::Macd;
pub use roc::Roc;
pub use rsi::Rsi;

use crate::domain::PriceBar;

/// A single-series indicator over one ticker's bars.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "rsi_14", "bollinger_upper_20_2").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    ///
    /// Returns a `Vec<f64>` of the same length as `bars`.
    /// The first `lookback()` values are `f64::NAN`.
    fn compute(&self, bars: &[PriceBar]) -> Vec<f64>;
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) + 1.0;
            let low = open.min(close) - 1.0;
            PriceBar {
                ticker: "TEST".to_string(),
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
