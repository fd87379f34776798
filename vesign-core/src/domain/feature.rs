//! FeatureRow: per-bar indicator values and their factor transforms.

use super::Dated;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Indicators and factors for one `(ticker, date)`.
///
/// Warmup rows are retained with `None` values rather than dropped.
/// `close` is carried so later stages can compute upside and trade prices
/// without re-joining bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub ticker: String,
    pub date: NaiveDate,
    pub close: f64,
    pub rsi: Option<f64>,
    pub bb_high: Option<f64>,
    pub bb_low: Option<f64>,
    pub macd: Option<f64>,
    pub rsi_factor: Option<f64>,
    pub bb_factor: Option<f64>,
    pub macd_factor: Option<f64>,
    pub trend_factor: Option<f64>,
}

impl FeatureRow {
    /// All four factors, or `None` if any is still in warmup.
    pub fn factors(&self) -> Option<[f64; 4]> {
        Some([
            self.rsi_factor?,
            self.bb_factor?,
            self.macd_factor?,
            self.trend_factor?,
        ])
    }

    /// `bb_low / bb_high`, the band-compression ratio.
    pub fn bb_ratio(&self) -> Option<f64> {
        let (low, high) = (self.bb_low?, self.bb_high?);
        if high == 0.0 {
            return None;
        }
        Some(low / high)
    }
}

impl Dated for FeatureRow {
    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> FeatureRow {
        FeatureRow {
            ticker: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            close: 100.0,
            rsi: Some(25.0),
            bb_high: Some(110.0),
            bb_low: Some(90.0),
            macd: Some(1.0),
            rsi_factor: Some(0.5),
            bb_factor: Some(-0.1),
            macd_factor: Some(0.01),
            trend_factor: Some(0.02),
        }
    }

    #[test]
    fn factors_require_all_four() {
        assert_eq!(row().factors(), Some([0.5, -0.1, 0.01, 0.02]));

        let mut warm = row();
        warm.trend_factor = None;
        assert_eq!(warm.factors(), None);
    }

    #[test]
    fn bb_ratio() {
        let r = row().bb_ratio().unwrap();
        assert!((r - 90.0 / 110.0).abs() < 1e-12);

        let mut missing = row();
        missing.bb_low = None;
        assert_eq!(missing.bb_ratio(), None);
    }
}
