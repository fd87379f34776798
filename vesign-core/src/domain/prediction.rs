//! Factor weights (externally fitted) and the predictions derived from them.

use super::Dated;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Coefficients for the four factors at one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorCoefficients {
    pub rsi: f64,
    pub bb: f64,
    pub macd: f64,
    pub trend: f64,
}

impl FactorCoefficients {
    /// Weighted sum over `[rsi, bb, macd, trend]` factors.
    pub fn apply(&self, factors: [f64; 4]) -> f64 {
        let [rsi, bb, macd, trend] = factors;
        rsi * self.rsi + bb * self.bb + macd * self.macd + trend * self.trend
    }

    pub fn is_finite(&self) -> bool {
        self.rsi.is_finite() && self.bb.is_finite() && self.macd.is_finite() && self.trend.is_finite()
    }
}

/// The single current set of fitted coefficients: short (5-bar) and
/// medium (20-bar) horizons. One per deployment, not per ticker.
///
/// Serializes flat, matching the column layout the fitting job writes:
/// `short_rsi_factor, ..., med_trend_factor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "FlatWeights", into = "FlatWeights")]
pub struct FactorWeights {
    pub short: FactorCoefficients,
    pub medium: FactorCoefficients,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct FlatWeights {
    short_rsi_factor: f64,
    short_bb_factor: f64,
    short_macd_factor: f64,
    short_trend_factor: f64,
    med_rsi_factor: f64,
    med_bb_factor: f64,
    med_macd_factor: f64,
    med_trend_factor: f64,
}

impl From<FlatWeights> for FactorWeights {
    fn from(w: FlatWeights) -> Self {
        Self {
            short: FactorCoefficients {
                rsi: w.short_rsi_factor,
                bb: w.short_bb_factor,
                macd: w.short_macd_factor,
                trend: w.short_trend_factor,
            },
            medium: FactorCoefficients {
                rsi: w.med_rsi_factor,
                bb: w.med_bb_factor,
                macd: w.med_macd_factor,
                trend: w.med_trend_factor,
            },
        }
    }
}

impl From<FactorWeights> for FlatWeights {
    fn from(w: FactorWeights) -> Self {
        Self {
            short_rsi_factor: w.short.rsi,
            short_bb_factor: w.short.bb,
            short_macd_factor: w.short.macd,
            short_trend_factor: w.short.trend,
            med_rsi_factor: w.medium.rsi,
            med_bb_factor: w.medium.bb,
            med_macd_factor: w.medium.macd,
            med_trend_factor: w.medium.trend,
        }
    }
}

/// Horizon predictions and their blended score for one `(ticker, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub ticker: String,
    pub date: NaiveDate,
    pub pred_5d: f64,
    pub pred_20d: f64,
    pub prediction_score: f64,
}

impl Dated for Prediction {
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

    #[test]
    fn flat_weights_json_layout() {
        let json = r#"{
            "short_rsi_factor": 0.1, "short_bb_factor": 0.2,
            "short_macd_factor": 0.3, "short_trend_factor": 0.4,
            "med_rsi_factor": 1.0, "med_bb_factor": 2.0,
            "med_macd_factor": 3.0, "med_trend_factor": 4.0
        }"#;
        let w: FactorWeights = serde_json::from_str(json).unwrap();
        assert_eq!(w.short.macd, 0.3);
        assert_eq!(w.medium.trend, 4.0);

        let out = serde_json::to_value(w).unwrap();
        assert_eq!(out["med_bb_factor"], 2.0);
    }

    #[test]
    fn apply_is_linear_combination() {
        let c = FactorCoefficients {
            rsi: 1.0,
            bb: 2.0,
            macd: 3.0,
            trend: 4.0,
        };
        assert!((c.apply([1.0, 1.0, 1.0, 1.0]) - 10.0).abs() < 1e-12);
        assert!((c.apply([0.5, 0.0, -1.0, 0.25]) - (0.5 - 3.0 + 1.0)).abs() < 1e-12);
    }
}
