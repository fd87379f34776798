//! Factor scoring engine: feature rows × fitted weights → predictions.
//!
//! `pred_5d` and `pred_20d` are linear combinations of the four factors with
//! the short and medium coefficient sets. `prediction_score` blends them with
//! fixed policy weights supplied through configuration (0.6 / 0.4 by
//! default), never per call.

use crate::domain::{FactorWeights, FeatureRow, Prediction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Blend weights for the combined prediction score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeights {
    pub blend_short: f64,
    pub blend_medium: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            blend_short: 0.6,
            blend_medium: 0.4,
        }
    }
}

impl BlendWeights {
    pub fn blend(&self, pred_5d: f64, pred_20d: f64) -> f64 {
        self.blend_short * pred_5d + self.blend_medium * pred_20d
    }
}

/// Why no predictions were produced this cycle.
///
/// Callers treat both variants as "no prediction", not as a failure of the
/// run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("no fitted factor weights available")]
    MissingWeights,

    #[error("factor weights contain non-finite coefficients")]
    InvalidWeights,
}

/// Score feature rows. Rows with any null factor produce no prediction.
pub fn score_features(
    rows: &[FeatureRow],
    weights: Option<&FactorWeights>,
    blend: &BlendWeights,
) -> Result<Vec<Prediction>, ScoringError> {
    let weights = weights.ok_or(ScoringError::MissingWeights)?;
    if !(weights.short.is_finite() && weights.medium.is_finite()) {
        return Err(ScoringError::InvalidWeights);
    }

    Ok(rows
        .iter()
        .filter_map(|row| {
            let factors = row.factors()?;
            let pred_5d = weights.short.apply(factors);
            let pred_20d = weights.medium.apply(factors);
            Some(Prediction {
                ticker: row.ticker.clone(),
                date: row.date,
                pred_5d,
                pred_20d,
                prediction_score: blend.blend(pred_5d, pred_20d),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FactorCoefficients;
    use chrono::NaiveDate;

    fn weights() -> FactorWeights {
        FactorWeights {
            short: FactorCoefficients {
                rsi: 0.02,
                bb: 0.5,
                macd: 1.0,
                trend: 0.1,
            },
            medium: FactorCoefficients {
                rsi: 0.05,
                bb: 0.3,
                macd: 2.0,
                trend: 0.4,
            },
        }
    }

    fn row(day: u32, trend: Option<f64>) -> FeatureRow {
        FeatureRow {
            ticker: "MSFT".into(),
            date: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            close: 400.0,
            rsi: Some(40.0),
            bb_high: Some(420.0),
            bb_low: Some(380.0),
            macd: Some(2.0),
            rsi_factor: Some(0.2),
            bb_factor: Some(-0.05),
            macd_factor: Some(0.005),
            trend_factor: trend,
        }
    }

    #[test]
    fn linear_combination_and_blend() {
        let preds = score_features(&[row(1, Some(0.03))], Some(&weights()), &BlendWeights::default())
            .unwrap();
        assert_eq!(preds.len(), 1);
        let p = &preds[0];

        let short = 0.2 * 0.02 + -0.05 * 0.5 + 0.005 * 1.0 + 0.03 * 0.1;
        let med = 0.2 * 0.05 + -0.05 * 0.3 + 0.005 * 2.0 + 0.03 * 0.4;
        assert!((p.pred_5d - short).abs() < 1e-12);
        assert!((p.pred_20d - med).abs() < 1e-12);
        assert!((p.prediction_score - (0.6 * short + 0.4 * med)).abs() < 1e-12);
    }

    #[test]
    fn rows_with_null_factors_are_skipped() {
        let rows = [row(1, None), row(2, Some(0.01))];
        let preds = score_features(&rows, Some(&weights()), &BlendWeights::default()).unwrap();
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].date, NaiveDate::from_ymd_opt(2024, 2, 2).unwrap());
    }

    #[test]
    fn missing_weights_is_reported_not_panicked() {
        let err = score_features(&[row(1, Some(0.0))], None, &BlendWeights::default()).unwrap_err();
        assert_eq!(err, ScoringError::MissingWeights);
    }

    #[test]
    fn non_finite_weights_are_rejected() {
        let mut w = weights();
        w.medium.macd = f64::NAN;
        let err = score_features(&[], Some(&w), &BlendWeights::default()).unwrap_err();
        assert_eq!(err, ScoringError::InvalidWeights);
    }
}
