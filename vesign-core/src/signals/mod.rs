//! Signal rule engine: classifies each feature row as BUY, HOLD or SELL.
//!
//! Two policies are selectable through `RulePolicy`:
//! - `ThresholdRegression`: prediction score against buy/sell thresholds,
//!   gated by an RSI regime filter. Score = prediction score.
//! - `Hybrid`: consecutive oversold RSI streak + Bollinger compression +
//!   analyst upside. Score = 50 - RSI.
//!
//! Rules see one ticker at a time, bar by bar, in date order. Any state they
//! keep (the hybrid oversold streak) lives in a fixed-size ring buffer and is
//! never shared across tickers. Missing upstream values never fire BUY.

pub mod hybrid;
pub mod threshold;

pub use hybrid::{HybridParams, HybridRule};
pub use threshold::{ThresholdParams, ThresholdRule};

use crate::domain::{
    check_series, AnalystExpectation, BarError, FeatureRow, Prediction, Signal, SignalKind,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Everything a rule may look at for one bar.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub row: &'a FeatureRow,
    pub prediction_score: Option<f64>,
    pub analyst: Option<&'a AnalystExpectation>,
}

/// A per-ticker classifier. One instance per ticker; `evaluate` is called
/// once per bar in ascending date order.
pub trait SignalRule: Send {
    /// Policy name for reports and logging.
    fn name(&self) -> &str;

    /// Decide this bar's signal and ranking score.
    fn evaluate(&mut self, input: &RuleInput<'_>) -> (SignalKind, Option<f64>);
}

/// Active signal policy (configuration form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RulePolicy {
    ThresholdRegression(ThresholdParams),
    Hybrid(HybridParams),
}

impl Default for RulePolicy {
    fn default() -> Self {
        RulePolicy::Hybrid(HybridParams::default())
    }
}

impl RulePolicy {
    pub fn name(&self) -> &'static str {
        match self {
            RulePolicy::ThresholdRegression(_) => "threshold_regression",
            RulePolicy::Hybrid(_) => "hybrid",
        }
    }

    /// Whether this policy reads predictions at all.
    pub fn uses_predictions(&self) -> bool {
        matches!(self, RulePolicy::ThresholdRegression(_))
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        match self {
            RulePolicy::ThresholdRegression(p) => p.validate(),
            RulePolicy::Hybrid(p) => p.validate(),
        }
    }

    /// Build a fresh rule instance with empty state.
    pub fn build(&self) -> Result<Box<dyn SignalRule>, SignalError> {
        self.validate()?;
        Ok(match self {
            RulePolicy::ThresholdRegression(p) => Box::new(ThresholdRule::new(p.clone())),
            RulePolicy::Hybrid(p) => Box::new(HybridRule::new(p.clone())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error(transparent)]
    Integrity(#[from] BarError),

    #[error("invalid rule policy: {0}")]
    InvalidPolicy(String),
}

/// Classify one ticker's feature rows.
///
/// `predictions` are joined by date (rows of other tickers are ignored);
/// `analyst` is the ticker's current expectation, if any. Emits exactly one
/// `Signal` per input row.
pub fn generate_signals(
    rows: &[FeatureRow],
    predictions: &[Prediction],
    analyst: Option<&AnalystExpectation>,
    policy: &RulePolicy,
) -> Result<Vec<Signal>, SignalError> {
    check_series(rows)?;
    let mut rule = policy.build()?;

    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let scores: HashMap<NaiveDate, f64> = predictions
        .iter()
        .filter(|p| p.ticker == first.ticker)
        .map(|p| (p.date, p.prediction_score))
        .collect();

    let signals = rows
        .iter()
        .map(|row| {
            let input = RuleInput {
                row,
                prediction_score: scores.get(&row.date).copied(),
                analyst,
            };
            let (signal, score) = rule.evaluate(&input);
            Signal {
                ticker: row.ticker.clone(),
                date: row.date,
                close: row.close,
                signal,
                score,
            }
        })
        .collect();

    Ok(signals)
}

#[cfg(test)]
pub(crate) fn feature_row(day: u32, rsi: Option<f64>) -> FeatureRow {
    FeatureRow {
        ticker: "TEST".into(),
        date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap() + chrono::Duration::days(day as i64),
        close: 100.0,
        rsi,
        bb_high: Some(105.0),
        bb_low: Some(95.0),
        macd: Some(0.5),
        rsi_factor: rsi.map(|r| (50.0 - r) / 50.0),
        bb_factor: Some(-0.05),
        macd_factor: Some(0.005),
        trend_factor: Some(0.01),
    }
}
