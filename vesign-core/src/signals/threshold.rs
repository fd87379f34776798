//! Threshold-regression policy.
//!
//! - BUY:  prediction_score > buy_threshold AND rsi < regime_rsi_max
//! - SELL: rsi > overbought OR prediction_score < -sell_threshold
//! - HOLD: otherwise
//!
//! A missing RSI or prediction makes each condition that reads it false.

use super::{RuleInput, SignalError, SignalRule};
use crate::domain::SignalKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdParams {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub regime_rsi_max: f64,
    pub overbought: f64,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            buy_threshold: 0.0,
            sell_threshold: 0.0,
            regime_rsi_max: 40.0,
            overbought: 70.0,
        }
    }
}

impl ThresholdParams {
    pub fn validate(&self) -> Result<(), SignalError> {
        let all_finite = [
            self.buy_threshold,
            self.sell_threshold,
            self.regime_rsi_max,
            self.overbought,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            return Err(SignalError::InvalidPolicy(
                "threshold parameters must be finite".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdRule {
    params: ThresholdParams,
}

impl ThresholdRule {
    pub fn new(params: ThresholdParams) -> Self {
        Self { params }
    }
}

impl SignalRule for ThresholdRule {
    fn name(&self) -> &str {
        "threshold_regression"
    }

    fn evaluate(&mut self, input: &RuleInput<'_>) -> (SignalKind, Option<f64>) {
        let p = &self.params;
        let rsi = input.row.rsi;
        let score = input.prediction_score;

        let in_regime = rsi.is_some_and(|r| r < p.regime_rsi_max);
        let strong = score.is_some_and(|s| s > p.buy_threshold);
        let overbought = rsi.is_some_and(|r| r > p.overbought);
        let weak = score.is_some_and(|s| s < -p.sell_threshold);

        let kind = if strong && in_regime {
            SignalKind::Buy
        } else if overbought || weak {
            SignalKind::Sell
        } else {
            SignalKind::Hold
        };
        (kind, score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::feature_row;

    fn eval(rsi: Option<f64>, score: Option<f64>) -> SignalKind {
        let row = feature_row(0, rsi);
        let mut rule = ThresholdRule::new(ThresholdParams {
            buy_threshold: 0.01,
            sell_threshold: 0.02,
            ..ThresholdParams::default()
        });
        rule.evaluate(&RuleInput {
            row: &row,
            prediction_score: score,
            analyst: None,
        })
        .0
    }

    #[test]
    fn buy_needs_score_and_regime() {
        assert_eq!(eval(Some(35.0), Some(0.05)), SignalKind::Buy);
        assert_eq!(eval(Some(45.0), Some(0.05)), SignalKind::Hold);
        assert_eq!(eval(Some(35.0), Some(0.005)), SignalKind::Hold);
    }

    #[test]
    fn sell_on_overbought_or_weak_score() {
        assert_eq!(eval(Some(75.0), Some(0.0)), SignalKind::Sell);
        assert_eq!(eval(Some(50.0), Some(-0.03)), SignalKind::Sell);
        assert_eq!(eval(Some(75.0), None), SignalKind::Sell);
    }

    #[test]
    fn missing_inputs_never_buy() {
        assert_eq!(eval(None, Some(0.5)), SignalKind::Hold);
        assert_eq!(eval(Some(20.0), None), SignalKind::Hold);
        assert_eq!(eval(None, None), SignalKind::Hold);
    }

    #[test]
    fn boundaries_are_strict() {
        assert_eq!(eval(Some(40.0), Some(0.05)), SignalKind::Hold);
        assert_eq!(eval(Some(70.0), Some(0.0)), SignalKind::Hold);
        assert_eq!(eval(Some(50.0), Some(-0.02)), SignalKind::Hold);
    }
}
