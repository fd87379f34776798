//! Hybrid policy: oversold streak, band compression, analyst upside.
//!
//! - BUY:  the last `streak` bars all had rsi < oversold
//!         AND bb_low / bb_high > bb_compression_ratio
//!         AND (target_mean_price - close) / close >= analyst_upside_margin
//! - SELL: rsi >= overbought, whatever the other conditions say
//! - HOLD: otherwise, including any missing input
//!
//! Score = 50 - rsi (null when RSI is null).
//!
//! The streak is a ring buffer of the last `streak` oversold flags with a
//! running count. Until `streak` bars have been observed the streak is not
//! full. A null RSI is recorded as "not oversold".

use super::{RuleInput, SignalError, SignalRule};
use crate::domain::SignalKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridParams {
    pub oversold: f64,
    pub overbought: f64,
    pub streak: usize,
    pub bb_compression_ratio: f64,
    pub analyst_upside_margin: f64,
}

impl Default for HybridParams {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
            streak: 3,
            bb_compression_ratio: 0.8,
            analyst_upside_margin: 0.05,
        }
    }
}

impl HybridParams {
    pub fn validate(&self) -> Result<(), SignalError> {
        let invalid = |msg: &str| Err(SignalError::InvalidPolicy(msg.to_string()));
        if self.streak == 0 {
            return invalid("streak must be >= 1");
        }
        if !(self.oversold.is_finite() && self.overbought.is_finite()) {
            return invalid("RSI levels must be finite");
        }
        if self.oversold >= self.overbought {
            return invalid("oversold must be below overbought");
        }
        if !(self.bb_compression_ratio.is_finite() && self.analyst_upside_margin.is_finite()) {
            return invalid("compression ratio and upside margin must be finite");
        }
        Ok(())
    }
}

/// Fixed-capacity ring of boolean flags with a running count of `true`s.
#[derive(Debug, Clone)]
struct FlagRing {
    flags: Vec<bool>,
    next: usize,
    seen: usize,
    set: usize,
}

impl FlagRing {
    fn new(capacity: usize) -> Self {
        Self {
            flags: vec![false; capacity],
            next: 0,
            seen: 0,
            set: 0,
        }
    }

    fn push(&mut self, flag: bool) {
        let evicted = std::mem::replace(&mut self.flags[self.next], flag);
        if self.seen == self.flags.len() && evicted {
            self.set -= 1;
        }
        if flag {
            self.set += 1;
        }
        self.next = (self.next + 1) % self.flags.len();
        self.seen = (self.seen + 1).min(self.flags.len());
    }

    /// Full window and every flag set.
    fn all_set(&self) -> bool {
        self.seen == self.flags.len() && self.set == self.flags.len()
    }
}

#[derive(Debug, Clone)]
pub struct HybridRule {
    params: HybridParams,
    oversold: FlagRing,
}

impl HybridRule {
    pub fn new(params: HybridParams) -> Self {
        let oversold = FlagRing::new(params.streak.max(1));
        Self { params, oversold }
    }
}

impl SignalRule for HybridRule {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn evaluate(&mut self, input: &RuleInput<'_>) -> (SignalKind, Option<f64>) {
        let p = &self.params;
        let row = input.row;

        self.oversold
            .push(row.rsi.is_some_and(|r| r < p.oversold));

        let compressed = row
            .bb_ratio()
            .is_some_and(|ratio| ratio > p.bb_compression_ratio);
        let upside = input
            .analyst
            .and_then(|a| a.upside(row.close))
            .is_some_and(|u| u >= p.analyst_upside_margin);

        let kind = if self.oversold.all_set() && compressed && upside {
            SignalKind::Buy
        } else if row.rsi.is_some_and(|r| r >= p.overbought) {
            SignalKind::Sell
        } else {
            SignalKind::Hold
        };
        (kind, row.rsi.map(|r| 50.0 - r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AnalystExpectation;
    use crate::signals::feature_row;

    fn analyst(target: Option<f64>) -> AnalystExpectation {
        AnalystExpectation {
            ticker: "TEST".into(),
            target_mean_price: target,
            target_high_price: None,
            target_low_price: None,
            number_of_analysts: None,
        }
    }

    fn run(rsis: &[Option<f64>], analyst: Option<&AnalystExpectation>) -> Vec<SignalKind> {
        let mut rule = HybridRule::new(HybridParams::default());
        rsis.iter()
            .enumerate()
            .map(|(i, rsi)| {
                let row = feature_row(i as u32, *rsi);
                rule.evaluate(&RuleInput {
                    row: &row,
                    prediction_score: None,
                    analyst,
                })
                .0
            })
            .collect()
    }

    #[test]
    fn ring_tracks_last_n_flags() {
        let mut ring = FlagRing::new(3);
        ring.push(true);
        ring.push(true);
        assert!(!ring.all_set());
        ring.push(true);
        assert!(ring.all_set());
        ring.push(false);
        assert!(!ring.all_set());
        ring.push(true);
        ring.push(true);
        assert!(!ring.all_set());
        ring.push(true);
        assert!(ring.all_set());
    }

    #[test]
    fn streak_of_three_with_compression_and_upside_buys() {
        // bands 95/105 => ratio 0.905; target 110 on close 100 => 10% upside
        let a = analyst(Some(110.0));
        let out = run(
            &[Some(32.0), Some(29.0), Some(28.0), Some(27.0), Some(71.0)],
            Some(&a),
        );
        use SignalKind::*;
        assert_eq!(out, vec![Hold, Hold, Hold, Buy, Sell]);
    }

    #[test]
    fn missing_analyst_target_holds() {
        let a = analyst(None);
        let out = run(&[Some(20.0), Some(20.0), Some(20.0)], Some(&a));
        assert_eq!(out[2], SignalKind::Hold);
        let out = run(&[Some(20.0), Some(20.0), Some(20.0)], None);
        assert_eq!(out[2], SignalKind::Hold);
    }

    #[test]
    fn fewer_bars_than_streak_never_buys() {
        let a = analyst(Some(200.0));
        assert_eq!(run(&[Some(10.0), Some(10.0)], Some(&a)), vec![SignalKind::Hold; 2]);
    }

    #[test]
    fn null_rsi_breaks_streak() {
        let a = analyst(Some(200.0));
        let out = run(&[Some(10.0), None, Some(10.0), Some(10.0)], Some(&a));
        assert_eq!(out[3], SignalKind::Hold);
    }

    #[test]
    fn wide_bands_block_buy() {
        let a = analyst(Some(200.0));
        let mut rule = HybridRule::new(HybridParams::default());
        let mut last = SignalKind::Hold;
        for i in 0..3 {
            let mut row = feature_row(i, Some(20.0));
            row.bb_low = Some(70.0);
            row.bb_high = Some(130.0);
            last = rule
                .evaluate(&RuleInput {
                    row: &row,
                    prediction_score: None,
                    analyst: Some(&a),
                })
                .0;
        }
        assert_eq!(last, SignalKind::Hold);
    }

    #[test]
    fn overbought_sells_and_score_is_distance_from_fifty() {
        let mut rule = HybridRule::new(HybridParams::default());
        let row = feature_row(0, Some(70.0));
        let (kind, score) = rule.evaluate(&RuleInput {
            row: &row,
            prediction_score: None,
            analyst: None,
        });
        assert_eq!(kind, SignalKind::Sell);
        assert_eq!(score, Some(-20.0));

        let row = feature_row(1, None);
        let (kind, score) = rule.evaluate(&RuleInput {
            row: &row,
            prediction_score: None,
            analyst: None,
        });
        assert_eq!(kind, SignalKind::Hold);
        assert_eq!(score, None);
    }
}
