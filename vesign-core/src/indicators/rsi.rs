//! Relative Strength Index (RSI).
//!
//! Wilder smoothing of average gains and average losses:
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Seed: simple mean of the first `period` close-to-close changes.
//! Lookback: period.
//! Edge cases: avg_loss == 0 → 100; avg_gain == 0 → 0; both zero → 50.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        rsi_of_series(&closes, self.period)
    }
}

/// Wilder RSI over a close series. NaN anywhere taints every later value.
pub fn rsi_of_series(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change.is_nan() {
            return out;
        }
        avg_gain += change.max(0.0);
        avg_loss += (-change).max(0.0);
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let change = closes[i] - closes[i - 1];
        if change.is_nan() {
            break;
        }
        avg_gain += alpha * (change.max(0.0) - avg_gain);
        avg_loss += alpha * ((-change).max(0.0) - avg_loss);
        out[i] = rsi_value(avg_gain, avg_loss);
    }

    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    match (avg_gain == 0.0, avg_loss == 0.0) {
        (true, true) => 50.0,
        (false, true) => 100.0,
        (true, false) => 0.0,
        (false, false) => 100.0 - 100.0 / (1.0 + avg_gain / avg_loss),
    }
}
