//! Rate of change as a fraction: close[t] / close[t-n] - 1.
//!
//! Used for the multi-week trend factor. No fill for missing history: the
//! first `n` values are NaN, never zero.
//! Lookback: n.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    name: String,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ROC period must be >= 1");
        Self {
            period,
            name: format!("roc_{period}"),
        }
    }
}

impl Indicator for Roc {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let mut out = vec![f64::NAN; bars.len()];
        for (i, pair) in bars.windows(self.period + 1).enumerate() {
            let (prev, curr) = (pair[0].close, pair[self.period].close);
            if prev != 0.0 {
                // NaN on either side propagates through the division.
                out[i + self.period] = curr / prev - 1.0;
            }
        }
        out
    }
}
