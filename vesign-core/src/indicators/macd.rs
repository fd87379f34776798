//! MACD line: difference of a fast and a slow EMA of close.
//!
//! MACD[t] = EMA(close, fast)[t] - EMA(close, slow)[t]
//! Lookback: slow - 1 (the slow EMA seeds last).

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize) -> Self {
        assert!(fast >= 1, "MACD fast span must be >= 1");
        assert!(fast < slow, "MACD fast span must be shorter than slow span");
        Self {
            fast,
            slow,
            name: format!("macd_{fast}_{slow}"),
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.slow - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
    }
}
