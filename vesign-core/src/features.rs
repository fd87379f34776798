//! Technical feature engine: one ticker's bars in, one `FeatureRow` per bar out.
//!
//! Indicators are computed once over the full history (no per-row
//! recomputation), then zipped into rows. Warmup rows are kept with `None`
//! values. Factors are signed "how favorable" transforms:
//!
//! - `rsi_factor   = (50 - rsi) / 50`          lower RSI ⇒ higher factor
//! - `bb_factor    = (bb_low - close) / close`  close near the lower band ⇒ higher
//! - `macd_factor  = macd / close`
//! - `trend_factor = close[t] / close[t-n] - 1`

use crate::domain::{check_series, BarError, FeatureRow, PriceBar};
use crate::indicators::bollinger::bollinger_bands;
use crate::indicators::{Indicator, Macd, Roc, Rsi};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Window parameters for the feature engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub rsi_period: usize,
    pub bb_period: usize,
    pub bb_std_multiplier: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub trend_lookback: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            bb_period: 20,
            bb_std_multiplier: 2.0,
            macd_fast: 12,
            macd_slow: 26,
            trend_lookback: 20,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), FeatureError> {
        let invalid = |msg: &str| Err(FeatureError::InvalidConfig(msg.to_string()));
        if self.rsi_period == 0 || self.bb_period == 0 || self.trend_lookback == 0 {
            return invalid("indicator periods must be >= 1");
        }
        if self.macd_fast == 0 || self.macd_fast >= self.macd_slow {
            return invalid("macd_fast must be >= 1 and shorter than macd_slow");
        }
        if !(self.bb_std_multiplier.is_finite() && self.bb_std_multiplier > 0.0) {
            return invalid("bb_std_multiplier must be positive");
        }
        Ok(())
    }

    /// Bars needed before every factor is defined.
    pub fn warmup(&self) -> usize {
        [
            self.rsi_period,
            self.bb_period.saturating_sub(1),
            self.macd_slow.saturating_sub(1),
            self.trend_lookback,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Integrity(#[from] BarError),

    #[error("invalid feature config: {0}")]
    InvalidConfig(String),
}

/// Compute feature rows for one ticker.
///
/// `bars` must be one ticker, strictly ascending by date. Duplicates or
/// out-of-order dates fail with `FeatureError::Integrity`; nothing is
/// reordered.
pub fn compute_features(
    bars: &[PriceBar],
    config: &FeatureConfig,
) -> Result<Vec<FeatureRow>, FeatureError> {
    config.validate()?;
    check_series(bars)?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let rsi = Rsi::new(config.rsi_period).compute(bars);
    let bands = bollinger_bands(&closes, config.bb_period, config.bb_std_multiplier);
    let macd = Macd::new(config.macd_fast, config.macd_slow).compute(bars);
    let trend = Roc::new(config.trend_lookback).compute(bars);

    let rows = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let close = bar.close;
            let rsi = finite(rsi[i]);
            let bb_high = finite(bands.upper[i]);
            let bb_low = finite(bands.lower[i]);
            let macd = finite(macd[i]);
            FeatureRow {
                ticker: bar.ticker.clone(),
                date: bar.date,
                close,
                rsi,
                bb_high,
                bb_low,
                macd,
                rsi_factor: rsi.map(|r| (50.0 - r) / 50.0),
                bb_factor: bb_low.and_then(|low| per_close(low - close, close)),
                macd_factor: macd.and_then(|m| per_close(m, close)),
                trend_factor: finite(trend[i]),
            }
        })
        .collect();

    Ok(rows)
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn per_close(v: f64, close: f64) -> Option<f64> {
    if close == 0.0 {
        return None;
    }
    finite(v / close)
}
