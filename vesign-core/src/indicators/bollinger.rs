//! Bollinger Bands: rolling mean ± k · rolling stdev of close.
//!
//! - Middle: SMA(close, period)
//! - Upper: middle + k * stddev(close, period)
//! - Lower: middle - k * stddev(close, period)
//!
//! Population stddev (divide by N). Lookback: period - 1.
//! Each band is exposed as its own `Indicator`; `bollinger_bands` computes
//! all three in one pass for callers that need more than one.

use super::Indicator;
use crate::domain::PriceBar;

/// Which band to expose through the `Indicator` trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Upper,
    Middle,
    Lower,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
    name: String,
}

impl Bollinger {
    fn with_band(period: usize, multiplier: f64, band: BollingerBand) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        let label = match band {
            BollingerBand::Upper => "upper",
            BollingerBand::Middle => "middle",
            BollingerBand::Lower => "lower",
        };
        Self {
            period,
            multiplier,
            band,
            name: format!("bollinger_{label}_{period}_{multiplier}"),
        }
    }

    pub fn upper(period: usize, multiplier: f64) -> Self {
        Self::with_band(period, multiplier, BollingerBand::Upper)
    }

    pub fn middle(period: usize, multiplier: f64) -> Self {
        Self::with_band(period, multiplier, BollingerBand::Middle)
    }

    pub fn lower(period: usize, multiplier: f64) -> Self {
        Self::with_band(period, multiplier, BollingerBand::Lower)
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let bands = bollinger_bands(&closes, self.period, self.multiplier);
        match self.band {
            BollingerBand::Upper => bands.upper,
            BollingerBand::Middle => bands.middle,
            BollingerBand::Lower => bands.lower,
        }
    }
}

/// All three bands over a close series.
#[derive(Debug, Clone, Default)]
pub struct BandSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Compute upper/middle/lower bands. A NaN inside a window makes that
/// window's values NaN.
pub fn bollinger_bands(closes: &[f64], period: usize, multiplier: f64) -> BandSeries {
    let n = closes.len();
    let mut bands = BandSeries {
        upper: vec![f64::NAN; n],
        middle: vec![f64::NAN; n],
        lower: vec![f64::NAN; n],
    };
    if period == 0 {
        return bands;
    }

    for (i, window) in closes.windows(period).enumerate() {
        let t = i + period - 1;
        let mean = window.iter().sum::<f64>() / period as f64;
        if mean.is_nan() {
            continue;
        }
        let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / period as f64;
        let width = multiplier * variance.sqrt();

        bands.middle[t] = mean;
        bands.upper[t] = mean + width;
        bands.lower[t] = mean - width;
    }

    bands
}
