//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (span + 1)
//! Seed: EMA[span-1] = SMA of the first `span` values.
//! Lookback: span - 1.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Ema {
    span: usize,
    name: String,
}

impl Ema {
    pub fn new(span: usize) -> Self {
        assert!(span >= 1, "EMA span must be >= 1");
        Self {
            span,
            name: format!("ema_{span}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.span.saturating_sub(1)
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        ema_of_series(&closes, self.span)
    }
}

/// EMA of an arbitrary series. NaN in the seed window yields all NaN;
/// NaN after the seed taints every later value.
pub fn ema_of_series(values: &[f64], span: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if span == 0 || n < span {
        return out;
    }

    let seed = values[..span].iter().sum::<f64>() / span as f64;
    if seed.is_nan() {
        return out;
    }
    out[span - 1] = seed;

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev = seed;
    for (slot, &x) in out.iter_mut().zip(values).skip(span) {
        if x.is_nan() {
            break;
        }
        prev += alpha * (x - prev);
        *slot = prev;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn span_1_tracks_input() {
        let out = ema_of_series(&[100.0, 200.0, 300.0], 1);
        assert_eq!(out, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn span_3_known_values() {
        // alpha = 0.5, seed at index 2 = mean(10, 11, 12) = 11
        // EMA[3] = 0.5*13 + 0.5*11 = 12, EMA[4] = 0.5*14 + 0.5*12 = 13
        let out = Ema::new(3).compute(&make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0]));
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_approx(out[2], 11.0, DEFAULT_EPSILON);
        assert_approx(out[3], 12.0, DEFAULT_EPSILON);
        assert_approx(out[4], 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn nan_in_seed_produces_all_nan() {
        let out = ema_of_series(&[10.0, f64::NAN, 12.0, 13.0, 14.0], 3);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn nan_after_seed_taints_tail() {
        let out = ema_of_series(&[10.0, 11.0, 12.0, f64::NAN, 14.0], 3);
        assert_approx(out[2], 11.0, DEFAULT_EPSILON);
        assert!(out[3].is_nan() && out[4].is_nan());
    }

    #[test]
    fn lookback() {
        assert_eq!(Ema::new(26).lookback(), 25);
        assert_eq!(Ema::new(1).lookback(), 0);
    }
}
