//! Per-ticker metadata supplied by external collaborators.

use serde::{Deserialize, Serialize};

/// Consensus analyst price targets for a ticker. Refreshed daily or slower;
/// any field may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystExpectation {
    pub ticker: String,
    pub target_mean_price: Option<f64>,
    #[serde(default)]
    pub target_high_price: Option<f64>,
    #[serde(default)]
    pub target_low_price: Option<f64>,
    #[serde(default)]
    pub number_of_analysts: Option<u32>,
}

impl AnalystExpectation {
    /// `(target_mean_price - close) / close`, if a target is known.
    pub fn upside(&self, close: f64) -> Option<f64> {
        let target = self.target_mean_price?;
        if close <= 0.0 || !close.is_finite() || !target.is_finite() {
            return None;
        }
        Some((target - close) / close)
    }
}

/// Universe row: ticker, company name, GICS sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub ticker: String,
    pub company: String,
    pub sector: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upside_from_mean_target() {
        let a = AnalystExpectation {
            ticker: "AAPL".into(),
            target_mean_price: Some(110.0),
            target_high_price: None,
            target_low_price: None,
            number_of_analysts: Some(12),
        };
        assert!((a.upside(100.0).unwrap() - 0.10).abs() < 1e-12);
        assert_eq!(a.upside(0.0), None);
    }

    #[test]
    fn missing_target_has_no_upside() {
        let a = AnalystExpectation {
            ticker: "AAPL".into(),
            target_mean_price: None,
            target_high_price: Some(150.0),
            target_low_price: None,
            number_of_analysts: None,
        };
        assert_eq!(a.upside(100.0), None);
    }
}
