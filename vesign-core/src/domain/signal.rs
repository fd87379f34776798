//! Signal classification rows and their ranked / allocated forms.
//!
//! The ranked and allocated rows are kept flat (no nested structs) so they
//! serialize to one CSV record each.

use super::Dated;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorical trading decision for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalKind::Buy => "BUY",
            SignalKind::Hold => "HOLD",
            SignalKind::Sell => "SELL",
        };
        f.write_str(s)
    }
}

/// Rule engine output: one row per `(ticker, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub ticker: String,
    pub date: NaiveDate,
    pub close: f64,
    pub signal: SignalKind,
    /// Ranking score. Meaning depends on the active rule policy.
    pub score: Option<f64>,
}

impl Signal {
    pub fn is_buy(&self) -> bool {
        self.signal == SignalKind::Buy
    }
}

impl Dated for Signal {
    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// A BUY signal with its dense, 1-based rank within its trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSignal {
    pub ticker: String,
    pub date: NaiveDate,
    pub close: f64,
    pub signal: SignalKind,
    pub score: Option<f64>,
    pub rank: usize,
}

impl RankedSignal {
    pub fn new(signal: &Signal, rank: usize) -> Self {
        Self {
            ticker: signal.ticker.clone(),
            date: signal.date,
            close: signal.close,
            signal: signal.signal,
            score: signal.score,
            rank,
        }
    }
}

impl Dated for RankedSignal {
    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// A ranked BUY candidate with its sector and share of the day's capital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub ticker: String,
    pub date: NaiveDate,
    pub close: f64,
    pub signal: SignalKind,
    pub score: Option<f64>,
    pub rank: usize,
    pub sector: String,
    pub allocation_pct: f64,
}

impl Allocation {
    pub fn new(ranked: &RankedSignal, sector: &str, allocation_pct: f64) -> Self {
        Self {
            ticker: ranked.ticker.clone(),
            date: ranked.date,
            close: ranked.close,
            signal: ranked.signal,
            score: ranked.score,
            rank: ranked.rank,
            sector: sector.to_string(),
            allocation_pct,
        }
    }
}

impl Dated for Allocation {
    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&SignalKind::Buy).unwrap(), "\"BUY\"");
        let k: SignalKind = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(k, SignalKind::Sell);
        assert_eq!(SignalKind::Hold.to_string(), "HOLD");
    }

    #[test]
    fn ranked_and_allocation_carry_signal_fields() {
        let s = Signal {
            ticker: "XOM".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            close: 110.0,
            signal: SignalKind::Buy,
            score: Some(22.5),
        };
        let r = RankedSignal::new(&s, 2);
        let a = Allocation::new(&r, "Energy", 0.5);
        assert_eq!(a.ticker, "XOM");
        assert_eq!(a.rank, 2);
        assert_eq!(a.score, Some(22.5));
        assert_eq!(a.sector, "Energy");
    }
}
