//! PriceBar, the daily market data unit, and series integrity checks.

use super::Dated;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Daily OHLCV bar for a single ticker.
///
/// Immutable once stored. Unique per `(ticker, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceBar {
    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

impl Dated for PriceBar {
    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Data integrity violations in a per-ticker series.
///
/// Fatal for that ticker's pipeline run. Input is never silently reordered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarError {
    #[error("duplicate bar for {ticker} on {date}")]
    DuplicateBar { ticker: String, date: NaiveDate },

    #[error("out-of-order bar for {ticker}: {date} follows {previous}")]
    OutOfOrder {
        ticker: String,
        previous: NaiveDate,
        date: NaiveDate,
    },

    #[error("series for {expected} contains a row for {found}")]
    MixedTickers { expected: String, found: String },
}

/// Verify that `rows` belong to one ticker and have strictly ascending dates.
pub fn check_series<T: Dated>(rows: &[T]) -> Result<(), BarError> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let ticker = first.ticker();

    for pair in rows.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        if curr.ticker() != ticker {
            return Err(BarError::MixedTickers {
                expected: ticker.to_string(),
                found: curr.ticker().to_string(),
            });
        }
        if curr.date() == prev.date() {
            return Err(BarError::DuplicateBar {
                ticker: ticker.to_string(),
                date: curr.date(),
            });
        }
        if curr.date() < prev.date() {
            return Err(BarError::OutOfOrder {
                ticker: ticker.to_string(),
                previous: prev.date(),
                date: curr.date(),
            });
        }
    }

    Ok(())
}
