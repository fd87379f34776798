//! Completed BUY→SELL round trips and still-open positions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A completed round trip paired from a BUY signal and the next SELL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub ticker: String,
    pub buy_date: NaiveDate,
    pub buy_price: f64,
    pub sell_date: NaiveDate,
    pub sell_price: f64,
    /// `(sell_price - buy_price) / buy_price`
    pub return_pct: f64,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.return_pct > 0.0
    }
}

/// A position opened by a BUY whose SELL has not been observed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub ticker: String,
    pub buy_date: NaiveDate,
    pub buy_price: f64,
}

impl OpenPosition {
    /// Close the position at `sell_price` on `sell_date`.
    ///
    /// `buy_price` must be positive; `TradeTracker` never opens a position
    /// at any other price.
    pub fn close(self, sell_date: NaiveDate, sell_price: f64) -> Trade {
        let return_pct = (sell_price - self.buy_price) / self.buy_price;
        Trade {
            ticker: self.ticker,
            buy_date: self.buy_date,
            buy_price: self.buy_price,
            sell_date,
            sell_price,
            return_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_computes_return() {
        let open = OpenPosition {
            ticker: "X".into(),
            buy_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            buy_price: 100.0,
        };
        let trade = open.close(NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(), 130.0);
        assert!((trade.return_pct - 0.30).abs() < 1e-12);
        assert!(trade.is_winner());
    }
}
