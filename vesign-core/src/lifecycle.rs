//! Trade lifecycle tracker: pairs each BUY with the next SELL per ticker.
//!
//! State machine per ticker:
//!
//! | state | signal | next  | emits |
//! |-------|--------|-------|-------|
//! | FLAT  | BUY    | OPEN  | -     |
//! | OPEN  | SELL   | FLAT  | Trade |
//! | FLAT  | SELL   | FLAT  | -     |
//! | OPEN  | BUY    | OPEN  | -     |
//! | any   | HOLD   | same  | -     |
//!
//! Buy and sell prices are the close of the signalling bar. A BUY whose close
//! is not a positive finite price opens nothing. A position still open at the
//! end of the observed range is reported as an `OpenPosition`, never
//! force-closed.

use crate::domain::{OpenPosition, Signal, SignalKind, Trade};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("signal for {ticker} on {date} does not follow {previous}")]
    OutOfOrder {
        ticker: String,
        previous: NaiveDate,
        date: NaiveDate,
    },
}

/// Position state of one ticker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionState {
    Flat,
    Open { buy_date: NaiveDate, buy_price: f64 },
}

#[derive(Debug, Clone)]
struct TickerState {
    position: PositionState,
    last_date: Option<NaiveDate>,
}

impl Default for TickerState {
    fn default() -> Self {
        Self {
            position: PositionState::Flat,
            last_date: None,
        }
    }
}

/// Explicit per-ticker state map.
#[derive(Debug, Clone, Default)]
pub struct TradeTracker {
    states: HashMap<String, TickerState>,
}

impl TradeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for `ticker` (FLAT if never seen).
    pub fn state(&self, ticker: &str) -> PositionState {
        self.states
            .get(ticker)
            .map(|s| s.position)
            .unwrap_or(PositionState::Flat)
    }

    /// Feed one signal. Returns the trade it closes, if any.
    ///
    /// Signals for a ticker must arrive with strictly increasing dates.
    pub fn observe(&mut self, signal: &Signal) -> Result<Option<Trade>, TrackerError> {
        let state = self.states.entry(signal.ticker.clone()).or_default();

        if let Some(previous) = state.last_date {
            if signal.date <= previous {
                return Err(TrackerError::OutOfOrder {
                    ticker: signal.ticker.clone(),
                    previous,
                    date: signal.date,
                });
            }
        }
        state.last_date = Some(signal.date);

        let trade = match (state.position, signal.signal) {
            (PositionState::Flat, SignalKind::Buy) if valid_price(signal.close) => {
                state.position = PositionState::Open {
                    buy_date: signal.date,
                    buy_price: signal.close,
                };
                None
            }
            (
                PositionState::Open {
                    buy_date,
                    buy_price,
                },
                SignalKind::Sell,
            ) => {
                state.position = PositionState::Flat;
                let open = OpenPosition {
                    ticker: signal.ticker.clone(),
                    buy_date,
                    buy_price,
                };
                Some(open.close(signal.date, signal.close))
            }
            _ => None,
        };
        Ok(trade)
    }

    /// Positions still open, sorted by ticker.
    pub fn open_positions(&self) -> Vec<OpenPosition> {
        let mut open: Vec<OpenPosition> = self
            .states
            .iter()
            .filter_map(|(ticker, s)| match s.position {
                PositionState::Open {
                    buy_date,
                    buy_price,
                } => Some(OpenPosition {
                    ticker: ticker.clone(),
                    buy_date,
                    buy_price,
                }),
                PositionState::Flat => None,
            })
            .collect();
        open.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        open
    }
}

fn valid_price(close: f64) -> bool {
    close.is_finite() && close > 0.0
}

/// Completed trades plus positions left open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeLog {
    pub trades: Vec<Trade>,
    pub open: Vec<OpenPosition>,
}

/// Pair a multi-ticker signal stream into trades.
///
/// Signals are grouped by ticker, keeping their relative order, and each
/// group is run through the state machine. A group that is not strictly
/// ascending by date fails with `TrackerError::OutOfOrder`. Trades come out
/// ordered by ticker, then buy date.
pub fn pair_trades(signals: &[Signal]) -> Result<TradeLog, TrackerError> {
    let mut by_ticker: Vec<(&str, Vec<&Signal>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for s in signals {
        let slot = *index.entry(s.ticker.as_str()).or_insert_with(|| {
            by_ticker.push((s.ticker.as_str(), Vec::new()));
            by_ticker.len() - 1
        });
        by_ticker[slot].1.push(s);
    }
    by_ticker.sort_by(|a, b| a.0.cmp(b.0));

    let mut tracker = TradeTracker::new();
    let mut trades = Vec::new();
    for (_, group) in by_ticker {
        for s in group {
            if let Some(trade) = tracker.observe(s)? {
                trades.push(trade);
            }
        }
    }

    Ok(TradeLog {
        trades,
        open: tracker.open_positions(),
    })
}
