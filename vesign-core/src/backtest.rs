//! Backtest / performance evaluator.
//!
//! Three views of the same signal history:
//!
//! - **Forward returns**: `close[t+h] / close[t] - 1` per ticker for the
//!   configured horizons (5 and 20 bars by default). Null at the tail.
//! - **Masked strategy returns**: signals joined to bars on (ticker, date);
//!   `next_return` is the next joined row's close over this close, minus 1.
//!   `strategy_return` is `next_return` on BUY rows and 0 otherwise. The
//!   summary mean skips nulls (a BUY on the last joined row).
//! - **Success rate by trade**: aggregation over paired BUY→SELL trades,
//!   overall and per ticker.

use crate::domain::{check_series, BarError, Dated, PriceBar, Signal, SignalKind, Trade};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Forward-return horizons in bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Horizons {
    pub short: usize,
    pub medium: usize,
}

impl Default for Horizons {
    fn default() -> Self {
        Self {
            short: 5,
            medium: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardReturn {
    pub ticker: String,
    pub date: NaiveDate,
    pub close: f64,
    pub forward_return_5d: Option<f64>,
    pub forward_return_20d: Option<f64>,
}

/// One joined (signal, bar) row of the masked strategy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub ticker: String,
    pub date: NaiveDate,
    pub close: f64,
    pub signal: SignalKind,
    pub forward_return_5d: Option<f64>,
    pub forward_return_20d: Option<f64>,
    pub next_return: Option<f64>,
    pub strategy_return: Option<f64>,
}

impl Dated for ForwardReturn {
    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Dated for BacktestResult {
    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    /// Mean of non-null strategy returns; `None` with no observations.
    pub mean_strategy_return: Option<f64>,
    pub buy_bars: usize,
    pub observations: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Backtest {
    pub rows: Vec<BacktestResult>,
    pub summary: StrategySummary,
}

// ── Forward returns ──

/// Per-ticker forward returns. Output is ordered by ticker, then date.
pub fn forward_returns(
    bars: &[PriceBar],
    horizons: &Horizons,
) -> Result<Vec<ForwardReturn>, BarError> {
    let mut out = Vec::with_capacity(bars.len());
    for series in group_by_ticker(bars)?.values() {
        let closes: Vec<f64> = series.iter().map(|b| b.close).collect();
        let short = shifted_return(&closes, horizons.short);
        let medium = shifted_return(&closes, horizons.medium);
        for (i, bar) in series.iter().enumerate() {
            out.push(ForwardReturn {
                ticker: bar.ticker.clone(),
                date: bar.date,
                close: bar.close,
                forward_return_5d: short[i],
                forward_return_20d: medium[i],
            });
        }
    }
    Ok(out)
}

// ── Masked strategy returns ──

/// Join signals to bars and compute masked next-bar returns.
///
/// Signals without a matching bar are dropped (inner join).
pub fn strategy_returns(
    bars: &[PriceBar],
    signals: &[Signal],
    horizons: &Horizons,
) -> Result<Backtest, BarError> {
    let forward: HashMap<(String, NaiveDate), ForwardReturn> = forward_returns(bars, horizons)?
        .into_iter()
        .map(|f| ((f.ticker.clone(), f.date), f))
        .collect();

    let mut joined: BTreeMap<&str, Vec<(&Signal, &ForwardReturn)>> = BTreeMap::new();
    for series in group_by_ticker(signals)?.values() {
        for &s in series {
            if let Some(f) = forward.get(&(s.ticker.clone(), s.date)) {
                joined.entry(s.ticker.as_str()).or_default().push((s, f));
            }
        }
    }

    let mut rows = Vec::new();
    for series in joined.values() {
        for (i, (s, f)) in series.iter().enumerate() {
            let next_return = series
                .get(i + 1)
                .and_then(|(_, next)| ratio(next.close, f.close));
            let strategy_return = match s.signal {
                SignalKind::Buy => next_return,
                _ => Some(0.0),
            };
            rows.push(BacktestResult {
                ticker: s.ticker.clone(),
                date: s.date,
                close: f.close,
                signal: s.signal,
                forward_return_5d: f.forward_return_5d,
                forward_return_20d: f.forward_return_20d,
                next_return,
                strategy_return,
            });
        }
    }

    let summary = StrategySummary::from_rows(&rows);
    Ok(Backtest { rows, summary })
}

impl StrategySummary {
    /// Summarize joined rows, possibly merged from several tickers.
    pub fn from_rows(rows: &[BacktestResult]) -> Self {
        let values: Vec<f64> = rows.iter().filter_map(|r| r.strategy_return).collect();
        let mean = if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        };
        Self {
            mean_strategy_return: mean,
            buy_bars: rows.iter().filter(|r| r.signal == SignalKind::Buy).count(),
            observations: values.len(),
        }
    }
}

// ── Success rate by trade ──

/// Aggregate statistics over a set of completed trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub num_trades: usize,
    /// Fraction of trades with a strictly positive return.
    pub success_rate: f64,
    pub avg_return: f64,
    /// Sum of winning returns over sum of losing returns, capped at 100.
    pub profit_factor: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

impl TradeStats {
    /// Trades are expected in chronological order for the streak counts.
    pub fn from_trades(trades: &[&Trade]) -> Self {
        if trades.is_empty() {
            return Self::default();
        }
        let n = trades.len() as f64;
        let winners = trades.iter().filter(|t| t.is_winner()).count();
        Self {
            num_trades: trades.len(),
            success_rate: winners as f64 / n,
            avg_return: trades.iter().map(|t| t.return_pct).sum::<f64>() / n,
            profit_factor: profit_factor(trades),
            max_consecutive_wins: max_consecutive(trades, true),
            max_consecutive_losses: max_consecutive(trades, false),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessReport {
    pub overall: TradeStats,
    pub by_ticker: BTreeMap<String, TradeStats>,
}

/// Success rate overall and per ticker.
pub fn success_rate(trades: &[Trade]) -> SuccessReport {
    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by(|a, b| (a.sell_date, &a.ticker).cmp(&(b.sell_date, &b.ticker)));

    let mut grouped: BTreeMap<String, Vec<&Trade>> = BTreeMap::new();
    for &t in &ordered {
        grouped.entry(t.ticker.clone()).or_default().push(t);
    }

    SuccessReport {
        overall: TradeStats::from_trades(&ordered),
        by_ticker: grouped
            .into_iter()
            .map(|(ticker, ts)| (ticker, TradeStats::from_trades(&ts)))
            .collect(),
    }
}

/// First date of a `days`-long trailing window ending at `as_of`.
/// Saturates at `NaiveDate::MIN`.
pub fn trailing_cutoff(as_of: NaiveDate, days: u32) -> NaiveDate {
    as_of
        .checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Keep signals dated on or after `as_of - days`.
pub fn trailing_window(signals: &[Signal], as_of: NaiveDate, days: u32) -> Vec<Signal> {
    let cutoff = trailing_cutoff(as_of, days);
    signals
        .iter()
        .filter(|s| s.date >= cutoff)
        .cloned()
        .collect()
}

fn profit_factor(trades: &[&Trade]) -> f64 {
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.return_pct > 0.0)
        .map(|t| t.return_pct)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.return_pct < 0.0)
        .map(|t| t.return_pct.abs())
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

fn max_consecutive(trades: &[&Trade], winners: bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

// ── Helpers ──

/// Group rows by ticker in input order. Each ticker's rows must already
/// be strictly ascending by date.
fn group_by_ticker<T: Dated>(rows: &[T]) -> Result<BTreeMap<&str, Vec<&T>>, BarError> {
    let mut grouped: BTreeMap<&str, Vec<&T>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.ticker()).or_default().push(row);
    }
    for series in grouped.values() {
        check_series(series.as_slice())?;
    }
    Ok(grouped)
}

fn shifted_return(closes: &[f64], h: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| closes.get(i + h).and_then(|later| ratio(*later, closes[i])))
        .collect()
}

fn ratio(later: f64, now: f64) -> Option<f64> {
    if now == 0.0 {
        return None;
    }
    let r = later / now - 1.0;
    r.is_finite().then_some(r)
}
