//! Ranking engine: orders one day's BUY candidates by score.
//!
//! Dense 1-based ranks: the best score gets rank 1, ties keep their input
//! order (stable sort), null scores go after every scored row.

use crate::domain::{RankedSignal, Signal};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Rank one day's signals. Non-BUY rows are dropped; no BUYs ⇒ empty.
pub fn rank_day(signals: &[Signal]) -> Vec<RankedSignal> {
    let mut buys: Vec<&Signal> = signals.iter().filter(|s| s.is_buy()).collect();
    buys.sort_by(|a, b| by_score_desc(a.score, b.score));
    buys.iter()
        .enumerate()
        .map(|(i, s)| RankedSignal::new(s, i + 1))
        .collect()
}

/// Rank a multi-day stream, one ranking per date. Output is ordered by date,
/// then rank.
pub fn rank_by_day(signals: &[Signal]) -> Vec<RankedSignal> {
    let mut days: BTreeMap<_, Vec<Signal>> = BTreeMap::new();
    for s in signals.iter().filter(|s| s.is_buy()) {
        days.entry(s.date).or_default().push(s.clone());
    }
    days.values().flat_map(|day| rank_day(day)).collect()
}

fn by_score_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
