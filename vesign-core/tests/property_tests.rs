//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. No overlapping trades: per ticker, each trade closes before the next opens
//! 2. Rank contiguity: ranks are 1..K with non-increasing scores
//! 3. Allocation balance: weights sum to 1, each sector gets 1/S
//! 4. Window replace idempotence: rerunning a window changes nothing

use chrono::NaiveDate;
use proptest::prelude::*;
use vesign_core::domain::{RankedSignal, Signal, SignalKind};
use vesign_core::{allocate_day, pair_trades, rank_day, DatedTable, SectorMap};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_kind() -> impl Strategy<Value = SignalKind> {
    prop_oneof![
        Just(SignalKind::Buy),
        Just(SignalKind::Hold),
        Just(SignalKind::Sell),
    ]
}

fn arb_score() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        4 => (0.0..100.0_f64).prop_map(Some),
        1 => Just(None),
    ]
}

fn date(offset: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(offset as i64)
}

const TICKERS: [&str; 6] = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF"];
const SECTORS: [&str; 3] = ["Tech", "Energy", "Health"];

fn sector_map() -> SectorMap {
    TICKERS
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), SECTORS[i % SECTORS.len()].to_string()))
        .collect()
}

/// A multi-ticker stream: one signal per (ticker, day).
fn arb_stream() -> impl Strategy<Value = Vec<Signal>> {
    prop::collection::vec(
        prop::collection::vec((arb_kind(), 10.0..200.0_f64), 1..40),
        1..TICKERS.len(),
    )
    .prop_map(|per_ticker| {
        let mut out = Vec::new();
        for (t, days) in per_ticker.into_iter().enumerate() {
            for (d, (kind, close)) in days.into_iter().enumerate() {
                out.push(Signal {
                    ticker: TICKERS[t].to_string(),
                    date: date(d),
                    close,
                    signal: kind,
                    score: None,
                });
            }
        }
        out
    })
}

/// One day's candidates across the fixed tickers.
fn arb_day() -> impl Strategy<Value = Vec<Signal>> {
    prop::collection::vec((arb_kind(), arb_score()), TICKERS.len()).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (kind, score))| Signal {
                ticker: TICKERS[i].to_string(),
                date: date(0),
                close: 50.0,
                signal: kind,
                score,
            })
            .collect()
    })
}

// ── 1. No overlapping trades ─────────────────────────────────────────

proptest! {
    #[test]
    fn trades_never_overlap(stream in arb_stream()) {
        let log = pair_trades(&stream).unwrap();

        for ticker in TICKERS {
            let trades: Vec<_> = log.trades.iter().filter(|t| t.ticker == ticker).collect();
            for t in &trades {
                prop_assert!(t.buy_date < t.sell_date);
            }
            for pair in trades.windows(2) {
                prop_assert!(pair[0].sell_date < pair[1].buy_date);
            }
            let open: Vec<_> = log.open.iter().filter(|o| o.ticker == ticker).collect();
            prop_assert!(open.len() <= 1);
            if let (Some(o), Some(last)) = (open.first(), trades.last()) {
                prop_assert!(last.sell_date < o.buy_date);
            }
        }
    }

    #[test]
    fn trade_count_bounded_by_buys_and_sells(stream in arb_stream()) {
        let log = pair_trades(&stream).unwrap();
        let buys = stream.iter().filter(|s| s.signal == SignalKind::Buy).count();
        let sells = stream.iter().filter(|s| s.signal == SignalKind::Sell).count();
        prop_assert!(log.trades.len() <= buys.min(sells));
    }
}

// ── 2. Rank contiguity ───────────────────────────────────────────────

proptest! {
    #[test]
    fn ranks_are_contiguous_and_scores_non_increasing(day in arb_day()) {
        let ranked = rank_day(&day);
        let buys = day.iter().filter(|s| s.is_buy()).count();
        prop_assert_eq!(ranked.len(), buys);

        for (i, r) in ranked.iter().enumerate() {
            prop_assert_eq!(r.rank, i + 1);
        }
        for pair in ranked.windows(2) {
            match (pair[0].score, pair[1].score) {
                (Some(a), Some(b)) => prop_assert!(a >= b),
                (None, Some(_)) => prop_assert!(false, "null score ranked above a scored row"),
                _ => {}
            }
        }
    }
}

// ── 3. Allocation balance ────────────────────────────────────────────

proptest! {
    #[test]
    fn allocation_sums_to_one_with_equal_sectors(day in arb_day()) {
        let ranked: Vec<RankedSignal> = rank_day(&day);
        let alloc = allocate_day(&ranked, &sector_map());

        if ranked.is_empty() {
            prop_assert!(alloc.allocations.is_empty());
        } else {
            prop_assert!((alloc.total_pct() - 1.0).abs() < 1e-9);
            let totals = alloc.sector_totals();
            let expected = 1.0 / totals.len() as f64;
            for (_, total) in totals {
                prop_assert!((total - expected).abs() < 1e-9);
            }
            for a in &alloc.allocations {
                prop_assert!(a.allocation_pct >= 0.0);
            }
        }
    }
}

// ── 4. Window replace idempotence ────────────────────────────────────

proptest! {
    #[test]
    fn replacing_same_window_twice_is_idempotent(
        history in arb_stream(),
        batch in arb_stream(),
    ) {
        let mut table = DatedTable::from_rows(history);
        table.replace_window(batch.clone());
        let once = table.clone();
        table.replace_window(batch);
        prop_assert_eq!(table, once);
    }
}
