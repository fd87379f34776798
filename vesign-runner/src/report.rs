//! Run reports: a JSON summary and a Markdown rendering of it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use vesign_core::{CapitalAmount, DayAllocation, StrategySummary, TradeStats};

use crate::pipeline::TickerFailure;

/// Row counts for one run's emitted window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowCounts {
    pub features: usize,
    pub predictions: usize,
    pub signals: usize,
    pub buy: usize,
    pub hold: usize,
    pub sell: usize,
    pub ranked: usize,
    pub allocations: usize,
    pub backtest: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub config_fingerprint: String,
    pub dataset_hash: String,
    /// Active rule policy. Signal scores mean different things per policy.
    pub policy: String,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub tickers: usize,
    pub failures: Vec<TickerFailure>,
    /// Why predictions were skipped, when they were.
    pub scoring_skipped: Option<String>,
    pub counts: RowCounts,
    pub unmapped_tickers: Vec<String>,
    pub even_split_days: usize,
    pub strategy: StrategySummary,
    pub trades: usize,
    pub open_positions: usize,
    pub success_as_of: Option<NaiveDate>,
    pub success_window_start: Option<NaiveDate>,
    pub success: TradeStats,
    pub success_by_ticker: BTreeMap<String, TradeStats>,
    pub latest_allocation: Option<DayAllocation>,
    pub capital: Option<Vec<CapitalAmount>>,
}

/// One row of `trade_stats_by_ticker.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerStatsRow {
    pub ticker: String,
    pub num_trades: usize,
    pub success_rate: f64,
    pub avg_return: f64,
    pub profit_factor: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

impl TickerStatsRow {
    pub fn new(ticker: &str, stats: &TradeStats) -> Self {
        Self {
            ticker: ticker.to_string(),
            num_trades: stats.num_trades,
            success_rate: stats.success_rate,
            avg_return: stats.avg_return,
            profit_factor: stats.profit_factor,
            max_consecutive_wins: stats.max_consecutive_wins,
            max_consecutive_losses: stats.max_consecutive_losses,
        }
    }
}

pub fn to_json(report: &PipelineReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

fn pct(v: f64) -> String {
    format!("{:.2}%", v * 100.0)
}

fn opt_date(d: Option<NaiveDate>) -> String {
    d.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
}

/// Render a human-readable Markdown report.
pub fn render_markdown(report: &PipelineReport) -> String {
    let mut md = String::new();

    md.push_str("# Vesign Run Report\n\n");

    // ── Run ──
    md.push_str("## Run\n\n");
    md.push_str("| Field | Value |\n|-------|-------|\n");
    let _ = writeln!(md, "| Config | `{}` |", &report.config_fingerprint[..16.min(report.config_fingerprint.len())]);
    let _ = writeln!(md, "| Dataset | `{}` |", &report.dataset_hash[..16.min(report.dataset_hash.len())]);
    let _ = writeln!(md, "| Policy | {} |", report.policy);
    let _ = writeln!(
        md,
        "| Window | {} .. {} |",
        opt_date(report.window_start),
        opt_date(report.window_end)
    );
    let _ = writeln!(md, "| Tickers | {} |", report.tickers);
    let _ = writeln!(md, "| Failed tickers | {} |", report.failures.len());
    md.push('\n');

    if let Some(reason) = &report.scoring_skipped {
        let _ = writeln!(md, "> Predictions skipped: {reason}\n");
    }

    // ── Signals ──
    let c = &report.counts;
    md.push_str("## Signals\n\n");
    md.push_str("| Rows | BUY | HOLD | SELL | Ranked | Allocated |\n");
    md.push_str("|------|-----|------|------|--------|-----------|\n");
    let _ = writeln!(
        md,
        "| {} | {} | {} | {} | {} | {} |\n",
        c.signals, c.buy, c.hold, c.sell, c.ranked, c.allocations
    );

    // ── Latest allocation ──
    if let Some(day) = &report.latest_allocation {
        if !day.allocations.is_empty() {
            let _ = writeln!(md, "## Allocation for {}\n", opt_date(day.date));
            md.push_str("| Rank | Ticker | Sector | Score | Weight |\n");
            md.push_str("|------|--------|--------|-------|--------|\n");
            for a in &day.allocations {
                let score = a
                    .score
                    .map(|s| format!("{s:.4}"))
                    .unwrap_or_else(|| "-".into());
                let _ = writeln!(
                    md,
                    "| {} | {} | {} | {} | {} |",
                    a.rank,
                    a.ticker,
                    a.sector,
                    score,
                    pct(a.allocation_pct)
                );
            }
            md.push('\n');
        }
    }

    if let Some(amounts) = &report.capital {
        if !amounts.is_empty() {
            md.push_str("## Capital\n\n| Ticker | Sector | Amount |\n|--------|--------|--------|\n");
            for a in amounts {
                let _ = writeln!(md, "| {} | {} | {:.2} |", a.ticker, a.sector, a.amount);
            }
            md.push('\n');
        }
    }

    // ── Performance ──
    md.push_str("## Performance\n\n");
    md.push_str("| Metric | Value |\n|--------|-------|\n");
    let mean = report
        .strategy
        .mean_strategy_return
        .map(pct)
        .unwrap_or_else(|| "-".into());
    let _ = writeln!(md, "| Mean strategy return | {mean} |");
    let _ = writeln!(md, "| BUY bars | {} |", report.strategy.buy_bars);
    let _ = writeln!(md, "| Completed trades | {} |", report.trades);
    let _ = writeln!(md, "| Open positions | {} |", report.open_positions);
    let s = &report.success;
    let _ = writeln!(md, "| Success rate | {} |", pct(s.success_rate));
    let _ = writeln!(md, "| Avg trade return | {} |", pct(s.avg_return));
    let _ = writeln!(md, "| Profit factor | {:.2} |", s.profit_factor);
    let _ = writeln!(
        md,
        "| Max win / loss streak | {} / {} |",
        s.max_consecutive_wins, s.max_consecutive_losses
    );
    if let Some(start) = report.success_window_start {
        let _ = writeln!(
            md,
            "| Success window | {start} .. {} |",
            opt_date(report.success_as_of)
        );
    }
    md.push('\n');

    if !report.success_by_ticker.is_empty() {
        md.push_str("### By ticker\n\n");
        md.push_str("| Ticker | Trades | Success | Avg return |\n");
        md.push_str("|--------|--------|---------|------------|\n");
        for (ticker, stats) in &report.success_by_ticker {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} |",
                ticker,
                stats.num_trades,
                pct(stats.success_rate),
                pct(stats.avg_return)
            );
        }
        md.push('\n');
    }

    // ── Problems ──
    if !report.failures.is_empty() || !report.unmapped_tickers.is_empty() {
        md.push_str("## Problems\n\n");
        for f in &report.failures {
            let _ = writeln!(md, "- `{}` failed at {}: {}", f.ticker, f.stage, f.error);
        }
        if !report.unmapped_tickers.is_empty() {
            let _ = writeln!(
                md,
                "- BUY candidates without a sector: {}",
                report.unmapped_tickers.join(", ")
            );
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;
    use vesign_core::domain::{Allocation, SignalKind};

    fn sample_report() -> PipelineReport {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let mut by_ticker = BTreeMap::new();
        by_ticker.insert(
            "AAA".to_string(),
            TradeStats {
                num_trades: 2,
                success_rate: 0.5,
                avg_return: 0.01,
                profit_factor: 1.5,
                max_consecutive_wins: 1,
                max_consecutive_losses: 1,
            },
        );
        let allocation = Allocation {
            ticker: "AAA".into(),
            date,
            close: 100.0,
            signal: SignalKind::Buy,
            score: Some(21.0),
            rank: 1,
            sector: "Tech".into(),
            allocation_pct: 1.0,
        };
        PipelineReport {
            config_fingerprint: "ab".repeat(32),
            dataset_hash: "cd".repeat(32),
            policy: "hybrid".into(),
            window_start: Some(date),
            window_end: Some(date),
            tickers: 2,
            failures: vec![TickerFailure {
                ticker: "BBB".into(),
                stage: Stage::Features,
                error: "duplicate bar for BBB on 2024-06-03".into(),
            }],
            scoring_skipped: Some("no fitted factor weights available".into()),
            counts: RowCounts {
                signals: 1,
                buy: 1,
                ranked: 1,
                allocations: 1,
                ..RowCounts::default()
            },
            unmapped_tickers: vec!["CCC".into()],
            even_split_days: 0,
            strategy: StrategySummary::default(),
            trades: 2,
            open_positions: 1,
            success_as_of: Some(date),
            success_window_start: None,
            success: by_ticker["AAA"].clone(),
            success_by_ticker: by_ticker,
            latest_allocation: Some(DayAllocation {
                date: Some(date),
                allocations: vec![allocation],
                unmapped: vec!["CCC".into()],
                even_split_sectors: vec![],
            }),
            capital: Some(vec![CapitalAmount {
                ticker: "AAA".into(),
                date,
                sector: "Tech".into(),
                amount: 100_000.0,
            }]),
        }
    }

    #[test]
    fn markdown_has_sections() {
        let md = render_markdown(&sample_report());
        assert!(md.starts_with("# Vesign Run Report"));
        assert!(md.contains("| Policy | hybrid |"));
        assert!(md.contains("## Allocation for 2024-06-03"));
        assert!(md.contains("| 1 | AAA | Tech | 21.0000 | 100.00% |"));
        assert!(md.contains("| AAA | Tech | 100000.00 |"));
        assert!(md.contains("| Success rate | 50.00% |"));
        assert!(md.contains("`BBB` failed at features"));
        assert!(md.contains("without a sector: CCC"));
        assert!(md.contains("Predictions skipped"));
    }

    #[test]
    fn json_roundtrip() {
        let report = sample_report();
        let json = to_json(&report).unwrap();
        let back: PipelineReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn ticker_stats_row_flattens() {
        let report = sample_report();
        let row = TickerStatsRow::new("AAA", &report.success_by_ticker["AAA"]);
        assert_eq!(row.num_trades, 2);
        assert_eq!(row.profit_factor, 1.5);
    }
}
