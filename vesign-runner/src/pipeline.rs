//! Pipeline orchestration.
//!
//! Two stages separated by a barrier:
//!
//! 1. **Per ticker** (rayon, no shared mutation): features → predictions →
//!    signals → masked backtest rows. A ticker whose data fails an
//!    integrity check is recorded in the failures list; the others go on.
//! 2. **Per day**: rank the day's BUY candidates, then allocate across
//!    sectors.
//!
//! The trade path pairs the full persisted signal history, so trades that
//! opened before the current window still close correctly.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};
use vesign_core::domain::{
    Allocation, AnalystExpectation, FactorWeights, FeatureRow, OpenPosition, PriceBar, Prediction,
    RankedSignal, Signal, SignalKind, Trade,
};
use vesign_core::{
    allocate_by_day, compute_features, generate_signals, pair_trades, rank_by_day,
    score_features, strategy_returns, success_rate, trailing_cutoff, trailing_window, BacktestResult, BlendWeights,
    DayAllocation, FeatureConfig, Horizons, RulePolicy, StrategySummary, SuccessReport, TradeLog,
    TradeStats, TrackerError,
};

use crate::config::{EvaluationConfig, PipelineConfig};
use crate::inputs::PipelineInputs;
use crate::report::{self, PipelineReport, RowCounts, TickerStatsRow};
use crate::store::{StoreError, TableStore};

// ── Table names ──────────────────────────────────────────────────────

pub const FEATURES: &str = "features";
pub const PREDICTIONS: &str = "predictions";
pub const SIGNALS: &str = "signals";
pub const RANKED: &str = "ranked";
pub const ALLOCATIONS: &str = "allocations";
pub const BACKTEST: &str = "backtest";
pub const TRADES: &str = "trades";
pub const OPEN_POSITIONS: &str = "open_positions";
pub const TRADE_STATS: &str = "trade_stats";
pub const TRADE_STATS_BY_TICKER: &str = "trade_stats_by_ticker";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("stored signal history is inconsistent: {0}")]
    History(#[from] TrackerError),
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Emit rows dated on or after this date. Earlier bars still feed the
    /// indicator look-back.
    pub since: Option<NaiveDate>,
    /// Reference date for the success-rate window. Defaults to the last
    /// signal date in the history.
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Features,
    Predictions,
    Signals,
    Backtest,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Features => "features",
            Stage::Predictions => "predictions",
            Stage::Signals => "signals",
            Stage::Backtest => "backtest",
        };
        f.write_str(s)
    }
}

/// A ticker dropped from the run, with the stage that rejected it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerFailure {
    pub ticker: String,
    pub stage: Stage,
    pub error: String,
}

impl TickerFailure {
    fn new(ticker: &str, stage: Stage, error: impl fmt::Display) -> Self {
        Self {
            ticker: ticker.to_string(),
            stage,
            error: error.to_string(),
        }
    }
}

/// Everything the compute stages produce for the emitted window.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub features: Vec<FeatureRow>,
    pub predictions: Vec<Prediction>,
    pub signals: Vec<Signal>,
    pub ranked: Vec<RankedSignal>,
    pub days: Vec<DayAllocation>,
    /// Starts up to one horizon before the signal window, so rows whose
    /// forward closes arrived in this run are refreshed.
    pub backtest: Vec<BacktestResult>,
    pub strategy: StrategySummary,
    pub failures: Vec<TickerFailure>,
    pub scoring_skipped: Option<String>,
}

impl PipelineOutput {
    pub fn allocations(&self) -> Vec<Allocation> {
        self.days
            .iter()
            .flat_map(|d| d.allocations.iter().cloned())
            .collect()
    }

    /// First and last emitted signal date.
    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.signals.iter().map(|s| s.date).min()?;
        let last = self.signals.iter().map(|s| s.date).max()?;
        Some((first, last))
    }

    pub fn counts(&self) -> RowCounts {
        let kind = |k: SignalKind| self.signals.iter().filter(|s| s.signal == k).count();
        RowCounts {
            features: self.features.len(),
            predictions: self.predictions.len(),
            signals: self.signals.len(),
            buy: kind(SignalKind::Buy),
            hold: kind(SignalKind::Hold),
            sell: kind(SignalKind::Sell),
            ranked: self.ranked.len(),
            allocations: self.days.iter().map(|d| d.allocations.len()).sum(),
            backtest: self.backtest.len(),
        }
    }

    /// Span of the backtest rows; starts at or before `window()`.
    pub fn backtest_window(&self) -> Option<(NaiveDate, NaiveDate)> {
        let (start, end) = self.window()?;
        let first = self.backtest.iter().map(|b| b.date).min().unwrap_or(start);
        Some((first.min(start), end))
    }

    /// Tickers that produced a BUY but have no sector, sorted.
    pub fn unmapped_tickers(&self) -> Vec<String> {
        self.days
            .iter()
            .flat_map(|d| d.unmapped.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ── Per-ticker stage ─────────────────────────────────────────────────

struct TickerContext<'a> {
    features: &'a FeatureConfig,
    blend: &'a BlendWeights,
    policy: &'a RulePolicy,
    horizons: &'a Horizons,
    weights: Option<&'a FactorWeights>,
    since: Option<NaiveDate>,
}

struct TickerOutput {
    features: Vec<FeatureRow>,
    predictions: Vec<Prediction>,
    signals: Vec<Signal>,
    backtest: Vec<BacktestResult>,
    /// First date whose backtest row this run may change.
    backtest_from: Option<NaiveDate>,
}

fn process_ticker(
    ticker: &str,
    bars: &[PriceBar],
    analyst: Option<&AnalystExpectation>,
    ctx: &TickerContext<'_>,
) -> Result<TickerOutput, TickerFailure> {
    let features = compute_features(bars, ctx.features)
        .map_err(|e| TickerFailure::new(ticker, Stage::Features, e))?;

    let predictions = match ctx.weights {
        Some(w) => score_features(&features, Some(w), ctx.blend)
            .map_err(|e| TickerFailure::new(ticker, Stage::Predictions, e))?,
        None => Vec::new(),
    };

    let signals = generate_signals(&features, &predictions, analyst, ctx.policy)
        .map_err(|e| TickerFailure::new(ticker, Stage::Signals, e))?;

    let backtest = strategy_returns(bars, &signals, ctx.horizons)
        .map_err(|e| TickerFailure::new(ticker, Stage::Backtest, e))?
        .rows;

    // Forward returns reach `lookback` bars ahead, so the rows that far
    // before `since` may gain values now.
    let lookback = ctx.horizons.short.max(ctx.horizons.medium);
    let backtest_from = ctx.since.map(|since| {
        bars.iter()
            .position(|b| b.date >= since)
            .map_or(since, |first| bars[first.saturating_sub(lookback)].date)
    });

    let keep = |d: NaiveDate| ctx.since.map_or(true, |since| d >= since);
    Ok(TickerOutput {
        features: features.into_iter().filter(|r| keep(r.date)).collect(),
        predictions: predictions.into_iter().filter(|p| keep(p.date)).collect(),
        signals: signals.into_iter().filter(|s| keep(s.date)).collect(),
        backtest,
        backtest_from,
    })
}

/// Run the compute stages in memory.
pub fn run_pipeline(
    config: &PipelineConfig,
    inputs: &PipelineInputs,
    options: &RunOptions,
) -> PipelineOutput {
    let mut output = PipelineOutput::default();

    // An unusable weight set would fail every ticker the same way, so it
    // is checked once here.
    let weights = match score_features(&[], inputs.weights.as_ref(), &config.scoring) {
        Ok(_) => inputs.weights.as_ref(),
        Err(e) => {
            warn!(error = %e, "predictions skipped");
            output.scoring_skipped = Some(e.to_string());
            None
        }
    };

    let ctx = TickerContext {
        features: &config.features,
        blend: &config.scoring,
        policy: &config.policy,
        horizons: &config.horizons,
        weights,
        since: options.since,
    };

    let results: Vec<Result<TickerOutput, TickerFailure>> = inputs
        .prices
        .par_iter()
        .map(|(ticker, bars)| process_ticker(ticker, bars, inputs.analyst.get(ticker), &ctx))
        .collect();

    // Every ticker's backtest rows start at the earliest refresh date, so
    // the replaced range holds complete rows for all of them.
    let backtest_from = results
        .iter()
        .filter_map(|r| r.as_ref().ok().and_then(|t| t.backtest_from))
        .min();

    for result in results {
        match result {
            Ok(t) => {
                output.features.extend(t.features);
                output.predictions.extend(t.predictions);
                output.signals.extend(t.signals);
                let fresh = |b: &BacktestResult| backtest_from.map_or(true, |from| b.date >= from);
                output.backtest.extend(t.backtest.into_iter().filter(fresh));
            }
            Err(failure) => {
                warn!(
                    ticker = %failure.ticker,
                    stage = %failure.stage,
                    error = %failure.error,
                    "ticker dropped from run"
                );
                output.failures.push(failure);
            }
        }
    }
    let emitted: Vec<BacktestResult> = output
        .backtest
        .iter()
        .filter(|b| options.since.map_or(true, |since| b.date >= since))
        .cloned()
        .collect();
    output.strategy = StrategySummary::from_rows(&emitted);

    info!(
        tickers = inputs.prices.len(),
        failed = output.failures.len(),
        features = output.features.len(),
        predictions = output.predictions.len(),
        signals = output.signals.len(),
        "per-ticker stage complete"
    );

    // ── Per-day stage ──
    output.ranked = rank_by_day(&output.signals);
    output.days = allocate_by_day(&output.ranked, &inputs.universe.sector_map());
    for day in &output.days {
        if !day.even_split_sectors.is_empty() {
            debug!(
                date = ?day.date,
                sectors = ?day.even_split_sectors,
                "degenerate scores, even split within sector"
            );
        }
    }
    let unmapped = output.unmapped_tickers();
    if !unmapped.is_empty() {
        warn!(tickers = ?unmapped, "BUY candidates without a sector were not allocated");
    }

    info!(
        days = output.days.len(),
        ranked = output.ranked.len(),
        allocations = output.days.iter().map(|d| d.allocations.len()).sum::<usize>(),
        "per-day stage complete"
    );

    output
}

// ── Trade path ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub log: TradeLog,
    pub success: SuccessReport,
    pub as_of: Option<NaiveDate>,
    /// Earliest signal date feeding the success rate, when windowed.
    pub window_start: Option<NaiveDate>,
}

/// Pair trades from a signal history and compute success statistics.
///
/// The trade log always covers the whole history. With a configured
/// `success_window_days`, only signals on or after
/// `as_of - success_window_days` are paired for the statistics.
pub fn evaluate(
    history: &[Signal],
    config: &EvaluationConfig,
    as_of: Option<NaiveDate>,
) -> Result<Evaluation, TrackerError> {
    let log = pair_trades(history)?;
    let as_of = as_of.or_else(|| history.iter().map(|s| s.date).max());

    let (success, window_start) = match (config.success_window_days, as_of) {
        (Some(days), Some(as_of)) => {
            let windowed = trailing_window(history, as_of, days);
            let windowed_log = pair_trades(&windowed)?;
            (
                success_rate(&windowed_log.trades),
                Some(trailing_cutoff(as_of, days)),
            )
        }
        _ => (success_rate(&log.trades), None),
    };

    info!(
        trades = log.trades.len(),
        open = log.open.len(),
        success_rate = success.overall.success_rate,
        "trade evaluation complete"
    );

    Ok(Evaluation {
        log,
        success,
        as_of,
        window_start,
    })
}

/// Re-evaluate the stored signal history and rewrite the trade tables.
pub fn evaluate_store(
    store: &TableStore,
    config: &EvaluationConfig,
    as_of: Option<NaiveDate>,
) -> Result<Evaluation, PipelineError> {
    let history: Vec<Signal> = store.read_table(SIGNALS)?;
    let evaluation = evaluate(&history, config, as_of)?;
    write_evaluation(store, &evaluation)?;
    Ok(evaluation)
}

fn write_evaluation(store: &TableStore, evaluation: &Evaluation) -> Result<(), StoreError> {
    store.write_table::<Trade>(TRADES, &evaluation.log.trades)?;
    store.write_table::<OpenPosition>(OPEN_POSITIONS, &evaluation.log.open)?;
    store.write_table::<TradeStats>(TRADE_STATS, std::slice::from_ref(&evaluation.success.overall))?;
    let by_ticker: Vec<TickerStatsRow> = evaluation
        .success
        .by_ticker
        .iter()
        .map(|(ticker, stats)| TickerStatsRow::new(ticker, stats))
        .collect();
    store.write_table(TRADE_STATS_BY_TICKER, &by_ticker)
}

// ── Persisted run ────────────────────────────────────────────────────

/// Run the pipeline and persist every table under `store`.
///
/// Dated tables are window-replaced over the span of the emitted signals,
/// `backtest` from one horizon earlier, so rerunning the same inputs leaves
/// them byte-identical. Trade tables
/// are rebuilt from the full stored signal history.
pub fn run_and_persist(
    config: &PipelineConfig,
    inputs: &PipelineInputs,
    options: &RunOptions,
    store: &TableStore,
) -> Result<PipelineReport, PipelineError> {
    let output = run_pipeline(config, inputs, options);

    match (output.window(), output.backtest_window()) {
        (Some((start, end)), Some((backtest_start, _))) => {
            store.replace_range(FEATURES, start, end, output.features.clone())?;
            store.replace_range(PREDICTIONS, start, end, output.predictions.clone())?;
            store.replace_range(SIGNALS, start, end, output.signals.clone())?;
            store.replace_range(RANKED, start, end, output.ranked.clone())?;
            store.replace_range(ALLOCATIONS, start, end, output.allocations())?;
            store.replace_range(BACKTEST, backtest_start, end, output.backtest.clone())?;
            info!(%start, %end, dir = %store.dir().display(), "tables written");
        }
        _ => warn!("no signals emitted; dated tables left unchanged"),
    }

    let evaluation = evaluate_store(store, &config.evaluation, options.as_of)?;
    let report = build_report(config, inputs, &output, &evaluation);

    store.write_json("report.json", &report)?;
    store.write_text("report.md", &report::render_markdown(&report))?;
    Ok(report)
}

pub fn build_report(
    config: &PipelineConfig,
    inputs: &PipelineInputs,
    output: &PipelineOutput,
    evaluation: &Evaluation,
) -> PipelineReport {
    let window = output.window();
    // Only the last signal day's allocation is current.
    let latest_allocation = window.and_then(|(_, end)| {
        output
            .days
            .iter()
            .rev()
            .find(|d| d.date == Some(end))
            .cloned()
    });
    let capital = match (config.evaluation.capital, &latest_allocation) {
        (Some(capital), Some(day)) => Some(day.capital_amounts(capital)),
        _ => None,
    };

    PipelineReport {
        config_fingerprint: config.fingerprint(),
        dataset_hash: inputs.dataset_hash(),
        policy: config.policy.name().to_string(),
        window_start: window.map(|w| w.0),
        window_end: window.map(|w| w.1),
        tickers: inputs.prices.len(),
        failures: output.failures.clone(),
        scoring_skipped: output.scoring_skipped.clone(),
        counts: output.counts(),
        unmapped_tickers: output.unmapped_tickers(),
        even_split_days: output
            .days
            .iter()
            .filter(|d| !d.even_split_sectors.is_empty())
            .count(),
        strategy: output.strategy.clone(),
        trades: evaluation.log.trades.len(),
        open_positions: evaluation.log.open.len(),
        success_as_of: evaluation.as_of,
        success_window_start: evaluation.window_start,
        success: evaluation.success.overall.clone(),
        success_by_ticker: evaluation.success.by_ticker.clone(),
        latest_allocation,
        capital,
    }
}
