//! Vesign Core: signal generation, trade lifecycle, ranking and allocation.
//!
//! Pure per-ticker and per-day computations over daily equity bars:
//! - Domain rows keyed by `(ticker, date)`
//! - Technical indicators and the factor feature engine
//! - Factor scoring against externally fitted weights
//! - Two selectable BUY/HOLD/SELL rule policies
//! - Trade lifecycle state machine (BUY → SELL pairing)
//! - Per-day ranking and sector-balanced allocation
//! - Forward returns, masked strategy returns and trade success rates
//! - Window-replace tables and the Parquet price cache

pub mod allocation;
pub mod backtest;
pub mod data;
pub mod domain;
pub mod features;
pub mod indicators;
pub mod lifecycle;
pub mod ranking;
pub mod scoring;
pub mod signals;
pub mod table;

pub use allocation::{allocate_by_day, allocate_day, CapitalAmount, DayAllocation, SectorMap};
pub use backtest::{
    forward_returns, strategy_returns, success_rate, trailing_cutoff, trailing_window, Backtest,
    BacktestResult, ForwardReturn, Horizons, StrategySummary, SuccessReport, TradeStats,
};
pub use features::{compute_features, FeatureConfig, FeatureError};
pub use lifecycle::{pair_trades, PositionState, TradeLog, TradeTracker, TrackerError};
pub use ranking::{rank_by_day, rank_day};
pub use scoring::{score_features, BlendWeights, ScoringError};
pub use signals::{generate_signals, RulePolicy, SignalError, SignalRule};
pub use table::DatedTable;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the runner moves across rayon workers
    /// is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain rows
        require_send::<domain::PriceBar>();
        require_sync::<domain::PriceBar>();
        require_send::<domain::FeatureRow>();
        require_sync::<domain::FeatureRow>();
        require_send::<domain::Prediction>();
        require_sync::<domain::Prediction>();
        require_send::<domain::Signal>();
        require_sync::<domain::Signal>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::AnalystExpectation>();
        require_sync::<domain::AnalystExpectation>();
        require_send::<domain::FactorWeights>();
        require_sync::<domain::FactorWeights>();

        // Configuration
        require_send::<FeatureConfig>();
        require_sync::<FeatureConfig>();
        require_send::<RulePolicy>();
        require_sync::<RulePolicy>();
        require_send::<BlendWeights>();
        require_sync::<BlendWeights>();

        // Errors
        require_send::<FeatureError>();
        require_sync::<FeatureError>();
        require_send::<SignalError>();
        require_sync::<SignalError>();
        require_send::<TrackerError>();
        require_sync::<TrackerError>();
        require_send::<data::CacheError>();
        require_sync::<data::CacheError>();

        // Rules are built inside each worker
        require_send::<Box<dyn SignalRule>>();
        require_send::<SectorMap>();
        require_sync::<SectorMap>();
    }

    /// Rules see only feature rows, a prediction score and analyst data.
    /// There is no position or portfolio parameter to reach for.
    #[test]
    fn signal_rule_has_no_position_parameter() {
        fn _check(rule: &mut dyn SignalRule, input: &signals::RuleInput<'_>) -> domain::SignalKind {
            rule.evaluate(input).0
        }
    }
}
