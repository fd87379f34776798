//! Vesign Runner: pipeline orchestration over `vesign-core`.
//!
//! This crate provides:
//! - TOML pipeline configuration with a content fingerprint
//! - Input loading from CSV, the Parquet price cache, or synthetic data
//! - A CSV table store with atomic window-replace writes
//! - The daily pipeline: parallel per-ticker stage, then ranking and
//!   allocation per day, then trade pairing and evaluation
//! - A refresh guard for low-frequency jobs
//! - JSON and Markdown run reports

pub mod config;
pub mod guard;
pub mod inputs;
pub mod pipeline;
pub mod report;
pub mod store;

pub use config::{ConfigError, EvaluationConfig, PipelineConfig};
pub use guard::{Clock, FixedClock, GuardError, RefreshGuard, SystemClock};
pub use inputs::{
    dataset_hash, import_prices, load_analyst, load_cached_prices, load_companies,
    load_prices_csv, load_weights, synthetic_bars, synthetic_inputs, InputError, PipelineInputs,
    PriceSet,
};
pub use pipeline::{
    evaluate, evaluate_store, run_and_persist, run_pipeline, Evaluation, PipelineError,
    PipelineOutput, RunOptions, Stage, TickerFailure,
};
pub use report::{render_markdown, PipelineReport, RowCounts, TickerStatsRow};
pub use store::{StoreError, TableStore};
