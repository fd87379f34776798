//! Vesign CLI: daily signal pipeline, evaluation, and housekeeping.
//!
//! Commands:
//! - `run`: compute features, signals, rankings and allocations, then
//!   evaluate trades and write every table plus a run report
//! - `evaluate`: rebuild trades and success statistics from stored signals
//! - `init-config`: write a default pipeline config (and optionally the
//!   default universe)
//! - `guard check|mark|status`: refresh guard for low-frequency jobs
//! - `import-prices`: upsert a price CSV into the Parquet cache

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, TimeDelta};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vesign_core::data::{PriceCache, Universe};
use vesign_runner::{
    evaluate_store, import_prices, load_analyst, load_cached_prices, load_companies,
    load_prices_csv, load_weights, run_and_persist, synthetic_inputs, PipelineConfig,
    PipelineInputs, PipelineReport, RefreshGuard, RunOptions, SystemClock, TableStore,
};

#[derive(Parser)]
#[command(
    name = "vesign",
    about = "Vesign CLI: equity signal generation, ranking and sector-balanced allocation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily pipeline and write all tables to the output directory.
    Run {
        /// Pipeline config (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Price bars CSV (ticker,date,open,high,low,close,volume).
        #[arg(long, conflicts_with_all = ["cache_dir", "synthetic"])]
        prices: Option<PathBuf>,

        /// Read price bars from this Parquet cache instead of a CSV.
        #[arg(long, conflicts_with = "synthetic")]
        cache_dir: Option<PathBuf>,

        /// Generate deterministic synthetic inputs for the universe.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Companies CSV (ticker,company,sector).
        #[arg(long, conflicts_with = "universe")]
        companies: Option<PathBuf>,

        /// Universe TOML (`[sectors]` table). Defaults to the built-in US universe.
        #[arg(long)]
        universe: Option<PathBuf>,

        /// Analyst targets CSV.
        #[arg(long)]
        analyst: Option<PathBuf>,

        /// Fitted factor weights CSV (one row).
        #[arg(long)]
        weights: Option<PathBuf>,

        /// First bar date loaded from the cache or generated (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Last bar date loaded from the cache or generated (YYYY-MM-DD).
        #[arg(long)]
        end: Option<String>,

        /// Only write rows dated on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Reference date for the success-rate window (YYYY-MM-DD).
        #[arg(long)]
        as_of: Option<String>,

        /// Output directory for tables and reports.
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Rebuild trades and success statistics from stored signals.
    Evaluate {
        /// Pipeline config (TOML); only the `[evaluation]` section is used.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Reference date for the success-rate window (YYYY-MM-DD).
        #[arg(long)]
        as_of: Option<String>,

        /// Output directory holding `signals.csv`.
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Write a default pipeline config.
    InitConfig {
        /// Destination path.
        #[arg(long, default_value = "vesign.toml")]
        path: PathBuf,

        /// Also write the built-in universe to this path.
        #[arg(long)]
        universe: Option<PathBuf>,

        /// Overwrite existing files.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Refresh guard for low-frequency jobs.
    Guard {
        /// Ledger file.
        #[arg(long, default_value = ".vesign/guard.json")]
        ledger: PathBuf,

        #[command(subcommand)]
        action: GuardAction,
    },
    /// Upsert a price CSV into the Parquet cache.
    ImportPrices {
        /// Price bars CSV.
        #[arg(long)]
        prices: PathBuf,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum GuardAction {
    /// Exit 0 if the job is due, 1 otherwise.
    Check {
        job: String,

        /// Minimum hours between runs.
        #[arg(long, default_value_t = 24)]
        every_hours: i64,
    },
    /// Record that the job ran now.
    Mark { job: String },
    /// List jobs and their last run.
    Status,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            prices,
            cache_dir,
            synthetic,
            companies,
            universe,
            analyst,
            weights,
            start,
            end,
            since,
            as_of,
            output_dir,
        } => {
            let sources = Sources {
                prices,
                cache_dir,
                synthetic,
                companies,
                universe,
                analyst,
                weights,
                start: parse_date(start.as_deref())?,
                end: parse_date(end.as_deref())?,
            };
            let options = RunOptions {
                since: parse_date(since.as_deref())?,
                as_of: parse_date(as_of.as_deref())?,
            };
            run_cmd(config.as_deref(), sources, options, &output_dir)
        }
        Commands::Evaluate {
            config,
            as_of,
            output_dir,
        } => evaluate_cmd(
            config.as_deref(),
            parse_date(as_of.as_deref())?,
            &output_dir,
        ),
        Commands::InitConfig {
            path,
            universe,
            force,
        } => init_config_cmd(&path, universe.as_deref(), force),
        Commands::Guard { ledger, action } => guard_cmd(&ledger, action),
        Commands::ImportPrices { prices, cache_dir } => import_cmd(&prices, &cache_dir),
    }
}

fn parse_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    s.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
    })
    .transpose()
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

// ── run ──────────────────────────────────────────────────────────────

struct Sources {
    prices: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    synthetic: bool,
    companies: Option<PathBuf>,
    universe: Option<PathBuf>,
    analyst: Option<PathBuf>,
    weights: Option<PathBuf>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl Sources {
    fn load(self) -> Result<PipelineInputs> {
        let universe = match (&self.companies, &self.universe) {
            (Some(path), _) => load_companies(path)
                .with_context(|| format!("loading companies {}", path.display()))?,
            (None, Some(path)) => Universe::from_file(path)
                .with_context(|| format!("loading universe {}", path.display()))?,
            (None, None) => Universe::default_us(),
        };

        if self.synthetic {
            let end = self.end.unwrap_or_else(|| chrono::Local::now().date_naive());
            let start = self.start.unwrap_or_else(|| {
                end.checked_sub_signed(TimeDelta::days(365 * 2))
                    .unwrap_or(NaiveDate::MIN)
            });
            if start > end {
                bail!("--start {start} is after --end {end}");
            }
            info!(%start, %end, tickers = universe.ticker_count(), "generating synthetic inputs");
            return Ok(synthetic_inputs(universe, start, end));
        }

        let prices = match (&self.prices, &self.cache_dir) {
            (Some(path), _) => load_prices_csv(path)
                .with_context(|| format!("loading prices {}", path.display()))?,
            (None, Some(dir)) => {
                let cache = PriceCache::new(dir);
                let range = match (self.start, self.end) {
                    (None, None) => None,
                    (start, end) => Some((
                        start.unwrap_or(NaiveDate::MIN),
                        end.unwrap_or(NaiveDate::MAX),
                    )),
                };
                load_cached_prices(&cache, &universe.all_tickers(), range)
                    .with_context(|| format!("loading cache {}", dir.display()))?
            }
            (None, None) => bail!("one of --prices, --cache-dir or --synthetic is required"),
        };

        let analyst = match &self.analyst {
            Some(path) => load_analyst(path)
                .with_context(|| format!("loading analyst targets {}", path.display()))?,
            None => Default::default(),
        };
        let weights = match &self.weights {
            Some(path) => load_weights(path)
                .with_context(|| format!("loading weights {}", path.display()))?,
            None => None,
        };

        Ok(PipelineInputs {
            prices,
            universe,
            analyst,
            weights,
        })
    }
}

fn run_cmd(
    config_path: Option<&Path>,
    sources: Sources,
    options: RunOptions,
    output_dir: &Path,
) -> Result<()> {
    let config = load_config(config_path)?;
    let inputs = sources.load()?;
    if inputs.prices.is_empty() {
        bail!("no price bars loaded");
    }

    let store = TableStore::new(output_dir);
    let report = run_and_persist(&config, &inputs, &options, &store)
        .with_context(|| format!("writing tables to {}", output_dir.display()))?;

    print_summary(&report);
    println!("Tables written to: {}", output_dir.display());
    Ok(())
}

fn print_summary(report: &PipelineReport) {
    let window = match (report.window_start, report.window_end) {
        (Some(s), Some(e)) => format!("{s} .. {e}"),
        _ => "-".into(),
    };
    println!("Policy:          {}", report.policy);
    println!("Window:          {window}");
    println!(
        "Tickers:         {} ({} failed)",
        report.tickers,
        report.failures.len()
    );
    println!(
        "Signals:         {} (BUY {}, HOLD {}, SELL {})",
        report.counts.signals, report.counts.buy, report.counts.hold, report.counts.sell
    );
    println!("Allocations:     {}", report.counts.allocations);
    println!(
        "Trades:          {} closed, {} open",
        report.trades, report.open_positions
    );
    println!(
        "Success rate:    {:.2}%",
        report.success.success_rate * 100.0
    );
    if let Some(mean) = report.strategy.mean_strategy_return {
        println!("Mean strat ret:  {:.4}%", mean * 100.0);
    }
    for f in &report.failures {
        eprintln!("  {} failed at {}: {}", f.ticker, f.stage, f.error);
    }
}

// ── evaluate ─────────────────────────────────────────────────────────

fn evaluate_cmd(
    config_path: Option<&Path>,
    as_of: Option<NaiveDate>,
    output_dir: &Path,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = TableStore::new(output_dir);
    let evaluation = evaluate_store(&store, &config.evaluation, as_of)
        .with_context(|| format!("evaluating signals in {}", output_dir.display()))?;

    let s = &evaluation.success.overall;
    println!(
        "Trades:          {} closed, {} open",
        evaluation.log.trades.len(),
        evaluation.log.open.len()
    );
    if let Some(start) = evaluation.window_start {
        println!("Success window:  {start} ..");
    }
    println!("Evaluated:       {}", s.num_trades);
    println!("Success rate:    {:.2}%", s.success_rate * 100.0);
    println!("Avg return:      {:.4}%", s.avg_return * 100.0);
    println!("Profit factor:   {:.2}", s.profit_factor);
    Ok(())
}

// ── init-config ──────────────────────────────────────────────────────

fn init_config_cmd(path: &Path, universe: Option<&Path>, force: bool) -> Result<()> {
    write_new(path, &PipelineConfig::default().to_toml()?, force)?;
    println!("Wrote {}", path.display());

    if let Some(universe_path) = universe {
        write_new(universe_path, &Universe::default_us().to_toml()?, force)?;
        println!("Wrote {}", universe_path.display());
    }
    Ok(())
}

fn write_new(path: &Path, content: &str, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}

// ── guard ────────────────────────────────────────────────────────────

fn guard_cmd(ledger: &Path, action: GuardAction) -> Result<()> {
    let mut guard = RefreshGuard::open(ledger, SystemClock)
        .with_context(|| format!("opening guard ledger {}", ledger.display()))?;

    match action {
        GuardAction::Check { job, every_hours } => {
            if guard.should_run(&job, refresh_interval(every_hours)?) {
                println!("{job}: due");
            } else {
                println!("{job}: not due");
                std::process::exit(1);
            }
        }
        GuardAction::Mark { job } => {
            guard.mark_run(&job)?;
            println!("{job}: marked");
        }
        GuardAction::Status => {
            for (job, at) in guard.entries() {
                println!("{job:<20} {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
    }
    Ok(())
}

fn refresh_interval(hours: i64) -> Result<TimeDelta> {
    if hours < 0 {
        bail!("--every-hours must not be negative (got {hours})");
    }
    match TimeDelta::try_hours(hours) {
        Some(every) => Ok(every),
        None => bail!("--every-hours {hours} is out of range"),
    }
}

// ── import-prices ────────────────────────────────────────────────────

fn import_cmd(prices_path: &Path, cache_dir: &Path) -> Result<()> {
    let prices = load_prices_csv(prices_path)
        .with_context(|| format!("loading prices {}", prices_path.display()))?;
    let cache = PriceCache::new(cache_dir);
    let summaries = import_prices(&cache, &prices)
        .with_context(|| format!("writing cache {}", cache_dir.display()))?;

    for (ticker, s) in &summaries {
        println!(
            "{ticker:<8} +{} new, {} replaced, {} total",
            s.inserted, s.replaced, s.total
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_interval_rejects_out_of_range_hours() {
        assert_eq!(refresh_interval(24).unwrap(), TimeDelta::hours(24));
        assert_eq!(refresh_interval(0).unwrap(), TimeDelta::zero());
        assert!(refresh_interval(-1).is_err());
        assert!(refresh_interval(i64::MAX).is_err());
    }
}
