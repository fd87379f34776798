//! Input loading for the pipeline.
//!
//! Price bars come from one of three sources:
//! 1. A CSV export with header `ticker,date,open,high,low,close,volume`
//! 2. The Parquet price cache
//! 3. Deterministic synthetic bars (demos and tests)
//!
//! Companies, analyst targets and factor weights are CSV files. Rows are
//! kept in file order; series integrity is checked downstream, never
//! repaired here.

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};
use vesign_core::data::{CacheError, PriceCache, Universe, UniverseError, UpsertSummary};
use vesign_core::domain::{
    AnalystExpectation, Company, FactorCoefficients, FactorWeights, PriceBar,
};

/// Bars grouped by ticker; tickers iterate in sorted order.
pub type PriceSet = BTreeMap<String, Vec<PriceBar>>;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Universe(#[from] UniverseError),
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> InputError + '_ {
    move |source| InputError::Csv {
        path: path.display().to_string(),
        source,
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, InputError> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_err(path))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_err(path))
}

/// Everything the pipeline consumes besides its configuration.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub prices: PriceSet,
    pub universe: Universe,
    pub analyst: HashMap<String, AnalystExpectation>,
    pub weights: Option<FactorWeights>,
}

impl PipelineInputs {
    /// BLAKE3 over every bar, tickers in sorted order.
    pub fn dataset_hash(&self) -> String {
        dataset_hash(&self.prices)
    }
}

// ── CSV sources ──────────────────────────────────────────────────────

pub fn load_prices_csv(path: &Path) -> Result<PriceSet, InputError> {
    let bars: Vec<PriceBar> = read_rows(path)?;
    let count = bars.len();
    let prices = group_by_ticker(bars);
    info!(path = %path.display(), bars = count, tickers = prices.len(), "loaded price CSV");
    Ok(prices)
}

pub fn load_companies(path: &Path) -> Result<Universe, InputError> {
    let companies: Vec<Company> = read_rows(path)?;
    Ok(Universe::from_companies(companies)?)
}

/// Analyst snapshot keyed by ticker. A later row for the same ticker
/// replaces an earlier one.
pub fn load_analyst(path: &Path) -> Result<HashMap<String, AnalystExpectation>, InputError> {
    let rows: Vec<AnalystExpectation> = read_rows(path)?;
    Ok(rows.into_iter().map(|a| (a.ticker.clone(), a)).collect())
}

/// The current factor weights: the last row of the file, `None` when the
/// file has no data rows.
pub fn load_weights(path: &Path) -> Result<Option<FactorWeights>, InputError> {
    let rows: Vec<FactorWeights> = read_rows(path)?;
    Ok(rows.last().copied())
}

fn group_by_ticker(bars: Vec<PriceBar>) -> PriceSet {
    let mut prices = PriceSet::new();
    for bar in bars {
        prices.entry(bar.ticker.clone()).or_default().push(bar);
    }
    prices
}

// ── Parquet cache ────────────────────────────────────────────────────

/// Load cached bars for `tickers`, optionally limited to `[start, end]`.
///
/// Tickers with nothing cached are skipped with a warning; other cache
/// errors abort the load.
pub fn load_cached_prices(
    cache: &PriceCache,
    tickers: &[&str],
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<PriceSet, InputError> {
    let mut prices = PriceSet::new();
    for &ticker in tickers {
        let loaded = match range {
            Some((start, end)) => cache.load_range(ticker, start, end),
            None => cache.load(ticker),
        };
        match loaded {
            Ok(bars) if bars.is_empty() => warn!(ticker, "no cached bars in range"),
            Ok(bars) => {
                prices.insert(ticker.to_string(), bars);
            }
            Err(CacheError::NoCachedData { .. }) => warn!(ticker, "ticker not in price cache"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(prices)
}

/// Upsert every ticker's bars into the cache.
pub fn import_prices(
    cache: &PriceCache,
    prices: &PriceSet,
) -> Result<Vec<(String, UpsertSummary)>, InputError> {
    let mut summaries = Vec::with_capacity(prices.len());
    for (ticker, bars) in prices {
        let summary = cache.upsert(ticker, bars)?;
        info!(
            ticker = %ticker,
            inserted = summary.inserted,
            replaced = summary.replaced,
            total = summary.total,
            "cached bars"
        );
        summaries.push((ticker.clone(), summary));
    }
    Ok(summaries)
}

// ── Synthetic data ───────────────────────────────────────────────────

fn seeded_rng(key: &str) -> StdRng {
    StdRng::from_seed(*blake3::hash(key.as_bytes()).as_bytes())
}

/// A deterministic random walk from 100.0 over weekdays in `[start, end]`,
/// seeded from the ticker name.
pub fn synthetic_bars(ticker: &str, start: NaiveDate, end: NaiveDate) -> Vec<PriceBar> {
    let mut rng = seeded_rng(ticker);
    let mut bars = Vec::new();
    let mut price = 100.0_f64;
    let mut current = start;

    while current <= end {
        let weekday = current.weekday();
        if weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun {
            current += chrono::Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64);

        bars.push(PriceBar {
            ticker: ticker.to_string(),
            date: current,
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
        current += chrono::Duration::days(1);
    }

    bars
}

/// Synthetic bars and analyst targets for every ticker in `universe`,
/// with a fixed set of factor weights.
pub fn synthetic_inputs(universe: Universe, start: NaiveDate, end: NaiveDate) -> PipelineInputs {
    let mut prices = PriceSet::new();
    let mut analyst = HashMap::new();

    for ticker in universe.all_tickers() {
        let bars = synthetic_bars(ticker, start, end);
        if let Some(last) = bars.last() {
            let mut rng = seeded_rng(&format!("{ticker}/analyst"));
            let mean = last.close * (1.0 + rng.gen_range(-0.10..0.30));
            analyst.insert(
                ticker.to_string(),
                AnalystExpectation {
                    ticker: ticker.to_string(),
                    target_mean_price: Some(mean),
                    target_high_price: Some(mean * 1.2),
                    target_low_price: Some(mean * 0.8),
                    number_of_analysts: Some(rng.gen_range(3..30)),
                },
            );
        }
        prices.insert(ticker.to_string(), bars);
    }

    PipelineInputs {
        prices,
        universe,
        analyst,
        weights: Some(synthetic_weights()),
    }
}

fn synthetic_weights() -> FactorWeights {
    FactorWeights {
        short: FactorCoefficients {
            rsi: 0.010,
            bb: 0.008,
            macd: 0.004,
            trend: 0.020,
        },
        medium: FactorCoefficients {
            rsi: 0.015,
            bb: 0.012,
            macd: 0.006,
            trend: 0.040,
        },
    }
}

pub fn dataset_hash(prices: &PriceSet) -> String {
    let mut hasher = blake3::Hasher::new();
    for (ticker, bars) in prices {
        hasher.update(ticker.as_bytes());
        for bar in bars {
            hasher.update(bar.date.to_string().as_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn synthetic_bars_skip_weekends_and_are_deterministic() {
        // 2024-01-01 is a Monday.
        let bars = synthetic_bars("AAPL", date(2024, 1, 1), date(2024, 1, 14));
        assert_eq!(bars.len(), 10);
        assert!(bars.iter().all(|b| b.is_sane()));
        assert!(bars
            .iter()
            .all(|b| !matches!(b.date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)));

        let again = synthetic_bars("AAPL", date(2024, 1, 1), date(2024, 1, 14));
        assert_eq!(bars, again);

        let other = synthetic_bars("MSFT", date(2024, 1, 1), date(2024, 1, 14));
        assert_ne!(bars[1].close, other[1].close);
    }

    #[test]
    fn dataset_hash_changes_with_data() {
        let mut prices = PriceSet::new();
        prices.insert(
            "AAPL".into(),
            synthetic_bars("AAPL", date(2024, 1, 1), date(2024, 1, 31)),
        );
        let before = dataset_hash(&prices);
        assert_eq!(before, dataset_hash(&prices.clone()));

        if let Some(bars) = prices.get_mut("AAPL") {
            bars[0].close += 0.01;
        }
        assert_ne!(before, dataset_hash(&prices));
    }

    #[test]
    fn synthetic_inputs_cover_universe() {
        let universe = Universe::default_us();
        let tickers = universe.ticker_count();
        let inputs = synthetic_inputs(universe, date(2024, 1, 1), date(2024, 3, 29));
        assert_eq!(inputs.prices.len(), tickers);
        assert_eq!(inputs.analyst.len(), tickers);
        assert!(inputs.weights.is_some());
    }

    #[test]
    fn price_csv_groups_by_ticker_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "prices.csv",
            "ticker,date,open,high,low,close,volume\n\
             AAA,2024-01-02,10,11,9,10.5,100\n\
             BBB,2024-01-02,20,21,19,20.5,200\n\
             AAA,2024-01-03,10.5,12,10,11.5,150\n",
        );
        let prices = load_prices_csv(&path).unwrap();
        assert_eq!(prices.len(), 2);
        let aaa = &prices["AAA"];
        assert_eq!(aaa.len(), 2);
        assert_eq!(aaa[1].date, date(2024, 1, 3));
        assert_eq!(aaa[1].close, 11.5);
    }

    #[test]
    fn analyst_csv_allows_missing_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "analyst.csv",
            "ticker,target_mean_price,target_high_price,target_low_price,number_of_analysts\n\
             AAA,120.5,150,100,12\n\
             BBB,,,,\n",
        );
        let analyst = load_analyst(&path).unwrap();
        assert_eq!(analyst["AAA"].target_mean_price, Some(120.5));
        assert_eq!(analyst["BBB"].target_mean_price, None);
        assert_eq!(analyst["BBB"].number_of_analysts, None);
    }

    #[test]
    fn weights_csv_takes_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let header = "short_rsi_factor,short_bb_factor,short_macd_factor,short_trend_factor,\
                      med_rsi_factor,med_bb_factor,med_macd_factor,med_trend_factor\n";
        let path = write(
            dir.path(),
            "weights.csv",
            &format!("{header}1,2,3,4,5,6,7,8\n0.1,0.2,0.3,0.4,0.5,0.6,0.7,0.8\n"),
        );
        let weights = load_weights(&path).unwrap().unwrap();
        assert_eq!(weights.short.rsi, 0.1);
        assert_eq!(weights.medium.trend, 0.8);

        let empty = write(dir.path(), "empty.csv", header);
        assert_eq!(load_weights(&empty).unwrap(), None);
    }

    #[test]
    fn companies_csv_builds_universe() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "companies.csv",
            "ticker,company,sector\nAAA,Alpha Inc,Tech\nBBB,Beta Corp,Energy\n",
        );
        let universe = load_companies(&path).unwrap();
        assert_eq!(universe.sector_of("BBB"), Some("Energy"));

        let dup = write(
            dir.path(),
            "dup.csv",
            "ticker,company,sector\nAAA,Alpha Inc,Tech\nAAA,Alpha Again,Tech\n",
        );
        assert!(matches!(
            load_companies(&dup),
            Err(InputError::Universe(UniverseError::DuplicateTicker { .. }))
        ));
    }

    #[test]
    fn missing_file_is_csv_error() {
        let err = load_prices_csv(Path::new("/nonexistent/prices.csv")).unwrap_err();
        assert!(matches!(err, InputError::Csv { .. }));
    }

    #[test]
    fn cached_prices_skip_unknown_tickers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PriceCache::new(dir.path());
        let mut prices = PriceSet::new();
        prices.insert(
            "AAA".into(),
            synthetic_bars("AAA", date(2024, 1, 1), date(2024, 2, 29)),
        );
        let summaries = import_prices(&cache, &prices).unwrap();
        assert_eq!(summaries[0].1.inserted, prices["AAA"].len());

        let loaded = load_cached_prices(&cache, &["AAA", "ZZZ"], None).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["AAA"].len(), prices["AAA"].len());

        let january =
            load_cached_prices(&cache, &["AAA"], Some((date(2024, 1, 1), date(2024, 1, 31))))
                .unwrap();
        assert!(january["AAA"].iter().all(|b| b.date.month() == 1));
    }
}
