//! Parquet price cache with Hive-style partitioning.
//!
//! Layout: `{cache_dir}/ticker={TICKER}/{year}.parquet` plus a `meta.json`
//! sidecar per ticker (date range, bar count, content hash).
//!
//! - Writes are atomic: each partition is written to `.tmp` and renamed.
//! - `upsert` merges newly fetched daily bars into the cached history; a new
//!   bar replaces the cached bar with the same date. Only the touched year
//!   partitions are rewritten.
//! - Corrupt partitions are renamed to `{year}.parquet.quarantined` on load
//!   and skipped.

use crate::domain::{check_series, BarError, PriceBar};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("cache validation failed: {0}")]
    Validation(String),

    #[error("no cached data for {ticker}")]
    NoCachedData { ticker: String },

    #[error(transparent)]
    Integrity(#[from] BarError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Metadata sidecar for a cached ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bar_count: usize,
    pub data_hash: String,
}

/// Outcome of merging new bars into the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub total: usize,
}

pub struct PriceCache {
    cache_dir: PathBuf,
}

impl PriceCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn ticker_dir(&self, ticker: &str) -> PathBuf {
        self.cache_dir.join(format!("ticker={ticker}"))
    }

    fn year_path(&self, ticker: &str, year: i32) -> PathBuf {
        self.ticker_dir(ticker).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, ticker: &str) -> PathBuf {
        self.ticker_dir(ticker).join("meta.json")
    }

    /// Replace the cached history of `ticker` with `bars`.
    ///
    /// Bars must be one ticker, strictly ascending. Partitions for years not
    /// present in `bars` are removed.
    pub fn write(&self, ticker: &str, bars: &[PriceBar]) -> Result<(), CacheError> {
        if bars.is_empty() {
            return Err(CacheError::Validation("no bars to cache".into()));
        }
        check_series(bars)?;

        let dir = self.ticker_dir(ticker);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let by_year = group_by_year(bars);
        for existing in self.cached_years(ticker)? {
            if !by_year.contains_key(&existing) {
                let path = self.year_path(ticker, existing);
                fs::remove_file(&path).map_err(io_err(&path))?;
            }
        }
        for (year, year_bars) in &by_year {
            self.write_partition(ticker, *year, year_bars)?;
        }
        self.write_meta(ticker, bars)
    }

    /// Merge `incoming` bars into the cached history.
    ///
    /// Incoming bars win on date collisions. Only the years that received
    /// bars are rewritten.
    pub fn upsert(&self, ticker: &str, incoming: &[PriceBar]) -> Result<UpsertSummary, CacheError> {
        if incoming.is_empty() {
            let total = self.get_meta(ticker).map(|m| m.bar_count).unwrap_or(0);
            return Ok(UpsertSummary {
                total,
                ..UpsertSummary::default()
            });
        }
        if let Some(bad) = incoming.iter().find(|b| b.ticker != ticker) {
            return Err(BarError::MixedTickers {
                expected: ticker.to_string(),
                found: bad.ticker.clone(),
            }
            .into());
        }

        let existing = match self.load(ticker) {
            Ok(bars) => bars,
            Err(CacheError::NoCachedData { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut merged: BTreeMap<NaiveDate, PriceBar> =
            existing.into_iter().map(|b| (b.date, b)).collect();
        let mut summary = UpsertSummary::default();
        let mut touched = BTreeSet::new();
        for bar in incoming {
            touched.insert(bar.date.year());
            match merged.insert(bar.date, bar.clone()) {
                Some(_) => summary.replaced += 1,
                None => summary.inserted += 1,
            }
        }

        let all: Vec<PriceBar> = merged.into_values().collect();
        summary.total = all.len();

        fs::create_dir_all(self.ticker_dir(ticker)).map_err(io_err(&self.cache_dir))?;
        let by_year = group_by_year(&all);
        for year in touched {
            if let Some(year_bars) = by_year.get(&year) {
                self.write_partition(ticker, year, year_bars)?;
            }
        }
        self.write_meta(ticker, &all)?;
        Ok(summary)
    }

    /// Load all cached bars for `ticker`, ascending by date.
    pub fn load(&self, ticker: &str) -> Result<Vec<PriceBar>, CacheError> {
        let dir = self.ticker_dir(ticker);
        if !dir.exists() {
            return Err(CacheError::NoCachedData {
                ticker: ticker.to_string(),
            });
        }

        let mut bars = Vec::new();
        for year in self.cached_years(ticker)? {
            let path = self.year_path(ticker, year);
            match load_and_validate_parquet(&path, ticker) {
                Ok(year_bars) => bars.extend(year_bars),
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        if bars.is_empty() {
            return Err(CacheError::NoCachedData {
                ticker: ticker.to_string(),
            });
        }
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    /// Load bars dated within `[start, end]`.
    pub fn load_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, CacheError> {
        Ok(self
            .load(ticker)?
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect())
    }

    /// Tickers with a cache directory, sorted.
    pub fn tickers(&self) -> Result<Vec<String>, CacheError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.cache_dir).map_err(io_err(&self.cache_dir))?;
        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(&self.cache_dir))?;
            let name = entry.file_name();
            if let Some(t) = name.to_str().and_then(|n| n.strip_prefix("ticker=")) {
                tickers.push(t.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }

    pub fn get_meta(&self, ticker: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(ticker)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Last cached date, used to decide which bars still need fetching.
    pub fn latest_date(&self, ticker: &str) -> Option<NaiveDate> {
        self.get_meta(ticker).map(|m| m.end_date)
    }

    fn cached_years(&self, ticker: &str) -> Result<Vec<i32>, CacheError> {
        let dir = self.ticker_dir(ticker);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut years = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let path = entry.map_err(io_err(&dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if let Some(year) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i32>().ok())
            {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }

    fn write_partition(
        &self,
        ticker: &str,
        year: i32,
        bars: &[&PriceBar],
    ) -> Result<(), CacheError> {
        let df = bars_to_dataframe(bars)?;
        let path = self.year_path(ticker, year);
        let tmp_path = path.with_extension("parquet.tmp");

        write_parquet(&df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::Io {
                path: path.clone(),
                source: e,
            }
        })
    }

    fn write_meta(&self, ticker: &str, bars: &[PriceBar]) -> Result<(), CacheError> {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Ok(());
        };
        let payload = serde_json::to_vec(bars)
            .map_err(|e| CacheError::Validation(format!("hash serialization: {e}")))?;
        let meta = CacheMeta {
            ticker: ticker.to_string(),
            start_date: first.date,
            end_date: last.date,
            bar_count: bars.len(),
            data_hash: blake3::hash(&payload).to_hex().to_string(),
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| CacheError::Validation(format!("meta serialization: {e}")))?;
        let path = self.meta_path(ticker);
        fs::write(&path, json).map_err(io_err(&path))
    }
}

fn group_by_year(bars: &[PriceBar]) -> BTreeMap<i32, Vec<&PriceBar>> {
    let mut by_year: BTreeMap<i32, Vec<&PriceBar>> = BTreeMap::new();
    for bar in bars {
        by_year.entry(bar.date.year()).or_default().push(bar);
    }
    by_year
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn bars_to_dataframe(bars: &[&PriceBar]) -> Result<DataFrame, CacheError> {
    let dates: Vec<i32> = bars
        .iter()
        .map(|b| (b.date - epoch()).num_days() as i32)
        .collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| CacheError::Parquet(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| CacheError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), CacheError> {
    let file = fs::File::create(path).map_err(io_err(path))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| CacheError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path, ticker: &str) -> Result<Vec<PriceBar>, CacheError> {
    let file = fs::File::open(path).map_err(io_err(path))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| CacheError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(CacheError::Validation("empty parquet file".into()));
    }
    for col_name in &COLUMNS {
        if df.column(col_name).is_err() {
            return Err(CacheError::Validation(format!(
                "missing column '{col_name}'"
            )));
        }
    }

    dataframe_to_bars(&df, ticker)
}

fn dataframe_to_bars(df: &DataFrame, ticker: &str) -> Result<Vec<PriceBar>, CacheError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| CacheError::Parquet(format!("column read: {e}")))
    };
    let typed = |name: &str, e: PolarsError| CacheError::Parquet(format!("{name} column type: {e}"));

    let date_ca = col("date")?.date().map_err(|e| typed("date", e))?;
    let open_ca = col("open")?.f64().map_err(|e| typed("open", e))?;
    let high_ca = col("high")?.f64().map_err(|e| typed("high", e))?;
    let low_ca = col("low")?.f64().map_err(|e| typed("low", e))?;
    let close_ca = col("close")?.f64().map_err(|e| typed("close", e))?;
    let vol_ca = col("volume")?.u64().map_err(|e| typed("volume", e))?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let days = date_ca
            .get(i)
            .ok_or_else(|| CacheError::Parquet(format!("null date at row {i}")))?;
        bars.push(PriceBar {
            ticker: ticker.to_string(),
            date: epoch() + chrono::Duration::days(i64::from(days)),
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
        });
    }
    Ok(bars)
}
