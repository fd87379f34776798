//! Universe: the tracked tickers with their company name and sector.
//!
//! Loaded from the companies table (`ticker,company,sector` rows) or from a
//! TOML file keyed by sector:
//!
//! ```toml
//! [sectors]
//! Technology = ["AAPL", "MSFT"]
//! Energy = ["XOM"]
//! ```
//!
//! A ticker belongs to exactly one sector.

use crate::allocation::SectorMap;
use crate::domain::Company;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse universe TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize universe TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("ticker {ticker} listed in both {first} and {second}")]
    DuplicateTicker {
        ticker: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectorFile {
    sectors: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Universe {
    companies: Vec<Company>,
    index: HashMap<String, usize>,
}

impl Universe {
    /// Build from company rows. Order is kept; a repeated ticker is an error.
    pub fn from_companies(companies: Vec<Company>) -> Result<Self, UniverseError> {
        let mut index = HashMap::with_capacity(companies.len());
        for (i, c) in companies.iter().enumerate() {
            if let Some(prev) = index.insert(c.ticker.clone(), i) {
                return Err(UniverseError::DuplicateTicker {
                    ticker: c.ticker.clone(),
                    first: companies[prev].sector.clone(),
                    second: c.sector.clone(),
                });
            }
        }
        Ok(Self { companies, index })
    }

    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|source| UniverseError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse the sector-keyed TOML form. Company names default to the ticker.
    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        let file: SectorFile = toml::from_str(content)?;
        let companies = file
            .sectors
            .into_iter()
            .flat_map(|(sector, tickers)| {
                tickers.into_iter().map(move |ticker| Company {
                    company: ticker.clone(),
                    ticker,
                    sector: sector.clone(),
                })
            })
            .collect();
        Self::from_companies(companies)
    }

    pub fn to_toml(&self) -> Result<String, UniverseError> {
        let mut sectors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for c in &self.companies {
            sectors
                .entry(c.sector.clone())
                .or_default()
                .push(c.ticker.clone());
        }
        Ok(toml::to_string_pretty(&SectorFile { sectors })?)
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    pub fn company(&self, ticker: &str) -> Option<&Company> {
        self.index.get(ticker).map(|&i| &self.companies[i])
    }

    pub fn sector_of(&self, ticker: &str) -> Option<&str> {
        self.company(ticker).map(|c| c.sector.as_str())
    }

    pub fn all_tickers(&self) -> Vec<&str> {
        self.companies.iter().map(|c| c.ticker.as_str()).collect()
    }

    /// Distinct sector names, sorted.
    pub fn sector_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.companies.iter().map(|c| c.sector.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn sector_tickers(&self, sector: &str) -> Vec<&str> {
        self.companies
            .iter()
            .filter(|c| c.sector == sector)
            .map(|c| c.ticker.as_str())
            .collect()
    }

    pub fn ticker_count(&self) -> usize {
        self.companies.len()
    }

    pub fn sector_map(&self) -> SectorMap {
        SectorMap::from_companies(&self.companies)
    }

    /// A small default US equity universe across major sectors.
    pub fn default_us() -> Self {
        let rows: [(&str, &str, &str); 16] = [
            ("AAPL", "Apple Inc.", "Technology"),
            ("MSFT", "Microsoft Corporation", "Technology"),
            ("NVDA", "NVIDIA Corporation", "Technology"),
            ("ORCL", "Oracle Corporation", "Technology"),
            ("JNJ", "Johnson & Johnson", "Healthcare"),
            ("UNH", "UnitedHealth Group", "Healthcare"),
            ("PFE", "Pfizer Inc.", "Healthcare"),
            ("JPM", "JPMorgan Chase & Co.", "Financials"),
            ("BAC", "Bank of America", "Financials"),
            ("GS", "Goldman Sachs", "Financials"),
            ("XOM", "Exxon Mobil", "Energy"),
            ("CVX", "Chevron", "Energy"),
            ("WMT", "Walmart", "Consumer Staples"),
            ("PG", "Procter & Gamble", "Consumer Staples"),
            ("KO", "Coca-Cola", "Consumer Staples"),
            ("HD", "Home Depot", "Consumer Discretionary"),
        ];
        let companies = rows
            .iter()
            .map(|(ticker, company, sector)| Company {
                ticker: ticker.to_string(),
                company: company.to_string(),
                sector: sector.to_string(),
            })
            .collect::<Vec<_>>();
        let index = companies
            .iter()
            .enumerate()
            .map(|(i, c)| (c.ticker.clone(), i))
            .collect();
        Self { companies, index }
    }
}
