//! Sector-balanced allocator: one day's ranked BUYs → portfolio weights.
//!
//! With S distinct sectors among the candidates, each sector receives 1/S of
//! the capital. Inside a sector, member i receives
//!
//! ```text
//! weight_i = score_i / Σ score_sector × 1/S
//! ```
//!
//! Degenerate sectors are split evenly among their members instead: a null
//! member score, a negative member score, or a score sum that is ≤ 0 or not
//! finite. Tickers without a sector mapping are left out and listed in
//! `DayAllocation::unmapped`.
//!
//! Sectors appear in first-seen order of the ranked input; rows within a
//! sector keep rank order.

use crate::domain::{Allocation, Company, RankedSignal};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ticker → sector lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectorMap {
    sectors: HashMap<String, String>,
}

impl SectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_companies(companies: &[Company]) -> Self {
        companies
            .iter()
            .map(|c| (c.ticker.clone(), c.sector.clone()))
            .collect()
    }

    pub fn insert(&mut self, ticker: impl Into<String>, sector: impl Into<String>) {
        self.sectors.insert(ticker.into(), sector.into());
    }

    pub fn sector_of(&self, ticker: &str) -> Option<&str> {
        self.sectors.get(ticker).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }
}

impl FromIterator<(String, String)> for SectorMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            sectors: iter.into_iter().collect(),
        }
    }
}

/// One day's allocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayAllocation {
    pub date: Option<NaiveDate>,
    pub allocations: Vec<Allocation>,
    /// BUY candidates dropped for lack of a sector mapping.
    pub unmapped: Vec<String>,
    /// Sectors that fell back to an even split.
    pub even_split_sectors: Vec<String>,
}

/// Currency amount for one allocated position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalAmount {
    pub ticker: String,
    pub date: NaiveDate,
    pub sector: String,
    pub amount: f64,
}

impl DayAllocation {
    pub fn total_pct(&self) -> f64 {
        self.allocations.iter().map(|a| a.allocation_pct).sum()
    }

    /// Sum of weights per sector, in sector order.
    pub fn sector_totals(&self) -> Vec<(String, f64)> {
        let mut totals: Vec<(String, f64)> = Vec::new();
        for a in &self.allocations {
            match totals.iter_mut().find(|(s, _)| *s == a.sector) {
                Some((_, total)) => *total += a.allocation_pct,
                None => totals.push((a.sector.clone(), a.allocation_pct)),
            }
        }
        totals
    }

    /// Convert weights into currency amounts for `capital`.
    pub fn capital_amounts(&self, capital: f64) -> Vec<CapitalAmount> {
        self.allocations
            .iter()
            .map(|a| CapitalAmount {
                ticker: a.ticker.clone(),
                date: a.date,
                sector: a.sector.clone(),
                amount: a.allocation_pct * capital,
            })
            .collect()
    }
}

/// Allocate one day's ranked candidates.
pub fn allocate_day(ranked: &[RankedSignal], sectors: &SectorMap) -> DayAllocation {
    let mut day = DayAllocation {
        date: ranked.first().map(|r| r.date),
        ..DayAllocation::default()
    };

    let mut groups: Vec<(&str, Vec<&RankedSignal>)> = Vec::new();
    for r in ranked {
        let Some(sector) = sectors.sector_of(&r.ticker) else {
            day.unmapped.push(r.ticker.clone());
            continue;
        };
        match groups.iter_mut().find(|(s, _)| *s == sector) {
            Some((_, members)) => members.push(r),
            None => groups.push((sector, vec![r])),
        }
    }
    if groups.is_empty() {
        return day;
    }

    let sector_weight = 1.0 / groups.len() as f64;
    for (sector, members) in groups {
        let weights = match proportional(&members) {
            Some(w) => w,
            None => {
                day.even_split_sectors.push(sector.to_string());
                vec![1.0 / members.len() as f64; members.len()]
            }
        };
        for (member, w) in members.into_iter().zip(weights) {
            day.allocations
                .push(Allocation::new(member, sector, w * sector_weight));
        }
    }
    day
}

/// Allocate a multi-day ranked stream, one `DayAllocation` per date.
pub fn allocate_by_day(ranked: &[RankedSignal], sectors: &SectorMap) -> Vec<DayAllocation> {
    let mut days: BTreeMap<NaiveDate, Vec<RankedSignal>> = BTreeMap::new();
    for r in ranked {
        days.entry(r.date).or_default().push(r.clone());
    }
    days.values().map(|day| allocate_day(day, sectors)).collect()
}

/// Score-proportional shares within a sector, or `None` when degenerate.
fn proportional(members: &[&RankedSignal]) -> Option<Vec<f64>> {
    let scores: Vec<f64> = members
        .iter()
        .map(|m| m.score.filter(|s| s.is_finite() && *s >= 0.0))
        .collect::<Option<_>>()?;
    let sum: f64 = scores.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return None;
    }
    Some(scores.iter().map(|s| s / sum).collect())
}
