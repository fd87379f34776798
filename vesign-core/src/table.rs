//! In-memory derived table keyed by `(ticker, date)`.
//!
//! Writes follow the replace-the-window discipline: every existing row whose
//! date falls inside `[start, end]` is removed, then the incoming rows are
//! inserted. Rerunning a computation for the same range leaves the table
//! unchanged. Rows are kept sorted by `(ticker, date)` so serialized output
//! is stable.

use crate::domain::Dated;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct DatedTable<T> {
    rows: Vec<T>,
}

impl<T> Default for DatedTable<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T: Dated> DatedTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<T>) -> Self {
        let mut table = Self { rows };
        table.sort();
        table
    }

    /// Replace the window spanned by `incoming`'s own dates. Empty input is a
    /// no-op.
    pub fn replace_window(&mut self, incoming: Vec<T>) {
        let Some((start, end)) = date_span(&incoming) else {
            return;
        };
        self.replace_range(start, end, incoming);
    }

    /// Remove every row dated within `[start, end]`, then insert `incoming`.
    /// Incoming rows outside the range are inserted as well.
    pub fn replace_range(&mut self, start: NaiveDate, end: NaiveDate, incoming: Vec<T>) {
        self.rows.retain(|r| r.date() < start || r.date() > end);
        self.rows.extend(incoming);
        self.sort();
    }

    /// First and last date present.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        date_span(&self.rows)
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of one ticker, ascending by date.
    pub fn for_ticker<'a>(&'a self, ticker: &'a str) -> impl Iterator<Item = &'a T> + 'a {
        self.rows.iter().filter(move |r| r.ticker() == ticker)
    }

    fn sort(&mut self) {
        self.rows
            .sort_by(|a, b| (a.ticker(), a.date()).cmp(&(b.ticker(), b.date())));
    }
}

fn date_span<T: Dated>(rows: &[T]) -> Option<(NaiveDate, NaiveDate)> {
    let start = rows.iter().map(Dated::date).min()?;
    let end = rows.iter().map(Dated::date).max()?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Signal, SignalKind};

    fn sig(ticker: &str, day: u32, kind: SignalKind) -> Signal {
        Signal {
            ticker: ticker.into(),
            date: NaiveDate::from_ymd_opt(2024, 10, day).unwrap(),
            close: day as f64,
            signal: kind,
            score: None,
        }
    }

    #[test]
    fn replace_window_overwrites_only_the_span() {
        let mut table = DatedTable::from_rows(vec![
            sig("A", 1, SignalKind::Hold),
            sig("A", 2, SignalKind::Hold),
            sig("A", 3, SignalKind::Hold),
            sig("B", 2, SignalKind::Hold),
        ]);
        table.replace_window(vec![sig("A", 2, SignalKind::Buy), sig("A", 3, SignalKind::Sell)]);

        let kinds: Vec<_> = table
            .rows()
            .iter()
            .map(|s| (s.ticker.as_str(), s.date.format("%d").to_string(), s.signal))
            .collect();
        // B's row on day 2 lies inside the window and is gone.
        assert_eq!(
            kinds,
            vec![
                ("A", "01".to_string(), SignalKind::Hold),
                ("A", "02".to_string(), SignalKind::Buy),
                ("A", "03".to_string(), SignalKind::Sell),
            ]
        );
    }

    #[test]
    fn replacing_twice_is_idempotent() {
        let batch = vec![sig("A", 4, SignalKind::Buy), sig("B", 5, SignalKind::Hold)];
        let mut table = DatedTable::from_rows(vec![sig("A", 1, SignalKind::Hold)]);
        table.replace_window(batch.clone());
        let once = table.clone();
        table.replace_window(batch);
        assert_eq!(table, once);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn empty_incoming_is_noop_but_explicit_range_clears() {
        let mut table = DatedTable::from_rows(vec![sig("A", 1, SignalKind::Hold)]);
        table.replace_window(Vec::new());
        assert_eq!(table.len(), 1);

        let day = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        table.replace_range(day, day, Vec::new());
        assert!(table.is_empty());
        assert_eq!(table.span(), None);
    }

    #[test]
    fn rows_sorted_by_ticker_then_date() {
        let table = DatedTable::from_rows(vec![
            sig("B", 1, SignalKind::Hold),
            sig("A", 3, SignalKind::Hold),
            sig("A", 2, SignalKind::Hold),
        ]);
        let a: Vec<_> = table.for_ticker("A").map(|s| s.close).collect();
        assert_eq!(a, vec![2.0, 3.0]);
        assert_eq!(table.rows()[2].ticker, "B");
    }
}
