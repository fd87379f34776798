//! Domain types for Vesign.
//!
//! Every derived table is keyed by `(ticker, date)`; the `Dated` trait
//! exposes that key so integrity checks and window-replace tables can be
//! written once.

pub mod analyst;
pub mod bar;
pub mod feature;
pub mod prediction;
pub mod signal;
pub mod trade;

pub use analyst::{AnalystExpectation, Company};
pub use bar::{check_series, BarError, PriceBar};
pub use feature::FeatureRow;
pub use prediction::{FactorCoefficients, FactorWeights, Prediction};
pub use signal::{Allocation, RankedSignal, Signal, SignalKind};
pub use trade::{OpenPosition, Trade};

use chrono::NaiveDate;

/// Ticker symbol type alias.
pub type Ticker = String;

/// A row keyed by `(ticker, date)`.
pub trait Dated {
    fn ticker(&self) -> &str;
    fn date(&self) -> NaiveDate;
}

impl<T: Dated + ?Sized> Dated for &T {
    fn ticker(&self) -> &str {
        (**self).ticker()
    }

    fn date(&self) -> NaiveDate {
        (**self).date()
    }
}
