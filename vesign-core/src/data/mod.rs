//! Price cache and universe metadata.

pub mod cache;
pub mod universe;

pub use cache::{CacheError, CacheMeta, PriceCache, UpsertSummary};
pub use universe::{Universe, UniverseError};
