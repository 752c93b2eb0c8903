//! Result cache port.

use chrono::{DateTime, Utc};

use crate::domain::bar::Timeframe;
use crate::domain::merger::MergedRange;
use crate::domain::scanner::CandidateRange;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: usize,
}

impl CacheKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, bars: usize) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            bars,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.symbol, self.timeframe.minutes(), self.bars)
    }
}

/// Parameters and data bounds a cached computation was produced with.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMetadata {
    pub lookback: usize,
    pub band_width: f64,
    pub bar_count: usize,
    pub data_start: Option<String>,
    pub data_end: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub computed_at: DateTime<Utc>,
    pub body_ranges: Vec<CandidateRange>,
    pub merged_ranges: Vec<MergedRange>,
    pub metadata: CacheMetadata,
}

impl CacheEntry {
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        (now - self.computed_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Keyed store of the latest computed ranges.
pub trait CachePort {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Insert or overwrite the entry for `entry.key`.
    fn put(&self, entry: CacheEntry);

    /// Remove entries whose symbol starts with `symbol_prefix`, or every entry
    /// when `None`. Returns the number removed.
    fn clear(&self, symbol_prefix: Option<&str>) -> usize;

    fn entries(&self) -> Vec<CacheEntry>;
}
