#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rangescan::adapters::memory_cache::InMemoryCache;
pub use rangescan::domain::bar::RawBar;
use rangescan::domain::error::RangeError;
use rangescan::domain::pipeline::{Clock, RangeService};
use rangescan::domain::session::{utc_offset, SessionCalendar};
use rangescan::ports::bar_source::BarSource;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

/// In-memory bar source keyed by broker symbol.
pub struct MockBarSource {
    pub data: HashMap<String, Vec<RawBar>>,
    pub errors: HashMap<String, String>,
    pub fetches: AtomicUsize,
    pub offline: AtomicBool,
}

impl MockBarSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        }
    }

    pub fn with_bars(mut self, broker_symbol: &str, bars: Vec<RawBar>) -> Self {
        self.data.insert(broker_symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, broker_symbol: &str, reason: &str) -> Self {
        self.errors
            .insert(broker_symbol.to_string(), reason.to_string());
        self
    }

    /// While offline every fetch fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl BarSource for MockBarSource {
    fn fetch_bars(
        &self,
        broker_symbol: &str,
        _timeframe_minutes: u32,
        count: usize,
    ) -> Result<Vec<RawBar>, RangeError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RangeError::source_unavailable(broker_symbol, "terminal offline"));
        }
        if let Some(reason) = self.errors.get(broker_symbol) {
            return Err(RangeError::source_unavailable(broker_symbol, reason.clone()));
        }
        let bars = self
            .data
            .get(broker_symbol)
            .ok_or_else(|| RangeError::source_unavailable(broker_symbol, "unknown symbol"))?;
        let skip = bars.len().saturating_sub(count);
        Ok(bars[skip..].to_vec())
    }
}

/// Broker clock at UTC, session clock at UTC, default continuous symbols.
pub fn test_calendar() -> SessionCalendar {
    SessionCalendar::new(utc_offset(), chrono_tz::UTC, ["BTCUSD", "ETHUSD"])
}

pub fn epoch(y: i32, m: u32, d: u32, h: u32, mi: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap().timestamp()
}

/// Bars with the given (open, close) bodies, `step_secs` apart.
pub fn bars_from_bodies(start: i64, step_secs: i64, bodies: &[(f64, f64)]) -> Vec<RawBar> {
    bodies
        .iter()
        .enumerate()
        .map(|(i, &(open, close))| RawBar {
            epoch_seconds: start + i as i64 * step_secs,
            open,
            high: open.max(close) + 0.2,
            low: open.min(close) - 0.2,
            close,
        })
        .collect()
}

pub fn flat_bars(start: i64, step_secs: i64, n: usize, price: f64) -> Vec<RawBar> {
    bars_from_bodies(start, step_secs, &vec![(price, price); n])
}

/// Twenty 5-minute bars from Tuesday 2024-07-02 09:00: quiet for 0-9, a
/// breakout for 10-14, quiet again for 15-19.
pub fn scenario_bars() -> Vec<RawBar> {
    let mut bodies = Vec::new();
    for i in 0..10 {
        bodies.push(if i % 2 == 0 { (100.0, 100.5) } else { (100.5, 100.0) });
    }
    for _ in 10..15 {
        bodies.push((101.0, 104.0));
    }
    for i in 15..20 {
        bodies.push(if i % 2 == 0 { (100.0, 100.5) } else { (100.5, 100.0) });
    }
    bars_from_bodies(epoch(2024, 7, 2, 9, 0), 300, &bodies)
}

/// A clock that only moves when told to.
pub struct ManualClock {
    base: DateTime<Utc>,
    offset_secs: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Utc.with_ymd_and_hms(2024, 7, 2, 12, 0, 0).unwrap(),
            offset_secs: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.offset_secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn clock(&self) -> Clock {
        let base = self.base;
        let offset = self.offset_secs.clone();
        Arc::new(move || base + chrono::Duration::seconds(offset.load(Ordering::SeqCst)))
    }
}

pub fn service_with(source: Arc<MockBarSource>) -> RangeService {
    RangeService::new(source, Arc::new(InMemoryCache::new())).with_calendar(test_calendar())
}
