//! Range service: fetch, normalize, scan, merge and cache.
//!
//! The service is synchronous. Callers on an async runtime run it on the
//! blocking pool. Recomputation of one cache key is serialized through a
//! per-key lock so concurrent requests for the same key trigger at most one
//! fetch; requests for different keys proceed in parallel.

use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::domain::bar::{Bar, Timeframe};
use crate::domain::error::RangeError;
use crate::domain::instrument::{normalize_symbol, InstrumentRegistry};
use crate::domain::merger::{merge_ranges, MergeOrder, MergedRange};
use crate::domain::report::{CacheEntrySummary, CacheStatus, RangeReport, RangeResponse, ScanSummary};
use crate::domain::request::{validate_symbol, RangeRequest};
use crate::domain::scanner::{find_body_ranges, CandidateRange, ScanParams};
use crate::domain::session::{broker_offset_from_tick, SessionCalendar};
use crate::domain::settings::RangeSettings;
use crate::ports::bar_source::BarSource;
use crate::ports::cache_port::{CacheEntry, CacheKey, CacheMetadata, CachePort};
use crate::ports::export_port::RangeExportPort;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Latest bulk-run result for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRanges {
    pub body_ranges: Vec<CandidateRange>,
    pub merged_ranges: Vec<MergedRange>,
    pub bar_count: usize,
    pub computed_at: DateTime<Utc>,
}

struct Computation {
    bars: Vec<Bar>,
    band_width: f64,
    body_ranges: Vec<CandidateRange>,
    merged_ranges: Vec<MergedRange>,
}

pub struct RangeService {
    source: Arc<dyn BarSource + Send + Sync>,
    cache: Arc<dyn CachePort + Send + Sync>,
    exporter: Option<Arc<dyn RangeExportPort + Send + Sync>>,
    registry: InstrumentRegistry,
    calendar: SessionCalendar,
    settings: RangeSettings,
    clock: Clock,
    key_locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    bulk: Mutex<BTreeMap<String, SymbolRanges>>,
    sweep_lock: Mutex<()>,
}

impl RangeService {
    pub fn new(
        source: Arc<dyn BarSource + Send + Sync>,
        cache: Arc<dyn CachePort + Send + Sync>,
    ) -> Self {
        Self {
            source,
            cache,
            exporter: None,
            registry: InstrumentRegistry::default(),
            calendar: SessionCalendar::default(),
            settings: RangeSettings::default(),
            clock: Arc::new(Utc::now),
            key_locks: Mutex::new(HashMap::new()),
            bulk: Mutex::new(BTreeMap::new()),
            sweep_lock: Mutex::new(()),
        }
    }

    pub fn with_registry(mut self, registry: InstrumentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_calendar(mut self, calendar: SessionCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_settings(mut self, settings: RangeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn RangeExportPort + Send + Sync>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    pub fn calendar(&self) -> &SessionCalendar {
        &self.calendar
    }

    pub fn settings(&self) -> &RangeSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.clone()).or_default().clone()
    }

    /// Forget the lock for `key` once no other caller holds or waits on it.
    fn release_key_lock(&self, key: &CacheKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    fn compute(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bars: usize,
        lookback: usize,
        order: MergeOrder,
    ) -> Result<Computation, RangeError> {
        let broker_symbol = self.registry.broker_symbol(symbol);
        let raw = self
            .source
            .fetch_bars(&broker_symbol, timeframe.minutes(), bars)?;
        if raw.is_empty() {
            return Err(RangeError::source_unavailable(symbol, "source returned no bars"));
        }

        let normalized = self.calendar.normalize(symbol, &raw);
        let band_width = self.registry.get_band_width(symbol);
        if normalized.len() < lookback {
            debug!(
                symbol,
                bars = normalized.len(),
                lookback,
                "not enough session bars for a single window"
            );
        }

        let params = ScanParams {
            lookback,
            band_width,
            step: self.settings.step,
        };
        let body_ranges = find_body_ranges(&normalized, &params);
        let merged_ranges = merge_ranges(&body_ranges, self.settings.overlap, order);
        debug!(
            symbol,
            %timeframe,
            raw = raw.len(),
            session_bars = normalized.len(),
            body = body_ranges.len(),
            merged = merged_ranges.len(),
            "ranges computed"
        );

        Ok(Computation {
            bars: normalized,
            band_width,
            body_ranges,
            merged_ranges,
        })
    }

    fn report_from_entry(entry: &CacheEntry) -> RangeReport {
        RangeReport {
            symbol: entry.key.symbol.clone(),
            timeframe: entry.key.timeframe.minutes(),
            bars: entry.key.bars,
            lookback: entry.metadata.lookback,
            range_size: entry.metadata.band_width,
            bar_count: entry.metadata.bar_count,
            body_ranges_count: entry.body_ranges.len(),
            merged_ranges_count: entry.merged_ranges.len(),
            body_ranges: entry.body_ranges.clone(),
            merged_ranges: entry.merged_ranges.clone(),
            data_start: entry.metadata.data_start.clone(),
            data_end: entry.metadata.data_end.clone(),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, lookback: usize, now: DateTime<Utc>) -> bool {
        entry.metadata.lookback == lookback
            && entry.age_seconds(now) < self.settings.cache_ttl_secs as f64
    }

    /// Serve a request from the cache when possible, otherwise run the
    /// pipeline and store the result.
    pub fn calculate(&self, request: &RangeRequest) -> Result<RangeResponse, RangeError> {
        let key = CacheKey::new(request.symbol.clone(), request.timeframe, request.bars);
        let lock = self.key_lock(&key);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.calculate_locked(&key, request)
        };
        self.release_key_lock(&key, lock);
        result
    }

    fn calculate_locked(
        &self,
        key: &CacheKey,
        request: &RangeRequest,
    ) -> Result<RangeResponse, RangeError> {
        if !request.force_refresh {
            if let Some(entry) = self.cache.get(key) {
                let now = self.now();
                if self.is_fresh(&entry, request.lookback, now) {
                    debug!(%key, "cache hit");
                    return Ok(RangeResponse::from_cache(
                        Self::report_from_entry(&entry),
                        entry.age_seconds(now),
                    ));
                }
                debug!(%key, "cache entry stale or computed with another lookback");
            }
        }

        let computation = self.compute(
            &request.symbol,
            request.timeframe,
            request.bars,
            request.lookback,
            self.settings.merge_order,
        )?;
        let entry = CacheEntry {
            key: key.clone(),
            computed_at: self.now(),
            metadata: CacheMetadata {
                lookback: request.lookback,
                band_width: computation.band_width,
                bar_count: computation.bars.len(),
                data_start: computation.bars.first().map(|b| b.time.fixed_offset().to_rfc3339()),
                data_end: computation.bars.last().map(|b| b.time.fixed_offset().to_rfc3339()),
            },
            body_ranges: computation.body_ranges,
            merged_ranges: computation.merged_ranges,
        };
        let report = Self::report_from_entry(&entry);
        self.cache.put(entry);
        info!(
            %key,
            body = report.body_ranges_count,
            merged = report.merged_ranges_count,
            "ranges recalculated"
        );
        Ok(RangeResponse::computed(report))
    }

    /// Like [`RangeService::calculate`], with failures folded into an
    /// unsuccessful response.
    pub fn fetch_and_calculate_ranges(&self, request: &RangeRequest) -> RangeResponse {
        match self.calculate(request) {
            Ok(response) => response,
            Err(e) => {
                warn!(symbol = %request.symbol, error = %e, "range calculation failed");
                RangeResponse::failure(e.to_string())
            }
        }
    }

    /// Read a cached result without recomputing. Stale entries are served
    /// with their age.
    pub fn get_cached(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bars: usize,
    ) -> Result<RangeResponse, RangeError> {
        let symbol = validate_symbol(symbol)?;
        let key = CacheKey::new(symbol, timeframe, bars);
        let entry = self
            .cache
            .get(&key)
            .ok_or_else(|| RangeError::not_found(format!("no cached ranges for {key}")))?;
        Ok(RangeResponse::from_cache(
            Self::report_from_entry(&entry),
            entry.age_seconds(self.now()),
        ))
    }

    pub fn cache_status(&self) -> CacheStatus {
        let now = self.now();
        let mut entries: Vec<CacheEntrySummary> = self
            .cache
            .entries()
            .iter()
            .map(|e| {
                let age = e.age_seconds(now);
                CacheEntrySummary {
                    key: e.key.to_string(),
                    symbol: e.key.symbol.clone(),
                    timeframe: e.key.timeframe.minutes(),
                    bars: e.key.bars,
                    lookback: e.metadata.lookback,
                    computed_at: e.computed_at,
                    age_seconds: age,
                    stale: age >= self.settings.cache_ttl_secs as f64,
                    body_ranges_count: e.body_ranges.len(),
                    merged_ranges_count: e.merged_ranges.len(),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let symbols: BTreeSet<String> = entries.iter().map(|e| e.symbol.clone()).collect();
        CacheStatus {
            total_entries: entries.len(),
            symbols: symbols.into_iter().collect(),
            entries,
        }
    }

    /// Drop cache entries for symbols starting with `symbol`, or all entries.
    pub fn clear_cache(&self, symbol: Option<&str>) -> usize {
        let prefix = symbol.map(normalize_symbol).filter(|s| !s.is_empty());
        let removed = self.cache.clear(prefix.as_deref());
        info!(prefix = prefix.as_deref().unwrap_or("*"), removed, "cache cleared");
        removed
    }

    /// Run the pipeline for every registered instrument, newest range first.
    ///
    /// Failures are logged and reported as a bar count of 0, and drop that
    /// symbol's results from the previous run. The run always covers the whole
    /// registry. Concurrent calls run one after another.
    pub fn fetch_all_symbols_data(
        &self,
        timeframe: Timeframe,
        bars: usize,
    ) -> BTreeMap<String, usize> {
        let _sweep = self.sweep_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let lookback = self.settings.lookback;
        let mut counts = BTreeMap::new();

        for instrument in self.registry.instruments() {
            let key = instrument.key.as_str();
            let computation =
                match self.compute(key, timeframe, bars, lookback, MergeOrder::MostRecentFirst) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(symbol = key, error = %e, "sweep skipped symbol");
                        counts.insert(key.to_string(), 0);
                        self.bulk
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(key);
                        continue;
                    }
                };

            if let Some(exporter) = &self.exporter {
                if let Err(e) =
                    exporter.write_ranges(key, &computation.body_ranges, &computation.merged_ranges)
                {
                    warn!(symbol = key, error = %e, "range export failed");
                }
            }

            counts.insert(key.to_string(), computation.bars.len());
            let ranges = SymbolRanges {
                bar_count: computation.bars.len(),
                body_ranges: computation.body_ranges,
                merged_ranges: computation.merged_ranges,
                computed_at: self.now(),
            };
            self.bulk
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), ranges);
        }

        let ok = counts.values().filter(|&&n| n > 0).count();
        info!(%timeframe, bars, symbols = counts.len(), ok, "sweep finished");
        counts
    }

    fn bulk_key(&self, symbol: &str) -> String {
        self.registry
            .resolve(symbol)
            .map(|i| i.key.clone())
            .unwrap_or_else(|| normalize_symbol(symbol))
    }

    fn bulk_lookup<T>(
        &self,
        symbol: Option<&str>,
        pick: impl Fn(&SymbolRanges) -> T,
    ) -> Result<BTreeMap<String, T>, RangeError> {
        let bulk = self.bulk.lock().unwrap_or_else(PoisonError::into_inner);
        match symbol {
            None => Ok(bulk.iter().map(|(k, v)| (k.clone(), pick(v))).collect()),
            Some(symbol) => {
                let key = self.bulk_key(symbol);
                let ranges = bulk
                    .get(&key)
                    .ok_or_else(|| RangeError::not_found(format!("no ranges for {key}")))?;
                Ok(BTreeMap::from([(key, pick(ranges))]))
            }
        }
    }

    /// Body ranges of the latest sweep, for one symbol or all of them.
    pub fn get_calculated_ranges(
        &self,
        symbol: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<CandidateRange>>, RangeError> {
        self.bulk_lookup(symbol, |r| r.body_ranges.clone())
    }

    /// Merged ranges of the latest sweep, for one symbol or all of them.
    pub fn get_merged_ranges(
        &self,
        symbol: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<MergedRange>>, RangeError> {
        self.bulk_lookup(symbol, |r| r.merged_ranges.clone())
    }

    /// Compute (or serve from cache) several symbols and summarize each.
    pub fn quick_scan(
        &self,
        symbols: &[String],
        timeframe_minutes: u32,
        bars: usize,
        lookback: usize,
    ) -> Vec<ScanSummary> {
        symbols
            .iter()
            .map(|symbol| {
                match RangeRequest::new(symbol, timeframe_minutes, bars, lookback, false) {
                    Ok(request) => ScanSummary::from_response(
                        &request.symbol,
                        &self.fetch_and_calculate_ranges(&request),
                    ),
                    Err(e) => ScanSummary::failed(symbol, e.to_string()),
                }
            })
            .collect()
    }
}

/// Ask the source for a live tick and derive the broker's UTC offset from it.
///
/// Instruments are tried in registry order; `None` when no tick is available.
pub fn detect_broker_offset(
    source: &dyn BarSource,
    registry: &InstrumentRegistry,
    now: DateTime<Utc>,
) -> Option<FixedOffset> {
    for instrument in registry.instruments() {
        match source.latest_tick_time(&instrument.broker_symbol) {
            Ok(Some(tick)) => {
                let offset = broker_offset_from_tick(tick, now);
                info!(symbol = %instrument.broker_symbol, %offset, "broker offset detected");
                return Some(offset);
            }
            Ok(None) => continue,
            Err(e) => {
                debug!(symbol = %instrument.broker_symbol, error = %e, "no tick");
            }
        }
    }
    warn!("could not detect broker offset from a live tick");
    None
}
