//! Bar normalization: broker time to session time, and the trading-session filter.
//!
//! The broker stamps bars with its own wall clock at a fixed UTC offset. Bars
//! are re-zoned into the session timezone (DST-aware) and, for instruments that
//! do not trade around the clock, restricted to the trading week that runs from
//! Monday 08:00 to Saturday 06:55 local time.

use chrono::{Datelike, DateTime, FixedOffset, NaiveTime, Offset, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::HashSet;

use crate::domain::bar::{Bar, RawBar, LABEL_FORMAT};
use crate::domain::instrument::{normalize_symbol, strip_suffix};

/// Daily session opens at 08:00 local time (inclusive).
pub const SESSION_OPEN: (u32, u32) = (8, 0);

/// Daily session closes at 06:55 local time the next morning (inclusive).
pub const SESSION_CLOSE: (u32, u32) = (6, 55);

pub const DEFAULT_SESSION_TZ: Tz = chrono_tz::Australia::Sydney;

pub const DEFAULT_CONTINUOUS: [&str; 2] = ["BTCUSD", "ETHUSD"];

/// Offset detection rounds to this many minutes to absorb tick latency.
const OFFSET_GRANULARITY_MINUTES: i64 = 15;

fn session_open() -> NaiveTime {
    NaiveTime::from_hms_opt(SESSION_OPEN.0, SESSION_OPEN.1, 0).unwrap_or(NaiveTime::MIN)
}

fn session_close() -> NaiveTime {
    NaiveTime::from_hms_opt(SESSION_CLOSE.0, SESSION_CLOSE.1, 0).unwrap_or(NaiveTime::MIN)
}

/// True if a session-local timestamp falls inside the trading week.
pub fn in_trading_session<T: TimeZone>(time: &DateTime<T>) -> bool {
    let open = session_open();
    let close = session_close();
    let tod = time.time();

    let in_daily_window = tod >= open || tod <= close;
    match time.weekday() {
        Weekday::Sun => false,
        Weekday::Mon => tod >= open,
        Weekday::Sat => tod <= close,
        _ => in_daily_window,
    }
}

/// Derive the broker's UTC offset from a live tick stamped in broker wall-clock
/// time, compared against the current UTC time.
pub fn broker_offset_from_tick(tick_epoch_seconds: i64, now: DateTime<Utc>) -> FixedOffset {
    let diff_minutes = (tick_epoch_seconds - now.timestamp()) as f64 / 60.0;
    let rounded = (diff_minutes / OFFSET_GRANULARITY_MINUTES as f64).round() as i64
        * OFFSET_GRANULARITY_MINUTES;
    let rounded = rounded.clamp(-14 * 60, 14 * 60);
    FixedOffset::east_opt((rounded * 60) as i32).unwrap_or(utc_offset())
}

pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

#[derive(Debug, Clone)]
pub struct SessionCalendar {
    broker_offset: FixedOffset,
    session_tz: Tz,
    continuous: HashSet<String>,
}

impl Default for SessionCalendar {
    fn default() -> Self {
        Self::new(utc_offset(), DEFAULT_SESSION_TZ, DEFAULT_CONTINUOUS)
    }
}

impl SessionCalendar {
    pub fn new<I, S>(broker_offset: FixedOffset, session_tz: Tz, continuous: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let continuous = continuous
            .into_iter()
            .map(|s| strip_suffix(&normalize_symbol(s.as_ref())).to_string())
            .collect();
        Self {
            broker_offset,
            session_tz,
            continuous,
        }
    }

    pub fn broker_offset(&self) -> FixedOffset {
        self.broker_offset
    }

    pub fn session_tz(&self) -> Tz {
        self.session_tz
    }

    pub fn with_broker_offset(mut self, offset: FixedOffset) -> Self {
        self.broker_offset = offset;
        self
    }

    /// Continuous instruments trade 24x7 and skip the session filter.
    pub fn is_continuous(&self, symbol: &str) -> bool {
        self.continuous
            .contains(strip_suffix(&normalize_symbol(symbol)))
    }

    /// Interpret raw epoch seconds as broker wall-clock time and re-zone into
    /// the session timezone.
    pub fn to_session_time(&self, epoch_seconds: i64) -> Option<DateTime<Tz>> {
        let wall_clock = DateTime::from_timestamp(epoch_seconds, 0)?.naive_utc();
        let broker_time = self
            .broker_offset
            .from_local_datetime(&wall_clock)
            .single()?;
        Some(broker_time.with_timezone(&self.session_tz))
    }

    /// Convert, order, de-duplicate and session-filter raw bars for one symbol.
    ///
    /// Every surviving bar is tagged with `symbol`. Rows whose timestamp cannot
    /// be represented are dropped.
    pub fn normalize(&self, symbol: &str, raw: &[RawBar]) -> Vec<Bar> {
        let mut bars: Vec<Bar> = raw
            .iter()
            .filter_map(|r| {
                let time = self.to_session_time(r.epoch_seconds)?;
                Some(Bar {
                    symbol: symbol.to_string(),
                    label: time.format(LABEL_FORMAT).to_string(),
                    time,
                    open: r.open,
                    high: r.high,
                    low: r.low,
                    close: r.close,
                })
            })
            .collect();

        bars.sort_by_key(|b| b.time);
        bars.dedup_by_key(|b| b.time);

        if !self.is_continuous(symbol) {
            bars.retain(|b| in_trading_session(&b.time));
        }
        bars
    }
}
