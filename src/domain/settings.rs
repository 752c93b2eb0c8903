//! Service settings assembled from configuration.

use chrono::FixedOffset;
use chrono_tz::Tz;
use std::path::PathBuf;

use crate::domain::bar::Timeframe;
use crate::domain::config_validation::{parse_timezone, validate_service_config};
use crate::domain::error::RangeError;
use crate::domain::merger::{MergeOrder, OverlapRule};
use crate::domain::request::{DEFAULT_BARS, DEFAULT_LOOKBACK, DEFAULT_TIMEFRAME_MINUTES};
use crate::domain::session::{DEFAULT_CONTINUOUS, DEFAULT_SESSION_TZ, SessionCalendar, utc_offset};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";

#[derive(Debug, Clone, PartialEq)]
pub struct RangeSettings {
    pub lookback: usize,
    pub step: usize,
    pub cache_ttl_secs: u64,
    pub merge_order: MergeOrder,
    pub overlap: OverlapRule,
}

impl Default for RangeSettings {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
            step: 1,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            merge_order: MergeOrder::Chronological,
            overlap: OverlapRule::Index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub timezone: Tz,
    pub continuous: Vec<String>,
    /// Fixed broker offset; `None` means detect from a live tick at startup.
    pub broker_offset_minutes: Option<i32>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_SESSION_TZ,
            continuous: DEFAULT_CONTINUOUS.iter().map(|s| s.to_string()).collect(),
            broker_offset_minutes: None,
        }
    }
}

impl SessionSettings {
    pub fn broker_offset(&self) -> Option<FixedOffset> {
        self.broker_offset_minutes
            .and_then(|m| FixedOffset::east_opt(m * 60))
    }

    /// Calendar for these settings; the offset falls back to UTC until detected.
    pub fn calendar(&self) -> SessionCalendar {
        SessionCalendar::new(
            self.broker_offset().unwrap_or_else(utc_offset),
            self.timezone,
            &self.continuous,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceSettings {
    Csv { dir: PathBuf },
    Bridge { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub timeframe: Timeframe,
    pub bars: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            timeframe: Timeframe::M5,
            bars: DEFAULT_BARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub session: SessionSettings,
    pub ranges: RangeSettings,
    pub source: SourceSettings,
    pub timeout_secs: u64,
    pub scheduler: SchedulerSettings,
    pub export_dir: Option<PathBuf>,
    pub listen: String,
}

impl ServiceSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RangeError> {
        validate_service_config(config)?;

        let timezone = match config.get_string("session", "timezone") {
            Some(tz) => parse_timezone(&tz)?,
            None => DEFAULT_SESSION_TZ,
        };
        let continuous = config
            .get_list("session", "continuous_symbols")
            .unwrap_or_else(|| DEFAULT_CONTINUOUS.iter().map(|s| s.to_string()).collect());
        let broker_offset_minutes = config
            .get_string("broker", "utc_offset_minutes")
            .map(|_| config.get_int("broker", "utc_offset_minutes", 0) as i32);

        let source = match config
            .get_string("broker", "source")
            .unwrap_or_else(|| "csv".to_string())
            .to_lowercase()
            .as_str()
        {
            "bridge" => SourceSettings::Bridge {
                url: config
                    .get_string("broker", "bridge_url")
                    .unwrap_or_default()
                    .trim()
                    .trim_end_matches('/')
                    .to_string(),
            },
            _ => SourceSettings::Csv {
                dir: PathBuf::from(
                    config
                        .get_string("broker", "csv_dir")
                        .unwrap_or_else(|| "data/bars".to_string()),
                ),
            },
        };

        let ranges = RangeSettings {
            lookback: config.get_int("ranges", "lookback", DEFAULT_LOOKBACK as i64) as usize,
            step: config.get_int("ranges", "step", 1) as usize,
            cache_ttl_secs: config.get_int("ranges", "cache_ttl_secs", DEFAULT_CACHE_TTL_SECS as i64)
                as u64,
            merge_order: config
                .get_string("ranges", "merge_order")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            overlap: config
                .get_string("ranges", "overlap")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        };

        let timeframe_minutes =
            config.get_int("scheduler", "timeframe", DEFAULT_TIMEFRAME_MINUTES as i64) as u32;
        let scheduler = SchedulerSettings {
            enabled: config.get_bool("scheduler", "enabled", true),
            interval_secs: config.get_int("scheduler", "interval_secs", 300) as u64,
            timeframe: Timeframe::from_minutes(timeframe_minutes).unwrap_or(Timeframe::M5),
            bars: config.get_int("scheduler", "bars", DEFAULT_BARS as i64) as usize,
        };

        Ok(Self {
            session: SessionSettings {
                timezone,
                continuous,
                broker_offset_minutes,
            },
            ranges,
            source,
            timeout_secs: config.get_int("broker", "timeout_secs", 10) as u64,
            scheduler,
            export_dir: config
                .get_string("export", "dir")
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
            listen: config
                .get_string("web", "listen")
                .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
        })
    }
}
