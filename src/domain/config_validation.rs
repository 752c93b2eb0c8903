//! Configuration validation.
//!
//! Validates every config field before the service starts.

use chrono_tz::Tz;

use crate::domain::bar::Timeframe;
use crate::domain::error::RangeError;
use crate::domain::merger::{MergeOrder, OverlapRule};
use crate::domain::request::MAX_BARS;
use crate::ports::config_port::ConfigPort;

pub fn validate_service_config(config: &dyn ConfigPort) -> Result<(), RangeError> {
    validate_timezone(config)?;
    validate_broker_offset(config)?;
    validate_source(config)?;
    validate_timeout(config)?;
    validate_lookback(config)?;
    validate_cache_ttl(config)?;
    validate_merge_options(config)?;
    validate_scheduler(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> RangeError {
    RangeError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

pub fn parse_timezone(value: &str) -> Result<Tz, RangeError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|_| invalid("session", "timezone", format!("unknown timezone '{}'", value.trim())))
}

fn validate_timezone(config: &dyn ConfigPort) -> Result<(), RangeError> {
    match config.get_string("session", "timezone") {
        Some(tz) => parse_timezone(&tz).map(|_| ()),
        None => Ok(()),
    }
}

fn validate_broker_offset(config: &dyn ConfigPort) -> Result<(), RangeError> {
    if config.get_string("broker", "utc_offset_minutes").is_none() {
        return Ok(());
    }
    let value = config.get_int("broker", "utc_offset_minutes", i64::MIN);
    if !(-14 * 60..=14 * 60).contains(&value) {
        return Err(invalid(
            "broker",
            "utc_offset_minutes",
            "utc_offset_minutes must be an integer between -840 and 840",
        ));
    }
    Ok(())
}

fn validate_source(config: &dyn ConfigPort) -> Result<(), RangeError> {
    let kind = config
        .get_string("broker", "source")
        .unwrap_or_else(|| "csv".to_string())
        .to_lowercase();
    match kind.as_str() {
        "csv" => Ok(()),
        "bridge" => match config.get_string("broker", "bridge_url") {
            Some(url) if !url.trim().is_empty() => Ok(()),
            _ => Err(RangeError::ConfigMissing {
                section: "broker".to_string(),
                key: "bridge_url".to_string(),
            }),
        },
        other => Err(invalid(
            "broker",
            "source",
            format!("unknown source '{other}' (expected csv or bridge)"),
        )),
    }
}

fn validate_timeout(config: &dyn ConfigPort) -> Result<(), RangeError> {
    if config.get_int("broker", "timeout_secs", 10) <= 0 {
        return Err(invalid("broker", "timeout_secs", "timeout_secs must be positive"));
    }
    Ok(())
}

fn validate_lookback(config: &dyn ConfigPort) -> Result<(), RangeError> {
    if config.get_int("ranges", "lookback", 4) < 1 {
        return Err(invalid("ranges", "lookback", "lookback must be at least 1"));
    }
    if config.get_int("ranges", "step", 1) < 1 {
        return Err(invalid("ranges", "step", "step must be at least 1"));
    }
    Ok(())
}

fn validate_cache_ttl(config: &dyn ConfigPort) -> Result<(), RangeError> {
    if config.get_int("ranges", "cache_ttl_secs", 300) <= 0 {
        return Err(invalid("ranges", "cache_ttl_secs", "cache_ttl_secs must be positive"));
    }
    Ok(())
}

fn validate_merge_options(config: &dyn ConfigPort) -> Result<(), RangeError> {
    if let Some(order) = config.get_string("ranges", "merge_order") {
        order
            .parse::<MergeOrder>()
            .map_err(|reason| invalid("ranges", "merge_order", reason))?;
    }
    if let Some(rule) = config.get_string("ranges", "overlap") {
        rule.parse::<OverlapRule>()
            .map_err(|reason| invalid("ranges", "overlap", reason))?;
    }
    Ok(())
}

fn validate_scheduler(config: &dyn ConfigPort) -> Result<(), RangeError> {
    if config.get_int("scheduler", "interval_secs", 300) <= 0 {
        return Err(invalid("scheduler", "interval_secs", "interval_secs must be positive"));
    }
    let tf = config.get_int("scheduler", "timeframe", 5);
    if u32::try_from(tf).ok().and_then(Timeframe::from_minutes).is_none() {
        return Err(invalid(
            "scheduler",
            "timeframe",
            "timeframe must be one of 1, 5, 15, 30, 60, 240, 1440",
        ));
    }
    let bars = config.get_int("scheduler", "bars", 5520);
    if bars < 1 || bars > MAX_BARS as i64 {
        return Err(invalid(
            "scheduler",
            "bars",
            format!("bars must be between 1 and {MAX_BARS}"),
        ));
    }
    Ok(())
}
