//! Validated range computation requests.

use crate::domain::bar::Timeframe;
use crate::domain::error::RangeError;
use crate::domain::instrument::normalize_symbol;

pub const MAX_BARS: usize = 10_000;
pub const DEFAULT_SYMBOL: &str = "EURUSD";
pub const DEFAULT_TIMEFRAME_MINUTES: u32 = 5;
pub const DEFAULT_BARS: usize = 5520;
pub const DEFAULT_LOOKBACK: usize = 4;
/// Bars fetched per symbol by a quick scan when the caller does not say.
pub const DEFAULT_SCAN_BARS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct RangeRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: usize,
    pub lookback: usize,
    pub force_refresh: bool,
}

impl RangeRequest {
    /// Validate raw caller parameters. Nothing is fetched for a rejected request.
    ///
    /// A lookback longer than the bar count is accepted and yields no ranges.
    pub fn new(
        symbol: &str,
        timeframe_minutes: u32,
        bars: usize,
        lookback: usize,
        force_refresh: bool,
    ) -> Result<Self, RangeError> {
        let symbol = validate_symbol(symbol)?;
        let timeframe = parse_timeframe(timeframe_minutes)?;
        validate_bars(bars)?;
        if lookback == 0 {
            return Err(RangeError::invalid_parameter(
                "lookback",
                "lookback must be at least 1",
            ));
        }
        Ok(Self {
            symbol,
            timeframe,
            bars,
            lookback,
            force_refresh,
        })
    }
}

pub fn parse_timeframe(minutes: u32) -> Result<Timeframe, RangeError> {
    Timeframe::from_minutes(minutes).ok_or_else(|| {
        RangeError::invalid_parameter(
            "timeframe",
            "invalid timeframe, use one of 1, 5, 15, 30, 60, 240, 1440",
        )
    })
}

pub fn validate_bars(bars: usize) -> Result<(), RangeError> {
    if bars == 0 || bars > MAX_BARS {
        return Err(RangeError::invalid_parameter(
            "bars",
            format!("bars must be between 1 and {MAX_BARS}"),
        ));
    }
    Ok(())
}

/// Normalize and check a symbol: letters, digits and `._+-` only.
pub fn validate_symbol(symbol: &str) -> Result<String, RangeError> {
    let symbol = normalize_symbol(symbol);
    if symbol.is_empty() {
        return Err(RangeError::invalid_parameter(
            "symbol",
            "symbol must be a non-empty string",
        ));
    }
    let valid = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'));
    if !valid {
        return Err(RangeError::invalid_parameter("symbol", "invalid symbol format"));
    }
    Ok(symbol)
}
