//! Serializable results returned by the range service.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::merger::MergedRange;
use crate::domain::scanner::CandidateRange;

/// One computed result for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeReport {
    pub symbol: String,
    /// Timeframe in minutes.
    pub timeframe: u32,
    pub bars: usize,
    pub lookback: usize,
    pub range_size: f64,
    /// Bars left after normalization and session filtering.
    pub bar_count: usize,
    pub body_ranges_count: usize,
    pub merged_ranges_count: usize,
    pub body_ranges: Vec<CandidateRange>,
    pub merged_ranges: Vec<MergedRange>,
    pub data_start: Option<String>,
    pub data_end: Option<String>,
}

impl RangeReport {
    /// Most recent merged range by position in the series.
    pub fn latest_range(&self) -> Option<&MergedRange> {
        self.merged_ranges.iter().max_by_key(|m| m.start_idx)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: Option<RangeReport>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RangeResponse {
    pub fn computed(report: RangeReport) -> Self {
        Self {
            success: true,
            report: Some(report),
            cached: false,
            cache_age_seconds: None,
            error: None,
        }
    }

    pub fn from_cache(report: RangeReport, age_seconds: f64) -> Self {
        Self {
            success: true,
            report: Some(report),
            cached: true,
            cache_age_seconds: Some(age_seconds),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            report: None,
            cached: false,
            cache_age_seconds: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntrySummary {
    pub key: String,
    pub symbol: String,
    pub timeframe: u32,
    pub bars: usize,
    pub lookback: usize,
    pub computed_at: DateTime<Utc>,
    pub age_seconds: f64,
    pub stale: bool,
    pub body_ranges_count: usize,
    pub merged_ranges_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub total_entries: usize,
    pub symbols: Vec<String>,
    pub entries: Vec<CacheEntrySummary>,
}

/// Per-symbol outcome of a quick scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSummary {
    pub symbol: String,
    pub success: bool,
    pub cached: bool,
    pub range_size: Option<f64>,
    pub body_ranges_count: usize,
    pub merged_ranges_count: usize,
    pub latest_range: Option<MergedRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanSummary {
    pub fn from_response(symbol: &str, response: &RangeResponse) -> Self {
        match &response.report {
            Some(report) if response.success => Self {
                symbol: symbol.to_string(),
                success: true,
                cached: response.cached,
                range_size: Some(report.range_size),
                body_ranges_count: report.body_ranges_count,
                merged_ranges_count: report.merged_ranges_count,
                latest_range: report.latest_range().cloned(),
                error: None,
            },
            _ => Self::failed(
                symbol,
                response
                    .error
                    .clone()
                    .unwrap_or_else(|| "no result".to_string()),
            ),
        }
    }

    pub fn failed(symbol: &str, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            success: false,
            cached: false,
            range_size: None,
            body_ranges_count: 0,
            merged_ranges_count: 0,
            latest_range: None,
            error: Some(error.into()),
        }
    }
}
