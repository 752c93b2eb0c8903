//! Sliding-window consolidation range scanner.
//!
//! A window qualifies when the extent of its candle bodies (not wicks) fits
//! inside the instrument's band width, boundary inclusive.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::domain::bar::{round_price, Bar};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRange {
    pub symbol: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub start_label: String,
    pub end_label: String,
    pub top: f64,
    pub bottom: f64,
    pub mid: f64,
    pub range_value: f64,
    pub duration_bars: usize,
    pub start_idx: usize,
    pub end_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanParams {
    pub lookback: usize,
    pub band_width: f64,
    /// Hop between window starts. 1 slides, `lookback` tiles.
    pub step: usize,
}

impl ScanParams {
    pub fn sliding(lookback: usize, band_width: f64) -> Self {
        Self {
            lookback,
            band_width,
            step: 1,
        }
    }

    pub fn tiled(lookback: usize, band_width: f64) -> Self {
        Self {
            lookback,
            band_width,
            step: lookback,
        }
    }
}

/// Scan `bars` for windows whose body extent is within the band.
///
/// Returns candidates in ascending `start_idx` order. Fewer bars than the
/// lookback (or a zero lookback) yields no candidates.
pub fn find_body_ranges(bars: &[Bar], params: &ScanParams) -> Vec<CandidateRange> {
    let lookback = params.lookback;
    let n = bars.len();
    if lookback == 0 || n < lookback {
        return Vec::new();
    }
    let step = params.step.max(1);

    let mut out = Vec::new();
    let mut start = 0;
    while start + lookback <= n {
        let end = start + lookback - 1;
        let window = &bars[start..=end];

        let mut top = f64::NEG_INFINITY;
        let mut bottom = f64::INFINITY;
        for bar in window {
            top = top.max(bar.body_top());
            bottom = bottom.min(bar.body_bottom());
        }
        let body_range = top - bottom;

        if body_range <= params.band_width {
            let first = &bars[start];
            let last = &bars[end];
            out.push(CandidateRange {
                symbol: first.symbol.clone(),
                start_time: first.time.fixed_offset(),
                end_time: last.time.fixed_offset(),
                start_label: first.label.clone(),
                end_label: last.label.clone(),
                top: round_price(top),
                bottom: round_price(bottom),
                mid: round_price((top + bottom) / 2.0),
                range_value: round_price(body_range),
                duration_bars: lookback,
                start_idx: start,
                end_idx: end,
            });
        }
        start += step;
    }
    out
}
