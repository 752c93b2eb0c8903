//! Overlap merging of candidate ranges.
//!
//! Candidates are chained greedily: each one is compared with the last member
//! added to the open group, not with the group's running envelope, so A-B and
//! B-C overlaps pull A, B and C into one range even when A and C are disjoint.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::domain::bar::round_price;
use crate::domain::scanner::CandidateRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRange {
    pub symbol: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub start_label: String,
    pub end_label: String,
    pub top: f64,
    pub bottom: f64,
    pub mid: f64,
    pub range_value: f64,
    /// Sum of member durations, not the span length.
    pub duration_bars: usize,
    pub start_idx: usize,
    pub end_idx: usize,
    pub member_count: usize,
}

/// How "overlapping" is decided between consecutive candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapRule {
    #[default]
    Index,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeOrder {
    #[default]
    Chronological,
    MostRecentFirst,
}

impl std::str::FromStr for OverlapRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "index" => Ok(OverlapRule::Index),
            "time" => Ok(OverlapRule::Time),
            other => Err(format!("unknown overlap rule '{other}' (expected index or time)")),
        }
    }
}

impl std::str::FromStr for MergeOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chronological" | "oldest_first" => Ok(MergeOrder::Chronological),
            "most_recent_first" | "newest_first" | "reverse" => Ok(MergeOrder::MostRecentFirst),
            other => Err(format!(
                "unknown merge order '{other}' (expected chronological or most_recent_first)"
            )),
        }
    }
}

impl OverlapRule {
    fn overlaps(self, last: &CandidateRange, next: &CandidateRange) -> bool {
        match self {
            OverlapRule::Index => last.start_idx <= next.start_idx && next.start_idx <= last.end_idx,
            OverlapRule::Time => {
                last.start_time <= next.start_time && next.start_time <= last.end_time
            }
        }
    }
}

impl From<&CandidateRange> for MergedRange {
    fn from(c: &CandidateRange) -> Self {
        Self {
            symbol: c.symbol.clone(),
            start_time: c.start_time,
            end_time: c.end_time,
            start_label: c.start_label.clone(),
            end_label: c.end_label.clone(),
            top: c.top,
            bottom: c.bottom,
            mid: c.mid,
            range_value: c.range_value,
            duration_bars: c.duration_bars,
            start_idx: c.start_idx,
            end_idx: c.end_idx,
            member_count: 1,
        }
    }
}

fn close_group(group: &[&CandidateRange]) -> MergedRange {
    let first = group[0];
    if group.len() == 1 {
        return MergedRange::from(first);
    }

    let mut merged = MergedRange::from(first);
    let mut latest = first;
    for c in &group[1..] {
        if c.end_time >= latest.end_time {
            latest = c;
        }
        merged.end_idx = merged.end_idx.max(c.end_idx);
        merged.top = merged.top.max(c.top);
        merged.bottom = merged.bottom.min(c.bottom);
        merged.duration_bars += c.duration_bars;
    }
    merged.end_time = latest.end_time;
    merged.end_label = latest.end_label.clone();
    merged.top = round_price(merged.top);
    merged.bottom = round_price(merged.bottom);
    merged.mid = round_price((merged.top + merged.bottom) / 2.0);
    merged.range_value = round_price(merged.top - merged.bottom);
    merged.member_count = group.len();
    merged
}

/// Merge chained overlapping candidates into consolidated ranges.
///
/// Input is sorted by `start_idx` (stable) before merging, so callers may pass
/// candidates in any order.
pub fn merge_ranges(
    candidates: &[CandidateRange],
    rule: OverlapRule,
    order: MergeOrder,
) -> Vec<MergedRange> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&CandidateRange> = candidates.iter().collect();
    sorted.sort_by_key(|c| c.start_idx);

    let mut merged = Vec::new();
    let mut group: Vec<&CandidateRange> = vec![sorted[0]];
    for &c in &sorted[1..] {
        let last = group[group.len() - 1];
        if rule.overlaps(last, c) {
            group.push(c);
        } else {
            merged.push(close_group(&group));
            group = vec![c];
        }
    }
    merged.push(close_group(&group));

    if order == MergeOrder::MostRecentFirst {
        merged.reverse();
    }
    merged
}
