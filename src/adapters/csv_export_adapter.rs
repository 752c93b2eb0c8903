//! CSV export of the latest sweep results.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::error::RangeError;
use crate::domain::merger::MergedRange;
use crate::domain::scanner::CandidateRange;
use crate::ports::export_port::RangeExportPort;

/// Writes `{symbol}_body_ranges.csv` and `{symbol}_merged_body_ranges.csv`
/// into a directory, replacing previous files.
pub struct CsvRangeExporter {
    dir: PathBuf,
}

impl CsvRangeExporter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn body_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}_body_ranges.csv"))
    }

    pub fn merged_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}_merged_body_ranges.csv"))
    }
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T], header: &[&str]) -> Result<(), RangeError> {
    let export_err = |e: csv::Error| RangeError::Export {
        reason: format!("{}: {}", path.display(), e),
    };
    let mut wtr = csv::Writer::from_path(path).map_err(export_err)?;
    if rows.is_empty() {
        wtr.write_record(header).map_err(export_err)?;
    }
    for row in rows {
        wtr.serialize(row).map_err(export_err)?;
    }
    wtr.flush()?;
    Ok(())
}

const BODY_HEADER: [&str; 12] = [
    "symbol",
    "start_time",
    "end_time",
    "start_label",
    "end_label",
    "top",
    "bottom",
    "mid",
    "range_value",
    "duration_bars",
    "start_idx",
    "end_idx",
];

impl RangeExportPort for CsvRangeExporter {
    fn write_ranges(
        &self,
        symbol: &str,
        body_ranges: &[CandidateRange],
        merged_ranges: &[MergedRange],
    ) -> Result<(), RangeError> {
        fs::create_dir_all(&self.dir)?;

        write_rows(&self.body_path(symbol), body_ranges, &BODY_HEADER)?;

        let mut merged_header = BODY_HEADER.to_vec();
        merged_header.push("member_count");
        write_rows(&self.merged_path(symbol), merged_ranges, &merged_header)?;

        debug!(
            symbol,
            body = body_ranges.len(),
            merged = merged_ranges.len(),
            dir = %self.dir.display(),
            "ranges exported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use tempfile::TempDir;

    fn candidate(start_idx: usize) -> CandidateRange {
        let t = FixedOffset::east_opt(10 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 7, 2, 9, 0, 0)
            .unwrap();
        CandidateRange {
            symbol: "XAUUSD".into(),
            start_time: t,
            end_time: t,
            start_label: "02-07-2024 09:00".into(),
            end_label: "02-07-2024 09:15".into(),
            top: 2331.5,
            bottom: 2330.25,
            mid: 2330.875,
            range_value: 1.25,
            duration_bars: 4,
            start_idx,
            end_idx: start_idx + 3,
        }
    }

    #[test]
    fn writes_both_files() {
        let dir = TempDir::new().unwrap();
        let exporter = CsvRangeExporter::new(dir.path().join("out"));
        let body = vec![candidate(0), candidate(1)];
        let merged = vec![MergedRange::from(&body[0])];

        exporter.write_ranges("XAUUSD", &body, &merged).unwrap();

        let body_csv = fs::read_to_string(exporter.body_path("XAUUSD")).unwrap();
        let lines: Vec<&str> = body_csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], BODY_HEADER.join(","));
        assert!(lines[1].starts_with("XAUUSD,2024-07-02T09:00:00+10:00,"));

        let merged_csv = fs::read_to_string(exporter.merged_path("XAUUSD")).unwrap();
        assert!(merged_csv.lines().next().unwrap().ends_with(",member_count"));
        assert!(merged_csv.lines().nth(1).unwrap().ends_with(",1"));
    }

    #[test]
    fn empty_results_still_write_headers() {
        let dir = TempDir::new().unwrap();
        let exporter = CsvRangeExporter::new(dir.path().to_path_buf());

        exporter.write_ranges("EURUSD", &[], &[]).unwrap();

        let body_csv = fs::read_to_string(exporter.body_path("EURUSD")).unwrap();
        assert_eq!(body_csv.trim_end(), BODY_HEADER.join(","));
    }

    #[test]
    fn rewrite_replaces_previous_rows() {
        let dir = TempDir::new().unwrap();
        let exporter = CsvRangeExporter::new(dir.path().to_path_buf());

        exporter
            .write_ranges("XAUUSD", &[candidate(0), candidate(1), candidate(2)], &[])
            .unwrap();
        exporter.write_ranges("XAUUSD", &[candidate(5)], &[]).unwrap();

        let body_csv = fs::read_to_string(exporter.body_path("XAUUSD")).unwrap();
        assert_eq!(body_csv.lines().count(), 2);
    }
}
