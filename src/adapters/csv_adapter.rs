//! CSV file bar source.
//!
//! Reads `{dir}/{broker_symbol}_{timeframe}.csv` files with a
//! `time,open,high,low,close` header, `time` in broker epoch seconds.

use crate::domain::bar::RawBar;
use crate::domain::error::RangeError;
use crate::ports::bar_source::BarSource;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvBarSource {
    base_path: PathBuf,
}

impl CsvBarSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, broker_symbol: &str, timeframe_minutes: u32) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", broker_symbol, timeframe_minutes))
    }
}

impl BarSource for CsvBarSource {
    fn fetch_bars(
        &self,
        broker_symbol: &str,
        timeframe_minutes: u32,
        count: usize,
    ) -> Result<Vec<RawBar>, RangeError> {
        let path = self.csv_path(broker_symbol, timeframe_minutes);
        let content = fs::read_to_string(&path).map_err(|e| {
            RangeError::source_unavailable(
                broker_symbol,
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for (line, result) in rdr.deserialize::<RawBar>().enumerate() {
            let bar = result.map_err(|e| {
                RangeError::source_unavailable(
                    broker_symbol,
                    format!("CSV parse error at row {}: {}", line + 1, e),
                )
            })?;
            bars.push(bar);
        }

        if bars.is_empty() {
            return Err(RangeError::source_unavailable(
                broker_symbol,
                format!("{} has no rows", path.display()),
            ));
        }

        bars.sort_by_key(|b| b.epoch_seconds);
        let skip = bars.len().saturating_sub(count);
        debug!(
            symbol = broker_symbol,
            rows = bars.len(),
            returned = bars.len() - skip,
            "read bars from csv"
        );
        Ok(bars.split_off(skip))
    }
}
