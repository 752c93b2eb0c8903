//! Bar source port: the trading terminal as seen by the range pipeline.

use crate::domain::bar::RawBar;
use crate::domain::error::RangeError;

pub trait BarSource {
    /// Last `count` bars for `broker_symbol`, oldest first, stamped in broker
    /// wall-clock epoch seconds.
    ///
    /// An unknown symbol, an empty result or a transport failure are all
    /// reported as [`RangeError::SourceUnavailable`].
    fn fetch_bars(
        &self,
        broker_symbol: &str,
        timeframe_minutes: u32,
        count: usize,
    ) -> Result<Vec<RawBar>, RangeError>;

    /// Broker time of the latest tick, used to derive the broker's UTC offset.
    fn latest_tick_time(&self, _broker_symbol: &str) -> Result<Option<i64>, RangeError> {
        Ok(None)
    }
}
