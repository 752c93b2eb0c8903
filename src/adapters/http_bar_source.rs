//! HTTP bar source talking to a terminal bridge.
//!
//! Bridge protocol:
//! - `GET {base}/rates?symbol=&timeframe=&count=` returns a JSON array of
//!   `{time, open, high, low, close}` objects, oldest first.
//! - `GET {base}/tick?symbol=` returns `{time}` for the latest tick.
//!
//! A 404 means the bridge does not know the symbol.

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::bar::RawBar;
use crate::domain::error::RangeError;
use crate::ports::bar_source::BarSource;

#[derive(Debug, Deserialize)]
struct Tick {
    time: i64,
}

pub struct HttpBarSource {
    base_url: String,
    client: Client,
}

impl HttpBarSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RangeError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            RangeError::ConfigInvalid {
                section: "broker".to_string(),
                key: "bridge_url".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            }
        })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        symbol: &str,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, RangeError> {
        let unavailable = |reason: String| RangeError::source_unavailable(symbol, reason);

        let response = self
            .client
            .get(self.url(endpoint))
            .query(query)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    unavailable(format!("bridge timed out on /{endpoint}"))
                } else {
                    unavailable(format!("bridge request failed: {e}"))
                }
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if !status.is_success() => {
                Err(unavailable(format!("bridge returned {status} on /{endpoint}")))
            }
            _ => response
                .json::<T>()
                .map(Some)
                .map_err(|e| unavailable(format!("invalid bridge response: {e}"))),
        }
    }
}

impl BarSource for HttpBarSource {
    fn fetch_bars(
        &self,
        broker_symbol: &str,
        timeframe_minutes: u32,
        count: usize,
    ) -> Result<Vec<RawBar>, RangeError> {
        let query = [
            ("symbol", broker_symbol.to_string()),
            ("timeframe", timeframe_minutes.to_string()),
            ("count", count.to_string()),
        ];
        let bars: Vec<RawBar> = self
            .get_json(broker_symbol, "rates", &query)?
            .ok_or_else(|| RangeError::source_unavailable(broker_symbol, "unknown symbol"))?;
        if bars.is_empty() {
            return Err(RangeError::source_unavailable(broker_symbol, "bridge returned no bars"));
        }
        debug!(symbol = broker_symbol, count = bars.len(), "bars received from bridge");
        Ok(bars)
    }

    fn latest_tick_time(&self, broker_symbol: &str) -> Result<Option<i64>, RangeError> {
        let tick: Option<Tick> =
            self.get_json(broker_symbol, "tick", &[("symbol", broker_symbol.to_string())])?;
        Ok(tick.map(|t| t.time))
    }
}
