//! OHLC bar representation and timeframes.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Display format used for bar and range timestamps.
pub const LABEL_FORMAT: &str = "%d-%m-%Y %H:%M";

/// Decimal places kept for every price emitted by the pipeline.
pub const PRICE_DECIMALS: i32 = 5;

/// A bar as delivered by the bar source: epoch seconds in broker wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    #[serde(rename = "time")]
    pub epoch_seconds: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A normalized bar in the session timezone.
#[derive(Debug, Clone)]
pub struct Bar {
    pub symbol: String,
    pub time: DateTime<Tz>,
    pub label: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// max(open, close)
    pub fn body_top(&self) -> f64 {
        self.open.max(self.close)
    }

    /// min(open, close)
    pub fn body_bottom(&self) -> f64 {
        self.open.min(self.close)
    }
}

/// Round a price to [`PRICE_DECIMALS`] places, half away from zero.
pub fn round_price(value: f64) -> f64 {
    let scale = 10f64.powi(PRICE_DECIMALS);
    (value * scale).round() / scale
}

/// Bar timeframes supported by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn minutes(self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|tf| tf.minutes() == minutes)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        f.write_str(name)
    }
}
