//! Instrument registry: symbol keys, broker tickers and band widths.
//!
//! Broker tickers carry a trailing `+` on some accounts and not on others, so
//! lookups go through an ordered list of resolution strategies rather than a
//! single exact match.

use serde::Serialize;

/// Band width used when a symbol matches no registry entry.
pub const DEFAULT_BAND_WIDTH: f64 = 1.0;

/// Non-semantic suffix the broker appends to some tickers.
pub const BROKER_SUFFIX: char = '+';

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instrument {
    pub key: String,
    pub broker_symbol: String,
    pub band_width: f64,
}

impl Instrument {
    pub fn new(key: &str, broker_symbol: &str, band_width: f64) -> Self {
        Self {
            key: key.to_string(),
            broker_symbol: broker_symbol.to_string(),
            band_width,
        }
    }
}

/// Upper-case and trim a caller-supplied symbol.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Remove trailing broker suffix characters.
pub fn strip_suffix(symbol: &str) -> &str {
    symbol.trim_end_matches(BROKER_SUFFIX)
}

type Strategy = fn(&InstrumentRegistry, &str) -> Option<usize>;

#[derive(Debug, Clone)]
pub struct InstrumentRegistry {
    instruments: Vec<Instrument>,
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new(vec![
            Instrument::new("XAUUSD", "XAUUSD+", 1.5),
            Instrument::new("BTCUSD", "BTCUSD", 50.0),
            Instrument::new("ETHUSD", "ETHUSD", 5.0),
            Instrument::new("NAS100", "NAS100", 5.0),
            Instrument::new("GBPUSD", "GBPUSD+", 0.00030),
            Instrument::new("EURUSD", "EURUSD+", 0.00030),
            Instrument::new("USDJPY", "USDJPY+", 0.003),
        ])
    }
}

impl InstrumentRegistry {
    const STRATEGIES: [Strategy; 4] = [
        Self::exact,
        Self::without_suffix,
        Self::with_suffix,
        Self::stripped_scan,
    ];

    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self { instruments }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Registry keys in table order.
    pub fn keys(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn resolve(&self, symbol: &str) -> Option<&Instrument> {
        let symbol = normalize_symbol(symbol);
        Self::STRATEGIES
            .iter()
            .find_map(|strategy| strategy(self, &symbol))
            .map(|idx| &self.instruments[idx])
    }

    pub fn get_band_width(&self, symbol: &str) -> f64 {
        self.resolve(symbol)
            .map(|i| i.band_width)
            .unwrap_or(DEFAULT_BAND_WIDTH)
    }

    /// Ticker to request from the broker; unknown symbols pass through as given.
    pub fn broker_symbol(&self, symbol: &str) -> String {
        self.resolve(symbol)
            .map(|i| i.broker_symbol.clone())
            .unwrap_or_else(|| normalize_symbol(symbol))
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.instruments.iter().position(|i| i.key == key)
    }

    fn exact(&self, symbol: &str) -> Option<usize> {
        self.position(symbol)
    }

    fn without_suffix(&self, symbol: &str) -> Option<usize> {
        self.position(strip_suffix(symbol))
    }

    fn with_suffix(&self, symbol: &str) -> Option<usize> {
        self.position(&format!("{}{}", strip_suffix(symbol), BROKER_SUFFIX))
    }

    fn stripped_scan(&self, symbol: &str) -> Option<usize> {
        let base = strip_suffix(symbol);
        self.instruments
            .iter()
            .position(|i| strip_suffix(&i.key) == base)
    }
}
