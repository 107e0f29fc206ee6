use std::fmt;

use crate::error::{Error, Result};
use crate::models::Timeframe;

/// Cache partition identity: one `(symbol, timeframe)` pair.
///
/// The key deterministically names the on-disk cache file, so `load` and
/// `save` never need an auxiliary index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    symbol: String,
    timeframe: Timeframe,
}

impl SeriesKey {
    /// Create a key, validating and upper-casing the symbol.
    pub fn new(symbol: &str, timeframe: Timeframe) -> Result<Self> {
        validate_symbol(symbol)?;
        Ok(Self {
            symbol: symbol.to_uppercase(),
            timeframe,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Cache file name for this key, e.g. `BTCUSDT_1h.parquet`.
    pub fn file_name(&self) -> String {
        format!("{}_{}.parquet", self.symbol, self.timeframe)
    }

    /// Parse a key back out of a cache file name produced by `file_name`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".parquet")?;
        let (symbol, interval) = stem.rsplit_once('_')?;
        let timeframe = interval.parse().ok()?;
        SeriesKey::new(symbol, timeframe).ok()
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.timeframe)
    }
}

/// Validate symbol format
fn validate_symbol(symbol: &str) -> Result<()> {
    if symbol.is_empty() {
        return Err(Error::InvalidSymbol("symbol cannot be empty".to_string()));
    }

    if symbol.len() > 20 {
        return Err(Error::InvalidSymbol("symbol too long".to_string()));
    }

    if !symbol.chars().all(|c| c.is_alphanumeric()) {
        return Err(Error::InvalidSymbol(format!(
            "invalid symbol format: {}. Only alphanumeric characters allowed",
            symbol
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_round_trip() {
        let key = SeriesKey::new("btcusdt", Timeframe::Hour1).unwrap();
        assert_eq!(key.symbol(), "BTCUSDT");
        assert_eq!(key.file_name(), "BTCUSDT_1h.parquet");

        let parsed = SeriesKey::from_file_name("BTCUSDT_1h.parquet").unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_from_file_name_rejects_garbage() {
        assert!(SeriesKey::from_file_name("BTCUSDT_1h.csv").is_none());
        assert!(SeriesKey::from_file_name("noseparator.parquet").is_none());
        assert!(SeriesKey::from_file_name("BTCUSDT_9x.parquet").is_none());
    }

    #[test]
    fn test_symbol_validation() {
        assert!(SeriesKey::new("BTCUSDT", Timeframe::Day1).is_ok());
        assert!(SeriesKey::new("BTC123", Timeframe::Day1).is_ok());

        assert!(SeriesKey::new("", Timeframe::Day1).is_err());
        assert!(SeriesKey::new("BTC-USDT", Timeframe::Day1).is_err());
        assert!(SeriesKey::new("BTC USDT", Timeframe::Day1).is_err());
    }
}
