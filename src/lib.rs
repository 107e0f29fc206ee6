//! candlecache — cached historical candlestick (OHLCV) retrieval.
//!
//! Fetches klines from the Binance spot REST API and keeps a per
//! `(symbol, timeframe)` parquet cache, so overlapping requests only hit
//! the network for sub-ranges not yet cached.
//!
//! # Example
//!
//! ```rust,no_run
//! use candlecache::fetch_candlestick_data;
//! use chrono::{TimeZone, Utc};
//!
//! # async fn example() -> candlecache::Result<()> {
//! let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
//! let end = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
//!
//! let candles = fetch_candlestick_data("BTCUSDT", "1h", start, Some(end)).await?;
//! assert_eq!(candles.len(), 24);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod constants;
pub mod error;
pub mod models;
pub mod services;

pub use error::{Error, Result};
pub use models::{Candle, CandleSeries, SeriesKey, Timeframe};
pub use services::cache::CacheStore;
pub use services::candles::{fetch_candlestick_data, CandleFetcher};
