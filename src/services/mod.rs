pub mod binance;
pub mod cache;
pub mod candles;
pub mod fetcher;
pub mod merge;
pub mod reconcile;

pub use binance::{BinanceClient, BinanceError};
pub use cache::CacheStore;
pub use candles::{fetch_candlestick_data, CandleFetcher};
pub use merge::merge;
pub use reconcile::{reconcile, Coverage, MissingInterval, RequestedWindow};
