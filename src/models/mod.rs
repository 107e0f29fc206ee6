mod candle;
mod series_key;
mod timeframe;

pub use candle::Candle;
pub use series_key::SeriesKey;
pub use timeframe::Timeframe;

/// Time series data for a single series key
pub type CandleSeries = Vec<Candle>;
