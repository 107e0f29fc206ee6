//! Transparent cached candlestick retrieval.
//!
//! The single entry point composing reconcile → fetch → merge → save.
//! Callers receive exactly the requested window and cannot tell whether it
//! came from cache or network; the cache always holds the superset.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Candle, SeriesKey, Timeframe};
use crate::services::binance::BinanceClient;
use crate::services::cache::CacheStore;
use crate::services::fetcher::fetch_missing;
use crate::services::merge::merge;
use crate::services::reconcile::{reconcile, RequestedWindow};

/// Cached candle fetcher for one client + one cache directory.
pub struct CandleFetcher {
    client: BinanceClient,
    store: CacheStore,
    show_progress: bool,
    locks: Mutex<HashMap<SeriesKey, Arc<Mutex<()>>>>,
}

impl CandleFetcher {
    pub fn new(client: BinanceClient, store: CacheStore) -> Self {
        Self {
            client,
            store,
            show_progress: false,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Enable console progress bars during downloads.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Fetch `[start, end)` for a pair and timeframe, consulting and
    /// updating the local cache.
    ///
    /// Pass `end = None` to fetch up to the latest available candle. Any
    /// fetch or merge failure propagates with the previously cached series
    /// left untouched.
    pub async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>> {
        let key = SeriesKey::new(symbol, timeframe)?;
        // Validated before any I/O happens
        let window = RequestedWindow::new(start, end, timeframe)?;

        // One writer per series key within this process; the save itself
        // is an atomic rename, so other processes can only lose whole
        // writes, never corrupt the file.
        let lock = self.key_lock(&key).await;
        let _guard = lock.lock().await;

        let coverage = self.store.coverage(&key)?;
        let missing = reconcile(&window, coverage, timeframe);

        if missing.is_empty() {
            debug!("Cache hit for {}", key);
            let series = self.store.load(&key)?;
            return Ok(slice_window(series, &window));
        }

        info!("{} missing interval(s) for {}", missing.len(), key);

        let fetched = fetch_missing(&self.client, &key, &missing, self.show_progress).await?;
        let cached = self.store.load(&key)?;
        let merged = merge(cached, fetched, &key)?;

        if !merged.is_empty() {
            self.store.save(&key, &merged)?;
        }

        Ok(slice_window(merged, &window))
    }

    async fn key_lock(&self, key: &SeriesKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Slice the requested window out of a full series.
fn slice_window(series: Vec<Candle>, window: &RequestedWindow) -> Vec<Candle> {
    series
        .into_iter()
        .filter(|c| {
            c.open_time >= window.start() && window.end().map_or(true, |end| c.open_time < end)
        })
        .collect()
}

/// Fetch candlestick data for a symbol and timeframe, utilizing the
/// default local cache.
///
/// Convenience wrapper wiring the production Binance endpoint and the
/// default cache directory. Library users who need a custom endpoint or
/// cache location should construct a [`CandleFetcher`] directly.
pub async fn fetch_candlestick_data(
    symbol: &str,
    timeframe: &str,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<Candle>> {
    let timeframe: Timeframe = timeframe.parse()?;
    let client = BinanceClient::new()
        .map_err(|e| Error::Config(format!("failed to create Binance client: {}", e)))?;
    let store = CacheStore::new(CacheStore::default_dir()?)?;

    CandleFetcher::new(client, store)
        .fetch(symbol, timeframe, start, end)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(hour: u32) -> Candle {
        let t = Utc.with_ymd_and_hms(2023, 1, 1, hour, 0, 0).unwrap();
        Candle::new(t, 1.0, 1.0, 1.0, 1.0, 1.0)
    }

    #[test]
    fn test_slice_window_is_half_open() {
        let series: Vec<Candle> = (0..24).map(candle).collect();
        let window = RequestedWindow::new(
            Utc.with_ymd_and_hms(2023, 1, 1, 6, 0, 0).unwrap(),
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap()),
            Timeframe::Hour1,
        )
        .unwrap();

        let slice = slice_window(series, &window);

        assert_eq!(slice.len(), 6);
        assert_eq!(slice[0].open_time.timestamp() % 86400, 6 * 3600);
        assert_eq!(slice[5].open_time.timestamp() % 86400, 11 * 3600);
    }

    #[test]
    fn test_slice_window_open_end_keeps_tail() {
        let series: Vec<Candle> = (0..24).map(candle).collect();
        let window = RequestedWindow::new(
            Utc.with_ymd_and_hms(2023, 1, 1, 20, 0, 0).unwrap(),
            None,
            Timeframe::Hour1,
        )
        .unwrap();

        assert_eq!(slice_window(series, &window).len(), 4);
    }
}
