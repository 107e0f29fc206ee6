//! Binance klines API client
//!
//! This module provides a client for fetching candlestick history from the
//! Binance spot REST API (`GET /api/v3/klines`).
//!
//! Features:
//! - Sliding-window rate limiting (5 calls/second)
//! - Exponential backoff retry logic for transient failures
//! - Distinguishes transient errors (network, 429/418, 5xx) from
//!   permanent ones (unknown symbol, invalid interval), which are never
//!   retried
//! - Base URL override for tests

use chrono::{DateTime, Utc};
use reqwest::{Client, Error as ReqwestError, StatusCode};
use serde::Deserialize;
use std::time::{Duration as StdDuration, Instant};
use tokio::sync::Mutex as TokioMutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::constants::{
    BINANCE_BASE_URL, HTTP_TIMEOUT_SECS, MAX_KLINES_PER_REQUEST, MAX_RETRIES,
    RATE_LIMIT_PER_SECOND,
};
use crate::models::{Candle, Timeframe};

/// Binance API error code for an unknown trading pair.
const CODE_INVALID_SYMBOL: i64 = -1121;

/// Binance API error code for an unsupported kline interval.
const CODE_INVALID_INTERVAL: i64 = -1120;

/// Binance klines client error types
#[derive(Debug)]
pub enum BinanceError {
    Http(ReqwestError),
    Serialization(serde_json::Error),
    InvalidSymbol(String),
    InvalidInterval(String),
    InvalidResponse(String),
    Exhausted(String),
}

impl From<ReqwestError> for BinanceError {
    fn from(error: ReqwestError) -> Self {
        BinanceError::Http(error)
    }
}

impl From<serde_json::Error> for BinanceError {
    fn from(error: serde_json::Error) -> Self {
        BinanceError::Serialization(error)
    }
}

impl std::fmt::Display for BinanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinanceError::Http(e) => write!(f, "HTTP error: {}", e),
            BinanceError::Serialization(e) => write!(f, "Serialization error: {}", e),
            BinanceError::InvalidSymbol(s) => write!(f, "Invalid symbol: {}", s),
            BinanceError::InvalidInterval(s) => write!(f, "Invalid interval: {}", s),
            BinanceError::InvalidResponse(s) => write!(f, "Invalid response: {}", s),
            BinanceError::Exhausted(s) => write!(f, "Retries exhausted: {}", s),
        }
    }
}

impl std::error::Error for BinanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BinanceError::Http(e) => Some(e),
            BinanceError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

/// One kline row as Binance returns it: a 12-element heterogeneous array.
///
/// Layout: open time (ms), open, high, low, close, volume, close time (ms),
/// quote asset volume, trade count, taker buy base volume, taker buy quote
/// volume, unused.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

impl RawKline {
    fn into_candle(self) -> Result<Candle, BinanceError> {
        let open_time = DateTime::from_timestamp_millis(self.0).ok_or_else(|| {
            BinanceError::InvalidResponse(format!("invalid open time: {}", self.0))
        })?;

        Ok(Candle {
            open_time,
            open: parse_price(&self.1, "open")?,
            high: parse_price(&self.2, "high")?,
            low: parse_price(&self.3, "low")?,
            close: parse_price(&self.4, "close")?,
            volume: parse_price(&self.5, "volume")?,
        })
    }
}

fn parse_price(value: &str, field: &str) -> Result<f64, BinanceError> {
    value.parse().map_err(|e| {
        BinanceError::InvalidResponse(format!("invalid {} value {:?}: {}", field, value, e))
    })
}

/// Error payload Binance attaches to 4xx responses.
#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

/// Binance klines client with rate limiting and retry logic
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limit_per_second: u32,
    request_stamps: TokioMutex<Vec<Instant>>,
}

impl BinanceClient {
    /// Create a client against the production Binance endpoint.
    pub fn new() -> Result<Self, BinanceError> {
        Self::with_base_url(BINANCE_BASE_URL)
    }

    /// Create a client against an arbitrary base URL (used by tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, BinanceError> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(BinanceError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limit_per_second: RATE_LIMIT_PER_SECOND,
            request_stamps: TokioMutex::new(Vec::new()),
        })
    }

    /// Enforce rate limiting using a sliding one-second window.
    async fn enforce_rate_limit(&self) {
        let wait = {
            let mut stamps = self.request_stamps.lock().await;
            let now = Instant::now();

            stamps.retain(|stamp| now.duration_since(*stamp) < StdDuration::from_secs(1));

            let wait = if stamps.len() >= self.rate_limit_per_second as usize {
                stamps.first().map(|oldest| {
                    StdDuration::from_secs(1)
                        .saturating_sub(now.duration_since(*oldest))
                        + StdDuration::from_millis(100)
                })
            } else {
                None
            };

            stamps.push(now);
            wait
        };

        if let Some(wait) = wait {
            debug!("Rate limit reached, waiting {:?}", wait);
            sleep(wait).await;
        }
    }

    /// Make a request with retry logic and exponential backoff.
    ///
    /// Transient failures (network errors, 429/418, 5xx) are retried up to
    /// `MAX_RETRIES` times; permanent failures return immediately.
    async fn make_request(&self, url: &str) -> Result<Vec<RawKline>, BinanceError> {
        let mut last_failure = String::from("no attempt made");

        for attempt in 0..MAX_RETRIES {
            self.enforce_rate_limit().await;

            if attempt > 0 {
                let delay = StdDuration::from_secs_f64(
                    2.0_f64.powi(attempt as i32 - 1) + rand::random::<f64>(),
                );
                let delay = delay.min(StdDuration::from_secs(60));
                debug!(
                    "Retry backoff: attempt {}/{}, waiting {:.1}s",
                    attempt + 1,
                    MAX_RETRIES,
                    delay.as_secs_f64()
                );
                sleep(delay).await;
            }

            let response = match self.client.get(url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("Request failed (attempt {}): {}", attempt + 1, e);
                    last_failure = e.to_string();
                    continue;
                }
            };

            let status = response.status();

            if status.is_success() {
                let body = match response.text().await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to read response body (attempt {}): {}", attempt + 1, e);
                        last_failure = e.to_string();
                        continue;
                    }
                };

                return serde_json::from_str::<Vec<RawKline>>(&body).map_err(|e| {
                    let preview = if body.len() > 500 {
                        format!("{}... (truncated)", &body[..500])
                    } else {
                        body.clone()
                    };
                    warn!("Unexpected klines payload: {}", preview);
                    BinanceError::InvalidResponse(format!("malformed klines payload: {}", e))
                });
            } else if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
                // 418 is Binance's auto-ban escalation of 429
                warn!("Rate limited by remote ({}), retrying...", status);
                last_failure = format!("HTTP {}", status);
                continue;
            } else if status.is_server_error() {
                warn!("Server error ({}), retrying...", status);
                last_failure = format!("HTTP {}", status);
                continue;
            } else {
                // Client errors are permanent; surface the API error code
                let body = response.text().await.unwrap_or_default();
                if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                    return Err(match api_error.code {
                        CODE_INVALID_SYMBOL => BinanceError::InvalidSymbol(api_error.msg),
                        CODE_INVALID_INTERVAL => BinanceError::InvalidInterval(api_error.msg),
                        _ => BinanceError::InvalidResponse(format!(
                            "HTTP {}: {} (code {})",
                            status, api_error.msg, api_error.code
                        )),
                    });
                }
                return Err(BinanceError::InvalidResponse(format!("HTTP {}", status)));
            }
        }

        Err(BinanceError::Exhausted(format!(
            "{} attempts failed, last: {}",
            MAX_RETRIES, last_failure
        )))
    }

    /// Fetch up to `limit` candles starting at `start_time`.
    ///
    /// # Arguments
    ///
    /// * `symbol` - Trading pair symbol (e.g., "BTCUSDT")
    /// * `timeframe` - Candle timeframe
    /// * `start_time` - First candle open time to request (inclusive)
    /// * `limit` - Maximum rows, capped at the protocol limit of 1000
    ///
    /// # Returns
    ///
    /// Candles in the order the exchange returned them (ascending by open
    /// time for a well-behaved endpoint). An empty vector means no data is
    /// available at or after `start_time`.
    pub async fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_time: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Candle>, BinanceError> {
        let limit = limit.min(MAX_KLINES_PER_REQUEST);
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}&limit={}",
            self.base_url,
            symbol,
            timeframe.to_interval_string(),
            start_time.timestamp_millis(),
            limit
        );

        debug!("Fetching klines: {}", url);

        let raw = self.make_request(&url).await?;

        let mut candles = Vec::with_capacity(raw.len());
        for kline in raw {
            candles.push(kline.into_candle()?);
        }

        debug!(
            "Fetched {} candles for {} ({}) from {}",
            candles.len(),
            symbol,
            timeframe,
            start_time
        );

        Ok(candles)
    }
}
