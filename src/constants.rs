//! Protocol and cache constants.

/// Application name, used for the per-user cache directory.
pub const APP_NAME: &str = "candlecache";

/// Environment variable overriding the cache directory location.
pub const CACHE_DIR_ENV: &str = "CANDLECACHE_DIR";

/// Binance spot REST API base URL.
pub const BINANCE_BASE_URL: &str = "https://api.binance.com";

/// Maximum candles per klines request (Binance protocol limit).
pub const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Client-side rate limit for unauthenticated kline requests.
pub const RATE_LIMIT_PER_SECOND: u32 = 5;

/// Maximum attempts per page request before the fetch is abandoned.
pub const MAX_RETRIES: u32 = 5;

/// Connect/read timeout for remote requests, in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;
