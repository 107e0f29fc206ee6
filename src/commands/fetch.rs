//! `fetch` command: cached retrieval of one candlestick window.

use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::models::{Candle, Timeframe};
use crate::services::binance::BinanceClient;
use crate::services::cache::CacheStore;
use crate::services::candles::CandleFetcher;

/// Rows printed at each end of the console preview.
const PREVIEW_ROWS: usize = 5;

pub async fn run(
    symbol: String,
    timeframe: String,
    start: String,
    end: Option<String>,
    output: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
) -> Result<()> {
    let timeframe: Timeframe = timeframe.parse()?;
    let start = parse_time(&start)?;
    let end = end.as_deref().map(parse_time).transpose()?;

    let base_dir = match cache_dir {
        Some(dir) => dir,
        None => CacheStore::default_dir()?,
    };
    println!("Using cache directory: {}", base_dir.display());

    let store = CacheStore::new(base_dir)?;
    let client = BinanceClient::new()
        .map_err(|e| Error::Config(format!("failed to create Binance client: {}", e)))?;

    let fetcher = CandleFetcher::new(client, store).with_progress(true);
    let candles = fetcher.fetch(&symbol, timeframe, start, end).await?;

    match (candles.first(), candles.last()) {
        (Some(first), Some(last)) => println!(
            "{} {}: {} candles, {} .. {}",
            symbol.to_uppercase(),
            timeframe,
            candles.len(),
            first.open_time,
            last.open_time
        ),
        _ => println!("{} {}: no candles in the requested window", symbol, timeframe),
    }

    match output {
        Some(path) => {
            write_csv(&path, &candles)?;
            println!("Wrote {} rows to {}", candles.len(), path.display());
        }
        None => print_preview(&candles),
    }

    Ok(())
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc());
        }
    }

    Err(Error::InvalidWindow(format!(
        "unrecognized time {:?} (expected RFC 3339 or YYYY-MM-DD)",
        value
    )))
}

fn write_csv(path: &PathBuf, candles: &[Candle]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["open_time", "open", "high", "low", "close", "volume"])?;

    for candle in candles {
        writer.write_record([
            candle.open_time.to_rfc3339(),
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            candle.volume.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn print_preview(candles: &[Candle]) {
    if candles.is_empty() {
        return;
    }

    println!(
        "{:<25} {:>12} {:>12} {:>12} {:>12} {:>14}",
        "open_time", "open", "high", "low", "close", "volume"
    );

    let total = candles.len();
    for (i, candle) in candles.iter().enumerate() {
        if total > PREVIEW_ROWS * 2 && i == PREVIEW_ROWS {
            println!("   ... ({} more rows) ...", total - PREVIEW_ROWS * 2);
        }
        if total > PREVIEW_ROWS * 2 && i >= PREVIEW_ROWS && i < total - PREVIEW_ROWS {
            continue;
        }
        println!(
            "{:<25} {:>12} {:>12} {:>12} {:>12} {:>14}",
            candle.open_time.to_rfc3339(),
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            candle.volume
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(
            parse_time("2023-01-01").unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time("2023-01-01T12:00:00Z").unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time("2023-01-01T12:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap()
        );

        assert!(parse_time("yesterday").is_err());
        assert!(parse_time("01/02/2023").is_err());
    }
}
