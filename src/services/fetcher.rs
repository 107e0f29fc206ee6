//! Fetch orchestration over missing intervals.
//!
//! Drives the Binance client across one or more missing sub-intervals,
//! paginating each at the protocol's 1000-row limit until the interval's
//! upper bound is reached or the exchange runs out of data (relevant for
//! open-ended tail fetches near the present, and for ranges preceding a
//! pair's listing date, which legitimately come back empty).

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::constants::MAX_KLINES_PER_REQUEST;
use crate::error::{Error, Result};
use crate::models::{Candle, SeriesKey, Timeframe};
use crate::services::binance::{BinanceClient, BinanceError};
use crate::services::reconcile::MissingInterval;

/// Fetch all missing intervals, concatenated in chronological order.
///
/// Retries happen per page inside the client; once a page exhausts its
/// budget the whole fetch fails and nothing is persisted by the caller.
pub async fn fetch_missing(
    client: &BinanceClient,
    key: &SeriesKey,
    intervals: &[MissingInterval],
    show_progress: bool,
) -> Result<Vec<Candle>> {
    let mut all = Vec::new();

    for interval in intervals {
        let candles = fetch_interval(client, key, interval, show_progress).await?;
        all.extend(candles);
    }

    Ok(all)
}

/// Paginate one missing interval from its lower bound.
async fn fetch_interval(
    client: &BinanceClient,
    key: &SeriesKey,
    interval: &MissingInterval,
    show_progress: bool,
) -> Result<Vec<Candle>> {
    let timeframe = key.timeframe();
    let step = timeframe.duration();
    let mut cursor = interval.start;
    let mut collected: Vec<Candle> = Vec::new();

    let bar = progress_bar(show_progress, interval, timeframe);

    loop {
        if let Some(end) = interval.end {
            if cursor >= end {
                break;
            }
        }

        let page = client
            .get_klines(key.symbol(), timeframe, cursor, MAX_KLINES_PER_REQUEST)
            .await
            .map_err(|e| map_client_error(e, key, interval))?;

        if page.is_empty() {
            // Nothing available at or past the cursor
            break;
        }

        let page_len = page.len();
        let ascending = page.windows(2).all(|pair| pair[0].open_time < pair[1].open_time);
        if !ascending || page[0].open_time < cursor {
            return Err(Error::ProtocolViolation {
                key: key.to_string(),
                detail: format!(
                    "page starting at {} is not strictly ascending past cursor {}",
                    page[0].open_time, cursor
                ),
            });
        }

        let last_open = match page.last() {
            Some(candle) => candle.open_time,
            None => break,
        };

        let kept_before = collected.len();
        match interval.end {
            Some(end) => collected.extend(page.into_iter().filter(|c| c.open_time < end)),
            None => collected.extend(page),
        }

        if let Some(bar) = &bar {
            bar.inc((collected.len() - kept_before) as u64);
        }

        if page_len < MAX_KLINES_PER_REQUEST {
            // A short page means the exchange has no more data yet
            debug!(
                "Short page ({} rows) for {}, stopping at {}",
                page_len, key, last_open
            );
            break;
        }

        cursor = last_open + step;
    }

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    info!(
        "Fetched {} candles for {} over {}",
        collected.len(),
        key,
        interval
    );

    Ok(collected)
}

fn progress_bar(
    show_progress: bool,
    interval: &MissingInterval,
    timeframe: Timeframe,
) -> Option<ProgressBar> {
    if !show_progress {
        return None;
    }

    let bar = match interval.end {
        Some(end) => {
            let total = (end - interval.start).num_milliseconds()
                / timeframe.duration().num_milliseconds();
            let bar = ProgressBar::new(total.max(0) as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
                    )
                    .unwrap()
                    .progress_chars("#>-"),
            );
            bar
        }
        None => ProgressBar::new_spinner(),
    };

    Some(bar)
}

fn map_client_error(err: BinanceError, key: &SeriesKey, interval: &MissingInterval) -> Error {
    match err {
        BinanceError::InvalidSymbol(msg) => {
            Error::UnknownSymbol(format!("{}: {}", key.symbol(), msg))
        }
        BinanceError::InvalidInterval(msg) => Error::UnsupportedTimeframe(format!(
            "{} rejected by remote: {}",
            key.timeframe(),
            msg
        )),
        other => Error::FetchExhausted {
            key: key.to_string(),
            interval: interval.to_string(),
            reason: other.to_string(),
        },
    }
}
