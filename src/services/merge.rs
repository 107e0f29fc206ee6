//! Merging of cached and freshly fetched candle series.
//!
//! Pure and deterministic: the same inputs always produce the same series,
//! and no I/O happens here. The caller persists the result only after it
//! validates.

use crate::error::{Error, Result};
use crate::models::{Candle, SeriesKey};

/// Merge cached candles with freshly fetched ones into a single
/// deduplicated, ascending, gap-free series.
///
/// Where cache and fetch overlap at a boundary, the fetched value wins: it
/// reflects the latest exchange state for that interval (e.g. a candle
/// that has since finalized). An internal gap in the result is a
/// data-integrity fault (`Error::SeriesGap`) and is never silently
/// accepted.
pub fn merge(cached: Vec<Candle>, fetched: Vec<Candle>, key: &SeriesKey) -> Result<Vec<Candle>> {
    let mut combined = cached;
    combined.extend(fetched);
    // Stable sort keeps fetched entries after cached ones at equal open
    // times, so keep-last dedup prefers the fresh value.
    combined.sort_by_key(|c| c.open_time);

    let mut merged: Vec<Candle> = Vec::with_capacity(combined.len());
    for candle in combined {
        match merged.last_mut() {
            Some(last) if last.open_time == candle.open_time => *last = candle,
            _ => merged.push(candle),
        }
    }

    let step = key.timeframe().duration();
    for pair in merged.windows(2) {
        let expected = pair[0].open_time + step;
        if pair[1].open_time != expected {
            return Err(Error::SeriesGap {
                key: key.to_string(),
                detail: format!(
                    "expected candle at {}, found {}",
                    expected, pair[1].open_time
                ),
            });
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeframe;
    use chrono::{DateTime, TimeZone, Utc};

    fn key() -> SeriesKey {
        SeriesKey::new("BTCUSDT", Timeframe::Hour1).unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, day, hour, 0, 0).unwrap()
    }

    fn candle(day: u32, hour: u32, close: f64) -> Candle {
        Candle::new(at(day, hour), close, close, close, close, 100.0)
    }

    fn hours(day: u32, from: u32, to: u32) -> Vec<Candle> {
        (from..=to).map(|h| candle(day, h, 1.0)).collect()
    }

    #[test]
    fn test_merge_into_empty_cache() {
        let fetched = hours(1, 0, 23);
        let merged = merge(Vec::new(), fetched.clone(), &key()).unwrap();
        assert_eq!(merged, fetched);
    }

    #[test]
    fn test_merge_preserves_order_and_contiguity() {
        let cached = hours(1, 6, 11);
        let head = hours(1, 0, 5);
        let tail = hours(1, 12, 23);

        let mut fetched = head;
        fetched.extend(tail);
        let merged = merge(cached, fetched, &key()).unwrap();

        assert_eq!(merged.len(), 24);
        for (i, c) in merged.iter().enumerate() {
            assert_eq!(c.open_time, at(1, i as u32));
        }
    }

    #[test]
    fn test_fetched_value_wins_on_overlap() {
        let cached = vec![candle(1, 0, 1.0), candle(1, 1, 1.0)];
        let fetched = vec![candle(1, 1, 2.0), candle(1, 2, 2.0)];

        let merged = merge(cached, fetched, &key()).unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].close, 1.0);
        assert_eq!(merged[1].close, 2.0); // fresh value replaced the cached one
        assert_eq!(merged[2].close, 2.0);
    }

    #[test]
    fn test_internal_gap_is_an_error() {
        let cached = hours(1, 0, 5);
        let fetched = hours(1, 8, 10); // hole at 06:00 and 07:00

        let result = merge(cached, fetched, &key());
        assert!(matches!(result, Err(Error::SeriesGap { .. })));
    }

    #[test]
    fn test_merge_is_associative_over_disjoint_sets() {
        let cached = hours(1, 8, 15);
        let head = hours(1, 0, 7);
        let tail = hours(1, 16, 23);

        // cache + head, then + tail
        let stepwise = {
            let first = merge(cached.clone(), head.clone(), &key()).unwrap();
            merge(first, tail.clone(), &key()).unwrap()
        };

        // cache + (head + tail) in one pass
        let mut both = head;
        both.extend(tail);
        let single = merge(cached, both, &key()).unwrap();

        assert_eq!(stepwise, single);
    }

    #[test]
    fn test_merge_of_empty_inputs() {
        assert!(merge(Vec::new(), Vec::new(), &key()).unwrap().is_empty());

        let single = vec![candle(1, 0, 1.0)];
        assert_eq!(merge(single.clone(), Vec::new(), &key()).unwrap(), single);
    }
}
