use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Timeframe of a candlestick series.
///
/// Only fixed-duration Binance intervals are supported. Calendar-variable
/// intervals (months) have no fixed grid and are rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1-minute candles
    Minute1,
    /// 3-minute candles
    Minute3,
    /// 5-minute candles
    Minute5,
    /// 15-minute candles
    Minute15,
    /// 30-minute candles
    Minute30,
    /// 1-hour candles
    Hour1,
    /// 2-hour candles
    Hour2,
    /// 4-hour candles
    Hour4,
    /// 6-hour candles
    Hour6,
    /// 8-hour candles
    Hour8,
    /// 12-hour candles
    Hour12,
    /// Daily candles
    Day1,
    /// 3-day candles
    Day3,
    /// Weekly candles (open Monday 00:00 UTC)
    Week1,
}

impl Timeframe {
    /// Convert to the Binance interval string representation.
    pub fn to_interval_string(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute3 => "3m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour2 => "2h",
            Timeframe::Hour4 => "4h",
            Timeframe::Hour6 => "6h",
            Timeframe::Hour8 => "8h",
            Timeframe::Hour12 => "12h",
            Timeframe::Day1 => "1d",
            Timeframe::Day3 => "3d",
            Timeframe::Week1 => "1w",
        }
    }

    /// Fixed duration of one candle.
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::Minute1 => Duration::minutes(1),
            Timeframe::Minute3 => Duration::minutes(3),
            Timeframe::Minute5 => Duration::minutes(5),
            Timeframe::Minute15 => Duration::minutes(15),
            Timeframe::Minute30 => Duration::minutes(30),
            Timeframe::Hour1 => Duration::hours(1),
            Timeframe::Hour2 => Duration::hours(2),
            Timeframe::Hour4 => Duration::hours(4),
            Timeframe::Hour6 => Duration::hours(6),
            Timeframe::Hour8 => Duration::hours(8),
            Timeframe::Hour12 => Duration::hours(12),
            Timeframe::Day1 => Duration::days(1),
            Timeframe::Day3 => Duration::days(3),
            Timeframe::Week1 => Duration::weeks(1),
        }
    }

    /// Offset of the candle grid from the Unix epoch.
    ///
    /// Weekly candles open on Monday 00:00 UTC; the epoch fell on a
    /// Thursday, so the weekly grid is shifted by four days. Every other
    /// interval divides a day and is epoch-aligned.
    fn grid_offset(&self) -> Duration {
        match self {
            Timeframe::Week1 => Duration::days(4),
            _ => Duration::zero(),
        }
    }

    /// Largest grid-aligned instant not after `t`.
    pub fn align_floor(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.duration().num_milliseconds();
        let offset = self.grid_offset().num_milliseconds();
        let rem = (t.timestamp_millis() - offset).rem_euclid(step);
        t - Duration::milliseconds(rem)
    }

    /// Smallest grid-aligned instant not before `t`.
    pub fn align_ceil(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let floored = self.align_floor(t);
        if floored == t {
            t
        } else {
            floored + self.duration()
        }
    }

    /// Get all supported timeframes.
    pub fn all() -> Vec<Timeframe> {
        vec![
            Timeframe::Minute1,
            Timeframe::Minute3,
            Timeframe::Minute5,
            Timeframe::Minute15,
            Timeframe::Minute30,
            Timeframe::Hour1,
            Timeframe::Hour2,
            Timeframe::Hour4,
            Timeframe::Hour6,
            Timeframe::Hour8,
            Timeframe::Hour12,
            Timeframe::Day1,
            Timeframe::Day3,
            Timeframe::Week1,
        ]
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_interval_string())
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::all()
            .into_iter()
            .find(|tf| tf.to_interval_string() == s)
            .ok_or_else(|| {
                Error::UnsupportedTimeframe(format!(
                    "{} (supported: 1m, 3m, 5m, 15m, 30m, 1h, 2h, 4h, 6h, 8h, 12h, 1d, 3d, 1w)",
                    s
                ))
            })
    }
}
