//! Requested-window reconciliation against cached coverage.
//!
//! Determines the minimal set of missing sub-intervals that must be fetched
//! from the remote so that, after merging, the cached series covers the
//! requested window. All interval arithmetic is half-open `[start, end)` on
//! the timeframe grid, which makes adjacency (a window that merely touches
//! the cached range) fall out without boundary double-fetches.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::Timeframe;

/// A requested time window, normalized onto the timeframe grid.
///
/// `start` is floored and `end` ceiled to candle boundaries, so every
/// downstream component only ever sees aligned instants. An absent `end`
/// means "up to the latest available candle".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedWindow {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
}

impl RequestedWindow {
    /// Validate and align a window.
    ///
    /// Fails with `Error::InvalidWindow` when `start >= end`; this check
    /// runs before any I/O is attempted.
    pub fn new(
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        timeframe: Timeframe,
    ) -> Result<Self> {
        if let Some(end) = end {
            if start >= end {
                return Err(Error::InvalidWindow(format!(
                    "start {} is not before end {}",
                    start, end
                )));
            }
        }

        Ok(Self {
            start: timeframe.align_floor(start),
            end: end.map(|e| timeframe.align_ceil(e)),
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Aligned exclusive end, `None` when open toward the present.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }
}

/// Coverage of a cached series: open times of its first and last candle.
///
/// A cached series is contiguous by invariant, so a single pair of bounds
/// fully describes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub first_open: DateTime<Utc>,
    pub last_open: DateTime<Utc>,
}

impl Coverage {
    /// Exclusive end of coverage: the instant after the last candle closes.
    pub fn end_exclusive(&self, timeframe: Timeframe) -> DateTime<Utc> {
        self.last_open + timeframe.duration()
    }
}

/// A sub-range `[start, end)` of a requested window not covered by cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingInterval {
    pub start: DateTime<Utc>,
    /// `None` = open-ended toward the latest available candle.
    pub end: Option<DateTime<Utc>>,
}

impl std::fmt::Display for MissingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{} .. {})", self.start, end),
            None => write!(f, "[{} .. latest)", self.start),
        }
    }
}

/// Compute the missing sub-intervals of `window` given cached `coverage`.
///
/// Pure function; returns intervals in chronological order (head before
/// tail). A head interval always extends up to the cached start and a tail
/// always begins at the cached end, so merging the fetched data can never
/// introduce an internal gap even for windows disjoint from coverage.
///
/// An open-ended window always produces a tail interval: the cache can
/// never prove it holds the latest candle, so freshness wins over
/// staleness.
pub fn reconcile(
    window: &RequestedWindow,
    coverage: Option<Coverage>,
    timeframe: Timeframe,
) -> Vec<MissingInterval> {
    let Some(coverage) = coverage else {
        return vec![MissingInterval {
            start: window.start(),
            end: window.end(),
        }];
    };

    let covered_until = coverage.end_exclusive(timeframe);
    let mut missing = Vec::new();

    if window.start() < coverage.first_open {
        missing.push(MissingInterval {
            start: window.start(),
            end: Some(coverage.first_open),
        });
    }

    match window.end() {
        None => missing.push(MissingInterval {
            start: covered_until,
            end: None,
        }),
        Some(end) if end > covered_until => missing.push(MissingInterval {
            start: covered_until,
            end: Some(end),
        }),
        Some(_) => {}
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TF: Timeframe = Timeframe::Hour1;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, day, hour, 0, 0).unwrap()
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> RequestedWindow {
        RequestedWindow::new(start, Some(end), TF).unwrap()
    }

    fn coverage(first: DateTime<Utc>, last: DateTime<Utc>) -> Option<Coverage> {
        Some(Coverage {
            first_open: first,
            last_open: last,
        })
    }

    #[test]
    fn test_empty_cache_yields_full_window() {
        let w = window(at(1, 0), at(2, 0));
        let missing = reconcile(&w, None, TF);

        assert_eq!(
            missing,
            vec![MissingInterval {
                start: at(1, 0),
                end: Some(at(2, 0)),
            }]
        );
    }

    #[test]
    fn test_window_inside_coverage_is_pure_hit() {
        // Cache holds candles 00:00..=23:00 of Jan 1
        let w = window(at(1, 6), at(1, 18));
        assert!(reconcile(&w, coverage(at(1, 0), at(1, 23)), TF).is_empty());

        // Exact match including the final candle
        let w = window(at(1, 0), at(2, 0));
        assert!(reconcile(&w, coverage(at(1, 0), at(1, 23)), TF).is_empty());
    }

    #[test]
    fn test_head_extension() {
        let w = window(at(1, 0), at(1, 12));
        let missing = reconcile(&w, coverage(at(1, 6), at(1, 23)), TF);

        assert_eq!(
            missing,
            vec![MissingInterval {
                start: at(1, 0),
                end: Some(at(1, 6)),
            }]
        );
    }

    #[test]
    fn test_tail_extension() {
        // Cache covers Jan 1; request reaches into Jan 3
        let w = window(at(1, 12), at(3, 0));
        let missing = reconcile(&w, coverage(at(1, 0), at(1, 23)), TF);

        assert_eq!(
            missing,
            vec![MissingInterval {
                start: at(2, 0),
                end: Some(at(3, 0)),
            }]
        );
    }

    #[test]
    fn test_head_and_tail_in_chronological_order() {
        let w = window(at(1, 0), at(3, 0));
        let missing = reconcile(&w, coverage(at(1, 12), at(2, 11)), TF);

        assert_eq!(
            missing,
            vec![
                MissingInterval {
                    start: at(1, 0),
                    end: Some(at(1, 12)),
                },
                MissingInterval {
                    start: at(2, 12),
                    end: Some(at(3, 0)),
                },
            ]
        );
    }

    #[test]
    fn test_adjacent_windows_do_not_refetch_boundary() {
        let cov = coverage(at(2, 0), at(2, 23));

        // Window ends exactly where coverage begins
        let w = window(at(1, 0), at(2, 0));
        let missing = reconcile(&w, cov, TF);
        assert_eq!(
            missing,
            vec![MissingInterval {
                start: at(1, 0),
                end: Some(at(2, 0)),
            }]
        );

        // Window starts exactly where coverage ends
        let w = window(at(3, 0), at(4, 0));
        let missing = reconcile(&w, cov, TF);
        assert_eq!(
            missing,
            vec![MissingInterval {
                start: at(3, 0),
                end: Some(at(4, 0)),
            }]
        );
    }

    #[test]
    fn test_disjoint_window_extends_to_cached_bound() {
        // Request entirely before coverage: the head must reach the cached
        // start or the merged series would have an internal gap
        let w = window(at(1, 0), at(1, 6));
        let missing = reconcile(&w, coverage(at(2, 0), at(2, 23)), TF);

        assert_eq!(
            missing,
            vec![MissingInterval {
                start: at(1, 0),
                end: Some(at(2, 0)),
            }]
        );
    }

    #[test]
    fn test_open_ended_window_always_fetches_tail() {
        let w = RequestedWindow::new(at(1, 0), None, TF).unwrap();
        let missing = reconcile(&w, coverage(at(1, 0), at(1, 23)), TF);

        assert_eq!(
            missing,
            vec![MissingInterval {
                start: at(2, 0),
                end: None,
            }]
        );
    }

    #[test]
    fn test_off_grid_window_is_normalized() {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 11, 47, 3).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 1, 1, 14, 1, 0).unwrap();
        let w = RequestedWindow::new(start, Some(end), TF).unwrap();

        assert_eq!(w.start(), at(1, 11));
        assert_eq!(w.end(), Some(at(1, 15)));
    }

    #[test]
    fn test_malformed_window_rejected() {
        assert!(RequestedWindow::new(at(1, 0), Some(at(1, 0)), TF).is_err());
        assert!(RequestedWindow::new(at(2, 0), Some(at(1, 0)), TF).is_err());
    }
}
