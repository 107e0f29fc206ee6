//! On-disk candle cache, one parquet file per series key.
//!
//! The columnar layout keeps multi-year series compact and lets coverage
//! bounds be read from the parquet footer statistics without loading the
//! payload, which keeps reconciliation cheap. Writes go to a temp file in
//! the same directory followed by an atomic rename, so a failed or
//! concurrent write can never leave a torn file visible to a later load.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::statistics::Statistics;
use tracing::debug;

use crate::constants::{APP_NAME, CACHE_DIR_ENV};
use crate::error::{Error, Result};
use crate::models::{Candle, SeriesKey};
use crate::services::reconcile::Coverage;

/// Persistent candle store rooted at an explicit base directory.
///
/// The base path is resolved once (flag, environment, or the platform
/// cache dir) and passed in; the store itself never consults globals.
pub struct CacheStore {
    base_dir: PathBuf,
}

impl CacheStore {
    /// Open a store, creating the base directory if needed.
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| cache_err(&base_dir, e))?;
        Ok(Self { base_dir })
    }

    /// Resolve the default cache directory: `CANDLECACHE_DIR` if set,
    /// otherwise the platform per-user cache dir.
    pub fn default_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }

        dirs::cache_dir()
            .map(|dir| dir.join(APP_NAME))
            .ok_or_else(|| Error::Config("could not resolve a user cache directory".to_string()))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Cache file path for a series key.
    pub fn path_for(&self, key: &SeriesKey) -> PathBuf {
        self.base_dir.join(key.file_name())
    }

    /// Coverage bounds of the cached series, or `None` when no series
    /// exists yet.
    ///
    /// Reads only the parquet footer; falls back to scanning the
    /// `open_time` column alone when a footer lacks statistics. A corrupt
    /// file is a hard error, never an empty cache.
    pub fn coverage(&self, key: &SeriesKey) -> Result<Option<Coverage>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path).map_err(|e| cache_err(&path, e))?;
        let reader = SerializedFileReader::new(file).map_err(|e| cache_err(&path, e))?;
        let meta = reader.metadata();

        if meta.file_metadata().num_rows() == 0 {
            return Ok(None);
        }

        let mut bounds: Option<(i64, i64)> = None;
        let mut stats_complete = true;
        for row_group in meta.row_groups() {
            match row_group.column(0).statistics() {
                Some(Statistics::Int64(stats)) => match (stats.min_opt(), stats.max_opt()) {
                    (Some(&min), Some(&max)) => {
                        bounds = Some(match bounds {
                            Some((lo, hi)) => (lo.min(min), hi.max(max)),
                            None => (min, max),
                        });
                    }
                    _ => {
                        stats_complete = false;
                        break;
                    }
                },
                _ => {
                    stats_complete = false;
                    break;
                }
            }
        }
        drop(reader);

        let bounds = if stats_complete {
            bounds
        } else {
            debug!(
                "Footer statistics unavailable for {}, scanning open_time column",
                path.display()
            );
            self.open_time_bounds(&path)?
        };

        match bounds {
            Some((min_ms, max_ms)) => Ok(Some(Coverage {
                first_open: timestamp(min_ms, &path)?,
                last_open: timestamp(max_ms, &path)?,
            })),
            None => Ok(None),
        }
    }

    /// Number of cached candles, from footer metadata only.
    pub fn row_count(&self, key: &SeriesKey) -> Result<usize> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(0);
        }

        let file = File::open(&path).map_err(|e| cache_err(&path, e))?;
        let reader = SerializedFileReader::new(file).map_err(|e| cache_err(&path, e))?;
        Ok(reader.metadata().file_metadata().num_rows() as usize)
    }

    /// Load the full cached series for a key.
    ///
    /// A missing file is an empty series; any other failure is a hard
    /// `CacheIo` error so corruption is never masked by a silent refetch.
    pub fn load(&self, key: &SeriesKey) -> Result<Vec<Candle>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path).map_err(|e| cache_err(&path, e))?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| cache_err(&path, e))?;
        let reader = builder.build().map_err(|e| cache_err(&path, e))?;

        let mut series = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| cache_err(&path, e))?;
            if batch.num_columns() != 6 {
                return Err(cache_err(
                    &path,
                    format!("expected 6 columns, found {}", batch.num_columns()),
                ));
            }

            let open_time = timestamp_column(&batch, 0, &path)?;
            let open = float_column(&batch, 1, &path)?;
            let high = float_column(&batch, 2, &path)?;
            let low = float_column(&batch, 3, &path)?;
            let close = float_column(&batch, 4, &path)?;
            let volume = float_column(&batch, 5, &path)?;

            for i in 0..batch.num_rows() {
                series.push(Candle::new(
                    timestamp(open_time.value(i), &path)?,
                    open.value(i),
                    high.value(i),
                    low.value(i),
                    close.value(i),
                    volume.value(i),
                ));
            }
        }

        debug!("Loaded {} candles from {}", series.len(), path.display());
        Ok(series)
    }

    /// Atomically persist the series for a key.
    ///
    /// The payload is written to a sibling temp file first and renamed
    /// over the destination, so readers either see the previous complete
    /// series or the new one.
    pub fn save(&self, key: &SeriesKey, series: &[Candle]) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("parquet.tmp");

        let schema = series_schema();
        let open_time = TimestampMillisecondArray::from(
            series
                .iter()
                .map(|c| c.open_time.timestamp_millis())
                .collect::<Vec<_>>(),
        )
        .with_timezone("UTC");

        let columns: Vec<ArrayRef> = vec![
            Arc::new(open_time),
            Arc::new(Float64Array::from_iter_values(series.iter().map(|c| c.open))),
            Arc::new(Float64Array::from_iter_values(series.iter().map(|c| c.high))),
            Arc::new(Float64Array::from_iter_values(series.iter().map(|c| c.low))),
            Arc::new(Float64Array::from_iter_values(series.iter().map(|c| c.close))),
            Arc::new(Float64Array::from_iter_values(
                series.iter().map(|c| c.volume),
            )),
        ];

        let batch =
            RecordBatch::try_new(schema.clone(), columns).map_err(|e| cache_err(&path, e))?;

        let file = File::create(&tmp).map_err(|e| cache_err(&tmp, e))?;
        let props = WriterProperties::builder().build();
        let mut writer =
            ArrowWriter::try_new(file, schema, Some(props)).map_err(|e| cache_err(&tmp, e))?;
        writer.write(&batch).map_err(|e| cache_err(&tmp, e))?;
        writer.close().map_err(|e| cache_err(&tmp, e))?;

        fs::rename(&tmp, &path).map_err(|e| cache_err(&path, e))?;

        debug!("Saved {} candles to {}", series.len(), path.display());
        Ok(())
    }

    /// List every series key with a cache file in the base directory.
    pub fn list_series(&self) -> Result<Vec<SeriesKey>> {
        let mut keys = Vec::new();
        let entries = fs::read_dir(&self.base_dir).map_err(|e| cache_err(&self.base_dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| cache_err(&self.base_dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(key) = SeriesKey::from_file_name(name) {
                    keys.push(key);
                }
            }
        }

        keys.sort_by_key(|k| k.file_name());
        Ok(keys)
    }

    /// Min/max of the `open_time` column via a column-projected read.
    fn open_time_bounds(&self, path: &Path) -> Result<Option<(i64, i64)>> {
        let file = File::open(path).map_err(|e| cache_err(path, e))?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| cache_err(path, e))?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), [0]);
        let reader = builder
            .with_projection(mask)
            .build()
            .map_err(|e| cache_err(path, e))?;

        let mut bounds: Option<(i64, i64)> = None;
        for batch in reader {
            let batch = batch.map_err(|e| cache_err(path, e))?;
            let open_time = timestamp_column(&batch, 0, path)?;
            for i in 0..open_time.len() {
                let value = open_time.value(i);
                bounds = Some(match bounds {
                    Some((lo, hi)) => (lo.min(value), hi.max(value)),
                    None => (value, value),
                });
            }
        }

        Ok(bounds)
    }
}

/// Arrow schema of a cached series file.
fn series_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(
            "open_time",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("open", DataType::Float64, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
    ]))
}

fn cache_err(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::CacheIo {
        path: path.display().to_string(),
        detail: err.to_string(),
    }
}

fn timestamp(ms: i64, path: &Path) -> Result<chrono::DateTime<chrono::Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| cache_err(path, format!("invalid open time {}", ms)))
}

fn timestamp_column<'a>(
    batch: &'a RecordBatch,
    index: usize,
    path: &Path,
) -> Result<&'a TimestampMillisecondArray> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .ok_or_else(|| cache_err(path, format!("column {} has unexpected type", index)))
}

fn float_column<'a>(batch: &'a RecordBatch, index: usize, path: &Path) -> Result<&'a Float64Array> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| cache_err(path, format!("column {} has unexpected type", index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeframe;
    use chrono::{TimeZone, Utc};
    use std::io::Write;
    use tempfile::tempdir;

    fn key() -> SeriesKey {
        SeriesKey::new("BTCUSDT", Timeframe::Hour1).unwrap()
    }

    fn sample_series(hours: u32) -> Vec<Candle> {
        (0..hours)
            .map(|h| {
                Candle::new(
                    Utc.with_ymd_and_hms(2023, 1, 1, h, 0, 0).unwrap(),
                    100.0 + h as f64,
                    101.0 + h as f64,
                    99.0 + h as f64,
                    100.5 + h as f64,
                    1000.0 + h as f64,
                )
            })
            .collect()
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();
        let series = sample_series(24);

        store.save(&key(), &series).unwrap();
        let loaded = store.load(&key()).unwrap();

        assert_eq!(loaded, series);
    }

    #[test]
    fn test_missing_file_is_empty_series() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();

        assert!(store.load(&key()).unwrap().is_empty());
        assert!(store.coverage(&key()).unwrap().is_none());
        assert_eq!(store.row_count(&key()).unwrap(), 0);
    }

    #[test]
    fn test_coverage_matches_series_bounds() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();
        let series = sample_series(24);

        store.save(&key(), &series).unwrap();
        let coverage = store.coverage(&key()).unwrap().unwrap();

        assert_eq!(coverage.first_open, series[0].open_time);
        assert_eq!(coverage.last_open, series[23].open_time);
        assert_eq!(store.row_count(&key()).unwrap(), 24);
    }

    #[test]
    fn test_corrupt_file_is_a_hard_error() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();

        let path = store.path_for(&key());
        let mut file = File::create(&path).unwrap();
        file.write_all(b"this is not a parquet file").unwrap();
        drop(file);

        assert!(matches!(store.load(&key()), Err(Error::CacheIo { .. })));
        assert!(matches!(
            store.coverage(&key()),
            Err(Error::CacheIo { .. })
        ));
    }

    #[test]
    fn test_save_replaces_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();

        store.save(&key(), &sample_series(6)).unwrap();
        store.save(&key(), &sample_series(24)).unwrap();

        assert_eq!(store.load(&key()).unwrap().len(), 24);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_list_series() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();

        let other = SeriesKey::new("ETHUSDT", Timeframe::Day1).unwrap();
        store.save(&key(), &sample_series(2)).unwrap();
        store.save(&other, &sample_series(2)).unwrap();

        let keys = store.list_series().unwrap();
        assert_eq!(keys, vec![key(), other]);
    }
}
