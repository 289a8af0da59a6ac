//! Best-effort on-disk cache of previously parsed records.
//!
//! The cache holds every record the loader has produced for one data
//! directory, including the source file names, so later loads only parse
//! files that are not in it yet.
//!
//! # File Layout
//!
//! One JSON file per data directory, in the cache directory (the system temp
//! directory by default):
//!
//! ```text
//! <cache_dir>/speedtest_cache_<first 12 hex chars of sha256(data_dir)>.json
//! ```
//!
//! The snapshot is stored column-wise:
//!
//! ```text
//! {
//!   "version": 1,
//!   "timestamp_ms": [1705314600000, …],
//!   "source_file":  ["speedtest-2024-01-15T10-30-00-000Z.json", …],
//!   "session_id":   ["abc", null, …],
//!   "endpoint":     [null, …],
//!   "metrics":      { "download": [50.0, null, …], … }
//! }
//! ```
//!
//! A missing, unreadable, unparsable or inconsistent snapshot reads as
//! "absent"; a failed write is logged and ignored. The loader can always fall
//! back to parsing every file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::metrics::{Metric, MetricValues};
use crate::record::MeasurementRecord;

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// File name prefix of cache artifacts.
const CACHE_FILE_PREFIX: &str = "speedtest_cache_";

/// Number of hex characters of the directory hash used in the file name.
const KEY_LEN: usize = 12;

/// Column-wise serialized form of a list of records.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    timestamp_ms: Vec<i64>,
    source_file: Vec<String>,
    session_id: Vec<Option<String>>,
    endpoint: Vec<Option<String>>,
    metrics: BTreeMap<String, Vec<Option<f64>>>,
}

impl Snapshot {
    fn from_records(records: &[MeasurementRecord]) -> Self {
        let mut metrics: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        for metric in Metric::ALL {
            let column: Vec<_> = records.iter().map(|r| r.metrics.get(metric)).collect();
            // Columns with no values at all are left out.
            if column.iter().any(Option::is_some) {
                metrics.insert(metric.key().to_string(), column);
            }
        }

        Self {
            version: SNAPSHOT_VERSION,
            timestamp_ms: records.iter().map(|r| r.timestamp.timestamp_millis()).collect(),
            source_file: records.iter().map(|r| r.source_file.clone()).collect(),
            session_id: records.iter().map(|r| r.session_id.clone()).collect(),
            endpoint: records.iter().map(|r| r.endpoint.clone()).collect(),
            metrics,
        }
    }

    /// Rebuilds rows, validating column shapes. The error is a reason string.
    fn into_records(self) -> std::result::Result<Vec<MeasurementRecord>, String> {
        if self.version != SNAPSHOT_VERSION {
            return Err(format!(
                "unsupported snapshot version: expected {SNAPSHOT_VERSION}, found {}",
                self.version
            ));
        }

        let rows = self.timestamp_ms.len();
        let lengths = [
            ("source_file", self.source_file.len()),
            ("session_id", self.session_id.len()),
            ("endpoint", self.endpoint.len()),
        ];
        for (name, len) in lengths {
            if len != rows {
                return Err(format!("column '{name}' has {len} rows, expected {rows}"));
            }
        }

        let mut columns = Vec::with_capacity(self.metrics.len());
        for (key, column) in self.metrics {
            let metric =
                Metric::from_key(&key).ok_or_else(|| format!("unknown metric column '{key}'"))?;
            if column.len() != rows {
                return Err(format!("column '{key}' has {} rows, expected {rows}", column.len()));
            }
            columns.push((metric, column));
        }

        let mut records = Vec::with_capacity(rows);
        let mut session_ids = self.session_id.into_iter();
        let mut endpoints = self.endpoint.into_iter();
        for (row, (millis, source_file)) in self
            .timestamp_ms
            .into_iter()
            .zip(self.source_file)
            .enumerate()
        {
            let timestamp = millis_to_utc(millis)
                .ok_or_else(|| format!("row {row} has out-of-range timestamp {millis}"))?;

            let mut metrics = MetricValues::new();
            for (metric, column) in &columns {
                if let Some(value) = column[row] {
                    metrics.set(*metric, value);
                }
            }

            records.push(MeasurementRecord {
                timestamp,
                source_file,
                session_id: session_ids.next().flatten(),
                endpoint: endpoints.next().flatten(),
                metrics,
            });
        }

        Ok(records)
    }
}

fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Computes the cache key for a data directory.
///
/// The key is the first 12 hex characters of the SHA-256 of the path as
/// written, so the same configured directory always maps to the same cache
/// file and different directories practically never collide.
///
/// ```rust
/// use speedboard::cache::cache_key;
///
/// let key = cache_key("/data");
/// assert_eq!(key.len(), 12);
/// assert_eq!(key, cache_key("/data"));
/// assert_ne!(key, cache_key("/data2"));
/// ```
pub fn cache_key<P: AsRef<Path>>(data_dir: P) -> String {
    let digest = Sha256::digest(data_dir.as_ref().to_string_lossy().as_bytes());
    let mut hex = String::with_capacity(KEY_LEN);
    for byte in digest.iter().take(KEY_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Handle to the cache artifact of one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// Creates a store for `data_dir`, keeping its artifact in `cache_dir`.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(cache_dir: P, data_dir: Q) -> Self {
        let file_name = format!("{CACHE_FILE_PREFIX}{}.json", cache_key(data_dir));
        Self {
            path: cache_dir.as_ref().join(file_name),
        }
    }

    /// Creates a store at an explicit file path.
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Path of the cache artifact.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot, treating any failure as "no cache".
    ///
    /// A missing file is silent; any other failure is logged at warn and the
    /// caller rebuilds from scratch.
    pub fn read(&self) -> Option<Vec<MeasurementRecord>> {
        match self.try_read() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("discarding unusable cache: {e}");
                None
            }
        }
    }

    /// Reads the snapshot.
    ///
    /// Returns `Ok(None)` if no snapshot exists.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the file exists but cannot be read, parsed,
    /// or has inconsistent columns.
    pub fn try_read(&self) -> Result<Option<Vec<MeasurementRecord>>, CacheError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| CacheError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| CacheError::Parse {
            path: self.path.clone(),
            source: e,
        })?;
        let records = snapshot
            .into_records()
            .map_err(|reason| CacheError::Corrupted {
                path: self.path.clone(),
                reason,
            })?;

        Ok(Some(records))
    }

    /// Overwrites the snapshot, logging and ignoring any failure.
    pub fn write(&self, records: &[MeasurementRecord]) {
        if let Err(e) = self.try_write(records) {
            tracing::warn!("cache not saved, continuing uncached: {e}");
        }
    }

    /// Overwrites the snapshot.
    ///
    /// The snapshot is written to a sibling temp file and renamed into
    /// place, so a concurrent reader sees either the old or the new file.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if serialization or the file write fails.
    pub fn try_write(&self, records: &[MeasurementRecord]) -> Result<(), CacheError> {
        let content = serde_json::to_string(&Snapshot::from_records(records))
            .map_err(|e| CacheError::Serialize { source: e })?;

        let tmp = self.temp_path();
        let written = fs::write(&tmp, content).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::Write {
                path: self.path.clone(),
                source: e,
            });
        }

        Ok(())
    }

    /// Per-process temp file next to the snapshot.
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    /// Removes the snapshot. Returns true if a file was removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Write`] if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<bool, CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Write {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Conversion;
    use crate::timestamp::parse_filename_timestamp;
    use tempfile::tempdir;

    fn record(name: &str, download: Option<f64>, session: Option<&str>) -> MeasurementRecord {
        let mut metrics = MetricValues::new();
        if let Some(d) = download {
            metrics.set(Metric::Download, d);
        }
        metrics.set(Metric::Latency, 12.5);
        MeasurementRecord {
            timestamp: parse_filename_timestamp(name).unwrap(),
            source_file: name.to_string(),
            session_id: session.map(str::to_string),
            endpoint: None,
            metrics,
        }
    }

    fn sample() -> Vec<MeasurementRecord> {
        vec![
            record("speedtest-2024-01-15T10-30-00-000Z.json", Some(50.0), Some("a")),
            record("speedtest-2024-01-15T10-31-00-250Z.json", None, None),
            record("speedtest-2024-01-15T10-32-00-999Z.json", Some(48.5), Some("a")),
        ]
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "/data");

        let records = sample();
        store.try_write(&records).unwrap();

        let loaded = store.try_read().unwrap().unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_values_survive_bit_for_bit() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "/data");

        let mut records = sample();
        for (i, r) in (0u32..).zip(records.iter_mut()) {
            let raw = 739_118_495_123.0 + 1_000_003.0 * f64::from(i);
            r.metrics.set(Metric::Download, Conversion::BytesPerSecToMbps.apply(raw / 7.0));
            r.metrics.set(Metric::Jitter, 1.0 / 3.0 + f64::from(i) / 7.0);
            r.metrics.set(Metric::UpLoadedLatency, 105_598.966_555_714_27 + f64::from(i) * 0.1);
        }
        store.try_write(&records).unwrap();

        let loaded = store.try_read().unwrap().unwrap();
        for (before, after) in records.iter().zip(&loaded) {
            for (metric, value) in before.metrics.iter() {
                let cached = after.metrics.get(metric).unwrap();
                assert_eq!(cached.to_bits(), value.to_bits(), "{metric}: {value} vs {cached}");
            }
        }
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_write_replaces_without_leftovers() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "/data");

        store.try_write(&sample()).unwrap();
        store.try_write(&sample()[..1]).unwrap();

        assert_eq!(store.try_read().unwrap().unwrap().len(), 1);
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_missing_cache_is_absent() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "/data");

        assert!(store.try_read().unwrap().is_none());
        assert!(store.read().is_none());
    }

    #[test]
    fn test_garbage_cache_is_absent() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "/data");
        fs::write(store.path(), b"\x00\x01not json").unwrap();

        assert!(matches!(store.try_read(), Err(CacheError::Parse { .. })));
        assert!(store.read().is_none());
    }

    #[test]
    fn test_ragged_columns_are_corruption() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "/data");
        fs::write(
            store.path(),
            r#"{"version":1,"timestamp_ms":[0,1],"source_file":["a"],"session_id":[null,null],"endpoint":[null,null],"metrics":{}}"#,
        )
        .unwrap();

        assert!(matches!(store.try_read(), Err(CacheError::Corrupted { .. })));
        assert!(store.read().is_none());
    }

    #[test]
    fn test_unknown_metric_column_is_corruption() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "/data");
        fs::write(
            store.path(),
            r#"{"version":1,"timestamp_ms":[0],"source_file":["a"],"session_id":[null],"endpoint":[null],"metrics":{"packetLoss":[1.0]}}"#,
        )
        .unwrap();

        assert!(matches!(store.try_read(), Err(CacheError::Corrupted { .. })));
    }

    #[test]
    fn test_version_mismatch_is_corruption() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "/data");
        fs::write(
            store.path(),
            r#"{"version":99,"timestamp_ms":[],"source_file":[],"session_id":[],"endpoint":[],"metrics":{}}"#,
        )
        .unwrap();

        assert!(store.read().is_none());
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        let store = CacheStore::at(dir.path().join("missing").join("cache.json"));

        assert!(matches!(store.try_write(&sample()), Err(CacheError::Write { .. })));
        store.write(&sample());
        assert!(store.read().is_none());
    }

    #[test]
    fn test_cache_path_is_keyed_by_data_dir() {
        let dir = tempdir().unwrap();
        let a = CacheStore::new(dir.path(), "/data");
        let a_again = CacheStore::new(dir.path(), "/data");
        let b = CacheStore::new(dir.path(), "/srv/speedtest");

        assert_eq!(a.path(), a_again.path());
        assert_ne!(a.path(), b.path());

        let name = a.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("speedtest_cache_"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "speedtest_cache_".len() + KEY_LEN + ".json".len());
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "/data");

        assert!(!store.clear().unwrap());
        store.write(&sample());
        assert!(store.clear().unwrap());
        assert!(store.read().is_none());
    }

    #[test]
    fn test_empty_snapshot_round_trips() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "/data");

        store.try_write(&[]).unwrap();
        assert_eq!(store.try_read().unwrap(), Some(Vec::new()));
    }
}
