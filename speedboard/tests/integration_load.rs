//! Integration tests for incremental loading.
//!
//! These tests exercise the full flow from a directory of measurement files
//! through the cache and back out as a sorted dataset, including the
//! failure modes a live data directory produces.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use speedboard::cache::CacheStore;
use speedboard::{
    DashboardConfig, DatasetLoader, JsonExtractor, LoadOutcome, MeasurementRecord, Metric,
    RecordExtractor,
};
use tempfile::{TempDir, tempdir};

/// Data and cache directories that live for one test.
struct Fixture {
    data: TempDir,
    cache: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            data: tempdir().unwrap(),
            cache: tempdir().unwrap(),
        }
    }

    fn config(&self) -> DashboardConfig {
        let mut config = DashboardConfig::new(self.data.path(), Duration::from_secs(60)).unwrap();
        config.cache_dir = self.cache.path().to_path_buf();
        config
    }

    fn write(&self, name: &str, content: &str) {
        fs::write(self.data.path().join(name), content).unwrap();
    }

    /// Writes a successful measurement taken at 2024-01-15 10:`minute`.
    fn write_measurement(&self, minute: u32, download_bytes: f64) {
        let doc = json!({
            "success": true,
            "sessionID": format!("session-{minute}"),
            "endpoint": "https://speed.example.net",
            "result": {
                "download": download_bytes,
                "upload": 12_500_000.0,
                "latency": 14.2,
                "jitter": 1.1,
            }
        });
        self.write(&file_name(minute), &doc.to_string());
    }
}

fn file_name(minute: u32) -> String {
    format!("speedtest-2024-01-15T10-{minute:02}-00-000Z.json")
}

/// Wraps the JSON extractor and counts calls.
#[derive(Default)]
struct CountingExtractor {
    calls: AtomicUsize,
}

impl CountingExtractor {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RecordExtractor for CountingExtractor {
    fn extract(&self, path: &Path) -> Option<MeasurementRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        JsonExtractor.extract(path)
    }
}

fn cached_sources(loader: &DatasetLoader<CountingExtractor>) -> Vec<String> {
    let mut names: Vec<_> = loader
        .cache()
        .try_read()
        .unwrap()
        .unwrap()
        .into_iter()
        .map(|r| r.source_file)
        .collect();
    names.sort();
    names
}

#[test]
fn test_first_load_builds_cache() {
    let fx = Fixture::new();
    fx.write_measurement(2, 50_000_000.0);
    fx.write_measurement(1, 25_000_000.0);

    let loader = DatasetLoader::new(&fx.config());
    let (dataset, report) = loader.load_with_report();

    assert_eq!(report.outcome, LoadOutcome::Rebuilt);
    assert_eq!(report.files_parsed, 2);
    assert_eq!(dataset.len(), 2);
    assert!(loader.cache().path().exists());

    // Ascending by timestamp, bytes/s converted to Mbps.
    let rows = dataset.rows();
    assert!(rows[0].timestamp < rows[1].timestamp);
    assert_eq!(rows[0].metrics.get(Metric::Download), Some(25.0));
    assert_eq!(rows[1].metrics.get(Metric::Download), Some(50.0));
    assert_eq!(rows[1].metrics.get(Metric::Upload), Some(12.5));
    assert_eq!(rows[1].metrics.get(Metric::Latency), Some(14.2));
    assert_eq!(rows[1].session_id.as_deref(), Some("session-2"));
}

#[test]
fn test_second_load_parses_nothing() {
    let fx = Fixture::new();
    for minute in 0..5 {
        fx.write_measurement(minute, 10_000_000.0);
    }

    let loader = DatasetLoader::with_extractor(&fx.config(), CountingExtractor::default());
    let first = loader.load();
    assert_eq!(loader.extractor().calls(), 5);

    let (second, report) = loader.load_with_report();
    assert_eq!(loader.extractor().calls(), 5);
    assert_eq!(report.outcome, LoadOutcome::CacheCurrent);
    assert_eq!(report.cached_rows, 5);
    assert_eq!(first, second);
}

#[test]
fn test_new_valid_and_corrupt_files() {
    let fx = Fixture::new();
    fx.write_measurement(0, 10_000_000.0);
    fx.write_measurement(1, 10_000_000.0);

    let loader = DatasetLoader::with_extractor(&fx.config(), CountingExtractor::default());
    assert_eq!(loader.load().len(), 2);

    fx.write_measurement(2, 20_000_000.0);
    fx.write(&file_name(3), "{ not json");

    let (dataset, report) = loader.load_with_report();
    assert_eq!(report.outcome, LoadOutcome::Merged);
    assert_eq!(report.files_parsed, 2);
    assert_eq!(report.rejected(), 1);
    assert_eq!(dataset.len(), 3);
    assert_eq!(cached_sources(&loader), vec![file_name(0), file_name(1), file_name(2)]);

    // The corrupt file never entered the cache, so it is retried.
    let calls = loader.extractor().calls();
    assert_eq!(loader.load().len(), 3);
    assert_eq!(loader.extractor().calls(), calls + 1);
}

#[test]
fn test_corrupt_cache_triggers_rebuild() {
    let fx = Fixture::new();
    fx.write_measurement(0, 10_000_000.0);
    fx.write_measurement(1, 10_000_000.0);

    let loader = DatasetLoader::with_extractor(&fx.config(), CountingExtractor::default());
    loader.load();

    fs::write(loader.cache().path(), b"\x00\x01garbage").unwrap();

    let (dataset, report) = loader.load_with_report();
    assert_eq!(report.outcome, LoadOutcome::Rebuilt);
    assert_eq!(dataset.len(), 2);
    assert_eq!(loader.extractor().calls(), 4);
    assert_eq!(cached_sources(&loader).len(), 2);
}

#[test]
fn test_empty_snapshot_is_a_cold_start() {
    let fx = Fixture::new();
    fx.write_measurement(0, 10_000_000.0);
    fx.write_measurement(1, 10_000_000.0);

    let loader = DatasetLoader::with_extractor(&fx.config(), CountingExtractor::default());
    loader.cache().try_write(&[]).unwrap();
    assert!(loader.cache().try_read().unwrap().unwrap().is_empty());

    let (dataset, report) = loader.load_with_report();
    assert_eq!(report.outcome, LoadOutcome::Rebuilt);
    assert_eq!(report.cached_rows, 0);
    assert_eq!(report.files_parsed, 2);
    assert_eq!(dataset.len(), 2);
    assert_eq!(loader.extractor().calls(), 2);
    assert_eq!(cached_sources(&loader), vec![file_name(0), file_name(1)]);
}

#[test]
fn test_warm_load_matches_cold_load_exactly() {
    let fx = Fixture::new();
    for minute in 0..40 {
        // Byte rates that do not divide evenly, so Mbps values use every mantissa bit.
        let raw = (739_118_495_123.0 + f64::from(minute) * 1_000_003.0) / 7.0;
        fx.write_measurement(minute, raw);
    }

    let loader = DatasetLoader::with_extractor(&fx.config(), CountingExtractor::default());
    let cold = loader.load();
    let (warm, report) = loader.load_with_report();

    assert_eq!(report.outcome, LoadOutcome::CacheCurrent);
    assert_eq!(loader.extractor().calls(), 40);
    for (a, b) in cold.iter().zip(warm.iter()) {
        let (a, b) = (a.metrics.get(Metric::Download), b.metrics.get(Metric::Download));
        assert_eq!(a.map(f64::to_bits), b.map(f64::to_bits), "{a:?} vs {b:?}");
    }
    assert_eq!(cold, warm);
}

#[test]
fn test_null_metric_keeps_row() {
    let fx = Fixture::new();
    let doc = json!({"success": true, "result": {"download": 50_000_000, "latency": null}});
    fx.write(&file_name(0), &doc.to_string());

    let dataset = DatasetLoader::new(&fx.config()).load();
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset.rows()[0].metrics.get(Metric::Download), Some(50.0));
    assert_eq!(dataset.rows()[0].metrics.get(Metric::Latency), None);
}

#[test]
fn test_unwritable_cache_dir_still_loads() {
    let fx = Fixture::new();
    fx.write_measurement(0, 10_000_000.0);

    // A regular file where the cache directory should be.
    let blocker = fx.cache.path().join("not-a-dir");
    fs::write(&blocker, "").unwrap();
    let mut config = fx.config();
    config.cache_dir = blocker;

    let loader = DatasetLoader::new(&config);
    assert_eq!(loader.load().len(), 1);
    assert_eq!(loader.load().len(), 1);
}

#[test]
fn test_missing_or_empty_data_dir() {
    let fx = Fixture::new();

    let (dataset, report) = DatasetLoader::new(&fx.config()).load_with_report();
    assert!(dataset.is_empty());
    assert_eq!(report.outcome, LoadOutcome::NoFiles);

    let mut config = fx.config();
    config.data_dir = fx.data.path().join("missing");
    let (dataset, report) = DatasetLoader::new(&config).load_with_report();
    assert!(dataset.is_empty());
    assert_eq!(report.outcome, LoadOutcome::NoDataDir);
}

#[test]
fn test_only_invalid_files() {
    let fx = Fixture::new();
    fx.write(&file_name(0), &json!({"success": false, "result": {"download": 1.0}}).to_string());
    fx.write(&file_name(1), &json!({"success": true}).to_string());
    fx.write("speedtest-garbage.json", &json!({"success": true, "result": {}}).to_string());

    let loader = DatasetLoader::new(&fx.config());
    let (dataset, report) = loader.load_with_report();

    assert!(dataset.is_empty());
    assert_eq!(report.outcome, LoadOutcome::NothingValid);
    assert_eq!(report.rejected(), 3);
    assert!(!loader.cache().path().exists());
}

#[test]
fn test_unrelated_files_ignored() {
    let fx = Fixture::new();
    fx.write_measurement(0, 10_000_000.0);
    fx.write("README.md", "not a measurement");
    fx.write("speedtest-2024-01-15T10-05-00-000Z.json.partial", "{}");

    let loader = DatasetLoader::with_extractor(&fx.config(), CountingExtractor::default());
    let (dataset, report) = loader.load_with_report();
    assert_eq!(dataset.len(), 1);
    assert_eq!(report.files_on_disk, 1);
    assert_eq!(loader.extractor().calls(), 1);
}

#[test]
fn test_cache_is_per_data_dir() {
    let cache = tempdir().unwrap();
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();

    let store_a = CacheStore::new(cache.path(), a.path());
    let store_b = CacheStore::new(cache.path(), b.path());
    assert_ne!(store_a.path(), store_b.path());
    assert_eq!(store_a.path(), CacheStore::new(cache.path(), a.path()).path());
}

#[test]
fn test_dataset_serializes_without_source() {
    let fx = Fixture::new();
    fx.write_measurement(3, 50_000_000.0);
    fx.write_measurement(1, 40_000_000.0);

    let dataset = DatasetLoader::new(&fx.config()).load();
    let json = serde_json::to_value(dataset.rows()).unwrap();
    let rows = json.as_array().unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["download"], 40.0);
    assert_eq!(rows[1]["download"], 50.0);
    for row in rows {
        assert!(row.get("source_file").is_none());
        assert_eq!(row["endpoint"], "https://speed.example.net");
    }
}
