//! Incremental dataset loading.
//!
//! The loader ties the pipeline together: scan the data directory, consult
//! the cache, parse only files the cache has not seen, merge, re-save, and
//! hand back a sorted [`Dataset`].
//!
//! # Load Flow
//!
//! ```text
//! scan data_dir ──► no dir / no files ─────────────────────► empty
//!      │
//!      ▼
//! read cache ──► non-empty ──► new files? ── no ───────────► cached rows
//!      │                           │ yes
//!      │                           ▼
//!      │                     parse new files ──► append ──┐
//!      ▼                                                  │
//! parse all files ──► nothing valid ──────────────────────┼► empty (no write)
//!      │                                                  │
//!      └──────────────────────────────────────────────────┴► sort, save, rows
//! ```
//!
//! A file that fails to parse never enters the cache, so it is retried on
//! every later load.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::CacheStore;
use crate::config::DashboardConfig;
use crate::dataset::Dataset;
use crate::parallel::load_files;
use crate::record::{JsonExtractor, MeasurementRecord, RecordExtractor};
use crate::timestamp::{FILE_PREFIX, FILE_SUFFIX};

/// How a load was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The data directory does not exist.
    NoDataDir,
    /// The data directory holds no measurement files.
    NoFiles,
    /// The cache already covered every file on disk.
    CacheCurrent,
    /// New files were parsed and merged into the cached rows.
    Merged,
    /// No usable cache; every file was parsed.
    Rebuilt,
    /// No usable cache and no file produced a record.
    NothingValid,
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoDataDir => "data directory missing",
            Self::NoFiles => "no measurement files",
            Self::CacheCurrent => "cache current",
            Self::Merged => "merged new files into cache",
            Self::Rebuilt => "rebuilt from all files",
            Self::NothingValid => "no valid measurement files",
        };
        f.write_str(s)
    }
}

/// What a single load did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// How the load was satisfied.
    pub outcome: LoadOutcome,
    /// Measurement files found in the data directory.
    pub files_on_disk: usize,
    /// Rows that came from the cache.
    pub cached_rows: usize,
    /// Files handed to the extractor.
    pub files_parsed: usize,
    /// Records produced from parsed files.
    pub records_added: usize,
}

impl LoadReport {
    fn new(outcome: LoadOutcome, files_on_disk: usize) -> Self {
        Self {
            outcome,
            files_on_disk,
            cached_rows: 0,
            files_parsed: 0,
            records_added: 0,
        }
    }

    /// Parsed files that did not produce a record.
    pub fn rejected(&self) -> usize {
        self.files_parsed.saturating_sub(self.records_added)
    }
}

/// Loads the dataset for one data directory, reusing its cache.
#[derive(Debug)]
pub struct DatasetLoader<E = JsonExtractor> {
    data_dir: PathBuf,
    cache: CacheStore,
    extractor: E,
}

impl DatasetLoader<JsonExtractor> {
    /// Creates a loader for the configured data and cache directories.
    pub fn new(config: &DashboardConfig) -> Self {
        Self::with_extractor(config, JsonExtractor)
    }
}

impl<E: RecordExtractor> DatasetLoader<E> {
    /// Creates a loader with a custom extractor.
    pub fn with_extractor(config: &DashboardConfig, extractor: E) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            cache: CacheStore::new(&config.cache_dir, &config.data_dir),
            extractor,
        }
    }

    /// The data directory this loader scans.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The cache backing this loader.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// The extractor used for new files.
    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Loads the dataset. Never fails; the worst case is an empty dataset.
    pub fn load(&self) -> Dataset {
        self.load_with_report().0
    }

    /// Loads the dataset and reports how.
    pub fn load_with_report(&self) -> (Dataset, LoadReport) {
        let (dataset, report) = self.run();
        tracing::info!(
            data_dir = %self.data_dir.display(),
            rows = dataset.len(),
            files = report.files_on_disk,
            parsed = report.files_parsed,
            rejected = report.rejected(),
            "load finished: {}",
            report.outcome
        );
        (dataset, report)
    }

    fn run(&self) -> (Dataset, LoadReport) {
        let Some(files) = scan_measurement_files(&self.data_dir) else {
            return (Dataset::empty(), LoadReport::new(LoadOutcome::NoDataDir, 0));
        };
        if files.is_empty() {
            return (Dataset::empty(), LoadReport::new(LoadOutcome::NoFiles, 0));
        }
        let files_on_disk = files.len();

        let cached = self.cache.read().filter(|records| !records.is_empty());

        let (records, report) = match cached {
            Some(mut records) => {
                let known: HashSet<&str> = records.iter().map(|r| r.source_file.as_str()).collect();
                let new_files: Vec<PathBuf> = files
                    .iter()
                    .filter(|(name, _)| !known.contains(name.as_str()))
                    .map(|(_, path)| path.clone())
                    .collect();

                let mut report = LoadReport::new(LoadOutcome::CacheCurrent, files_on_disk);
                report.cached_rows = records.len();

                if new_files.is_empty() {
                    return (Dataset::from_records(records), report);
                }

                let added = load_files(&self.extractor, &new_files);
                report.outcome = LoadOutcome::Merged;
                report.files_parsed = new_files.len();
                report.records_added = added.len();
                records.extend(added);
                (records, report)
            }
            None => {
                let all: Vec<PathBuf> = files.into_values().collect();
                let records = load_files(&self.extractor, &all);

                let mut report = LoadReport::new(LoadOutcome::Rebuilt, files_on_disk);
                report.files_parsed = all.len();
                report.records_added = records.len();

                if records.is_empty() {
                    report.outcome = LoadOutcome::NothingValid;
                    return (Dataset::empty(), report);
                }
                (records, report)
            }
        };

        let mut records = records;
        records.sort_by_key(|r| r.timestamp);
        self.cache.write(&records);
        (Dataset::from_records(records), report)
    }
}

/// Lists `speedtest-*.json` files in `dir`, keyed by file name.
///
/// Returns `None` if the directory does not exist or cannot be listed.
fn scan_measurement_files(dir: &Path) -> Option<BTreeMap<String, PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("cannot list data directory '{}': {e}", dir.display());
            return None;
        }
    };

    let files = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let is_measurement = name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX);
            let is_file = entry.file_type().is_ok_and(|t| !t.is_dir());
            (is_measurement && is_file).then(|| (name, entry.path()))
        })
        .collect();
    Some(files)
}
