//! # speedboard
//!
//! Loading pipeline for a network speedtest dashboard.
//!
//! A speedtest runner drops one JSON file per measurement into a data
//! directory, named after the instant it was taken
//! (`speedtest-2024-01-15T10-30-00-123Z.json`). speedboard turns that
//! directory into a sorted table of measurements, keeping a snapshot cache
//! so that each file is parsed once, and offers the aggregations the
//! dashboard renders.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Incremental: only files the cache has not seen are parsed
//! - Bounded parallel parsing, at most 32 worker threads
//! - Failure-tolerant: bad files, corrupt caches and unwritable cache
//!   directories degrade to "nothing there", never to an error
//! - Loads are memoized for one refresh interval
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use speedboard::{Dashboard, DashboardConfig, aggregate_to_intervals};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DashboardConfig::from_env()?;
//! let dashboard = Dashboard::new(config);
//!
//! let dataset = dashboard.dataset();
//! if let Some(summary) = dataset.latest_summary(speedboard::dataset::DEFAULT_RUN_SIZE) {
//!     println!("latest run at {}", summary.recorded_at);
//! }
//!
//! for bucket in aggregate_to_intervals(&dataset, 10)? {
//!     println!("{}: {} rows", bucket.timestamp, bucket.count);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`DatasetLoader`] — Scans the data directory, merges with the cache, returns a [`Dataset`]
//! - [`Dashboard`] — A loader behind a refresh memo
//! - [`Dataset`] — Sorted [`Measurement`] rows with summary helpers
//! - [`aggregate_to_intervals`] — Fixed-width bucket means
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`metrics`] — The metric table: payload keys, units, conversions
//! - [`timestamp`] — File name timestamp parsing
//! - [`record`] — Per-file record extraction
//! - [`parallel`] — Bounded parallel extraction
//! - [`cache`] — Snapshot cache keyed by data directory
//! - [`load`] — Incremental dataset loading
//! - [`dataset`] — The public dataset shape
//! - [`aggregate`] — Interval aggregation
//! - [`memo`] — Time-bounded memoization and the dashboard handle
//! - [`config`] — Configuration
//! - [`error`] — Error types

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod load;
pub mod memo;
pub mod metrics;
pub mod parallel;
pub mod record;
pub mod timestamp;

// Re-export primary API types at crate root for convenience.
pub use aggregate::{AggregatedBucket, aggregate_to_intervals};
pub use config::DashboardConfig;
pub use dataset::{Dataset, LatestSummary, Measurement};
pub use error::{Result, SpeedboardError};
pub use load::{DatasetLoader, LoadOutcome, LoadReport};
pub use memo::{Dashboard, RefreshMemo};
pub use metrics::{Metric, MetricValues};
pub use record::{JsonExtractor, MeasurementRecord, RecordExtractor};
