//! Error types for the speedboard loading pipeline.
//!
//! Most pipeline entry points are deliberately infallible: a bad input file,
//! a corrupt cache or an unwritable temp directory is logged and treated as
//! "nothing there". The types below are what the fallible variants of those
//! entry points report, and what configuration and aggregation return.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all speedboard operations.
#[derive(Error, Debug)]
pub enum SpeedboardError {
    /// Error building or validating configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error reading or writing the cache snapshot.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Error extracting a record from a measurement file.
    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Error during interval aggregation.
    #[error("aggregate error: {0}")]
    Aggregate(#[from] AggregateError),
}

/// Errors that can occur while building a [`DashboardConfig`](crate::config::DashboardConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An environment value could not be parsed.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// The configuration key (environment variable name).
        key: &'static str,
        /// The raw value found.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The data directory path is empty.
    #[error("data directory path must not be empty")]
    EmptyDataDir,
}

/// Errors that can occur while reading or writing the cache snapshot.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The snapshot file could not be read.
    #[error("failed to read cache '{}': {source}", path.display())]
    Read {
        /// The cache file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file is not valid JSON for the snapshot format.
    #[error("failed to parse cache '{}': {source}", path.display())]
    Parse {
        /// The cache file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot parsed but its contents are inconsistent.
    #[error("cache '{}' is corrupted: {reason}", path.display())]
    Corrupted {
        /// The cache file path.
        path: PathBuf,
        /// Description of the inconsistency.
        reason: String,
    },

    /// The snapshot could not be serialized.
    #[error("failed to serialize cache snapshot: {source}")]
    Serialize {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot file could not be written.
    #[error("failed to write cache '{}': {source}", path.display())]
    Write {
        /// The cache file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Reasons a measurement file does not produce a record.
///
/// None of these are fatal: the loader logs them and moves on, and the file
/// is retried on the next load.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The file name does not carry a decodable timestamp.
    #[error("file name '{name}' does not encode a timestamp")]
    BadFileName {
        /// The offending file name.
        name: String,
    },

    /// The file could not be read.
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON.
    #[error("failed to parse '{}': {source}", path.display())]
    Json {
        /// The file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The document is valid JSON but not shaped like a measurement.
    #[error("'{}' is not a measurement document: {reason}", path.display())]
    Malformed {
        /// The file path.
        path: PathBuf,
        /// What was wrong with the document.
        reason: String,
    },

    /// The measurement reports `success: false` (or no success flag).
    #[error("'{}' records a failed measurement", path.display())]
    Unsuccessful {
        /// The file path.
        path: PathBuf,
    },
}

/// Errors that can occur during interval aggregation.
#[derive(Error, Debug)]
pub enum AggregateError {
    /// The interval width is zero.
    #[error("invalid interval: {minutes} minutes (must be > 0)")]
    InvalidInterval {
        /// The rejected width in minutes.
        minutes: u32,
    },
}

/// Type alias for `Result<T, SpeedboardError>`.
pub type Result<T> = std::result::Result<T, SpeedboardError>;
