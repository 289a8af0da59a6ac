//! Extraction of one measurement file into a flat record.
//!
//! A measurement file is a JSON document written by the speedtest runner:
//!
//! ```text
//! {
//!   "success": true,
//!   "sessionID": "6f1c…",
//!   "endpoint": "https://…",
//!   "result": { "download": 51234567, "upload": 9876543, "latency": 12.3, … }
//! }
//! ```
//!
//! The timestamp comes from the file name, not the payload. Byte-rate metrics
//! are converted to Mbps; latency and jitter pass through unchanged. Every
//! kind of bad file is an expected outcome when scanning a live directory,
//! so [`RecordExtractor::extract`] returns `None` rather than an error.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::ExtractError;
use crate::metrics::{METRICS, MetricValues};
use crate::timestamp::parse_filename_timestamp;

/// One parsed measurement file.
///
/// `source_file` is the originating file name. It is the cache's
/// de-duplication key and is stripped before records reach consumers
/// (see [`Measurement`](crate::dataset::Measurement)).
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    /// When the measurement was taken (from the file name).
    pub timestamp: DateTime<Utc>,
    /// File name the record was parsed from.
    pub source_file: String,
    /// Runner session identifier, if reported.
    pub session_id: Option<String>,
    /// Endpoint the test ran against, if reported.
    pub endpoint: Option<String>,
    /// Converted metric values.
    pub metrics: MetricValues,
}

/// Turns one file into a [`MeasurementRecord`].
///
/// Implementations must be callable from several loader threads at once.
pub trait RecordExtractor: Sync {
    /// Extracts a record, or `None` if the file is not a usable measurement.
    fn extract(&self, path: &Path) -> Option<MeasurementRecord>;
}

/// The default extractor for JSON speedtest result files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExtractor;

impl JsonExtractor {
    /// Extracts a record, reporting why the file was rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if the file name carries no timestamp, the
    /// file cannot be read or parsed, the document is not a successful
    /// measurement, or a known metric has a non-numeric value.
    pub fn try_extract(&self, path: &Path) -> Result<MeasurementRecord, ExtractError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let content = fs::read_to_string(path).map_err(|e| ExtractError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let document: Value = serde_json::from_str(&content).map_err(|e| ExtractError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;

        let Value::Object(document) = document else {
            return Err(malformed(path, "top level is not an object"));
        };

        if document.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(ExtractError::Unsuccessful {
                path: path.to_path_buf(),
            });
        }

        let result = match document.get("result") {
            Some(Value::Object(result)) => result,
            Some(_) => return Err(malformed(path, "'result' is not an object")),
            None => return Err(malformed(path, "missing 'result'")),
        };

        let timestamp = parse_filename_timestamp(&name)
            .ok_or_else(|| ExtractError::BadFileName { name: name.clone() })?;

        Ok(MeasurementRecord {
            timestamp,
            source_file: name,
            session_id: text_field(&document, "sessionID"),
            endpoint: text_field(&document, "endpoint"),
            metrics: convert_metrics(path, result)?,
        })
    }
}

impl RecordExtractor for JsonExtractor {
    fn extract(&self, path: &Path) -> Option<MeasurementRecord> {
        match self.try_extract(path) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("skipping measurement file: {e}");
                None
            }
        }
    }
}

/// Converts every known metric present in `result`; unknown keys are ignored.
///
/// A known metric set to `null` is treated as absent.
fn convert_metrics(path: &Path, result: &Map<String, Value>) -> Result<MetricValues, ExtractError> {
    let mut values = MetricValues::new();
    for spec in &METRICS {
        let Some(raw) = result.get(spec.key).filter(|v| !v.is_null()) else {
            continue;
        };
        let raw = raw
            .as_f64()
            .ok_or_else(|| malformed(path, &format!("metric '{}' is not a number", spec.key)))?;
        values.set(spec.metric, spec.conversion.apply(raw));
    }
    Ok(values)
}

/// Copies an optional top-level field verbatim.
///
/// Strings are taken as-is, null and absent become `None`, anything else is
/// kept as its JSON text.
fn text_field(document: &Map<String, Value>, key: &str) -> Option<String> {
    match document.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn malformed(path: &Path, reason: &str) -> ExtractError {
    ExtractError::Malformed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
