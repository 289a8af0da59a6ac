//! The public, sorted table of measurements handed to presentation code.
//!
//! A [`Dataset`] never carries source file names: rows are [`Measurement`]s,
//! which have no such field. Rows are always ordered by ascending timestamp.

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::metrics::{Metric, MetricValues};
use crate::record::MeasurementRecord;

/// Number of rows one complete speedtest run produces.
pub const DEFAULT_RUN_SIZE: usize = 5;

/// One measurement as exposed to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// When the measurement was taken.
    pub timestamp: DateTime<Utc>,
    /// Runner session identifier, if reported.
    pub session_id: Option<String>,
    /// Endpoint the test ran against, if reported.
    pub endpoint: Option<String>,
    /// Converted metric values.
    pub metrics: MetricValues,
}

impl From<MeasurementRecord> for Measurement {
    fn from(record: MeasurementRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            session_id: record.session_id,
            endpoint: record.endpoint,
            metrics: record.metrics,
        }
    }
}

impl Serialize for Measurement {
    /// Serializes with the dashboard's column names; absent fields are omitted.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("timestamp", &self.timestamp.to_rfc3339())?;
        if let Some(session_id) = &self.session_id {
            map.serialize_entry("sessionID", session_id)?;
        }
        if let Some(endpoint) = &self.endpoint {
            map.serialize_entry("endpoint", endpoint)?;
        }
        for (metric, value) in self.metrics.iter() {
            map.serialize_entry(metric.key(), &value)?;
        }
        map.end()
    }
}

/// Mean of each metric over the most recent rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestSummary {
    /// Timestamp of the most recent row.
    pub recorded_at: DateTime<Utc>,
    /// Number of rows averaged.
    pub rows: usize,
    /// Per-metric means; a metric absent from every averaged row is absent.
    pub means: MetricValues,
}

/// Measurements sorted by ascending timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<Measurement>,
}

impl Dataset {
    /// Creates an empty dataset.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a dataset from records, sorting them and dropping source names.
    ///
    /// The sort is stable, so records with equal timestamps keep their
    /// input order.
    pub fn from_records(mut records: Vec<MeasurementRecord>) -> Self {
        records.sort_by_key(|r| r.timestamp);
        Self {
            rows: records.into_iter().map(Measurement::from).collect(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows, oldest first.
    pub fn rows(&self) -> &[Measurement] {
        &self.rows
    }

    /// Iterates over rows, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.rows.iter()
    }

    /// Timestamp of the oldest and newest rows.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.rows.first()?.timestamp, self.rows.last()?.timestamp))
    }

    /// Metrics that have a value in at least one row, in column order.
    pub fn metric_columns(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|&m| self.rows.iter().any(|row| row.metrics.get(m).is_some()))
            .collect()
    }

    /// The `count` most recent rows, most recent first.
    pub fn latest(&self, count: usize) -> Vec<&Measurement> {
        self.rows.iter().rev().take(count).collect()
    }

    /// Averages each metric over the last `run_size` rows.
    ///
    /// Returns `None` for an empty dataset or a zero `run_size`.
    pub fn latest_summary(&self, run_size: usize) -> Option<LatestSummary> {
        let last = self.rows.last()?;
        if run_size == 0 {
            return None;
        }
        let start = self.rows.len().saturating_sub(run_size);
        let tail = &self.rows[start..];

        Some(LatestSummary {
            recorded_at: last.timestamp,
            rows: tail.len(),
            means: mean_by_metric(tail.iter().map(|row| &row.metrics)),
        })
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Arithmetic mean of each metric, ignoring rows where it is absent.
#[allow(clippy::cast_precision_loss)] // Row counts are far below 2^52
pub(crate) fn mean_by_metric<'a, I>(rows: I) -> MetricValues
where
    I: IntoIterator<Item = &'a MetricValues>,
{
    let mut sums = [0.0f64; Metric::COUNT];
    let mut counts = [0usize; Metric::COUNT];
    for values in rows {
        for (metric, value) in values.iter() {
            sums[metric.index()] += value;
            counts[metric.index()] += 1;
        }
    }

    let mut means = MetricValues::new();
    for metric in Metric::ALL {
        let i = metric.index();
        if counts[i] > 0 {
            means.set(metric, sums[i] / counts[i] as f64);
        }
    }
    means
}
