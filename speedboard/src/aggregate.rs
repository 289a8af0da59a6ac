//! Fixed-width interval aggregation.
//!
//! A speedtest run produces several measurements a few seconds apart. For
//! charts these are collapsed into one point per interval: each row is
//! assigned to the window its timestamp floors into (on the Unix epoch
//! grid), and every metric is averaged over the rows in that window that
//! have it.
//!
//! ```text
//! 10:00:00 ─┐
//! 10:01:00 ─┴─► bucket 10:00
//! 10:11:00 ───► bucket 10:10
//! 10:21:00 ───► bucket 10:20
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::dataset::{Dataset, mean_by_metric};
use crate::error::{AggregateError, Result};
use crate::metrics::MetricValues;

/// Default bucket width in minutes.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 10;

/// One aggregated interval.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedBucket {
    /// Start of the interval.
    pub timestamp: DateTime<Utc>,
    /// Number of rows that fell into the interval.
    pub count: usize,
    /// Per-metric means over the rows that have each metric.
    pub means: MetricValues,
}

impl Serialize for AggregatedBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("timestamp", &self.timestamp.to_rfc3339())?;
        map.serialize_entry("count", &self.count)?;
        for (metric, value) in self.means.iter() {
            map.serialize_entry(metric.key(), &value)?;
        }
        map.end()
    }
}

/// Start of the `width_ms` window containing `ts`.
fn bucket_start(ts: DateTime<Utc>, width_ms: i64) -> Option<DateTime<Utc>> {
    let millis = ts.timestamp_millis();
    let floored = millis.div_euclid(width_ms) * width_ms;
    Utc.timestamp_millis_opt(floored).single()
}

/// Groups `dataset` into `interval_minutes`-wide buckets and averages each metric.
///
/// Buckets are returned in ascending order; an empty dataset yields no
/// buckets.
///
/// # Errors
///
/// Returns [`AggregateError::InvalidInterval`] if `interval_minutes` is zero.
pub fn aggregate_to_intervals(
    dataset: &Dataset,
    interval_minutes: u32,
) -> Result<Vec<AggregatedBucket>> {
    if interval_minutes == 0 {
        return Err(AggregateError::InvalidInterval {
            minutes: interval_minutes,
        }
        .into());
    }
    let width_ms = i64::from(interval_minutes) * 60_000;

    let mut windows: BTreeMap<DateTime<Utc>, Vec<&MetricValues>> = BTreeMap::new();
    for row in dataset {
        // Floor of a representable instant is representable for any
        // realistic width; anything else is skipped rather than misfiled.
        let Some(start) = bucket_start(row.timestamp, width_ms) else {
            continue;
        };
        windows.entry(start).or_default().push(&row.metrics);
    }

    Ok(windows
        .into_iter()
        .map(|(timestamp, rows)| AggregatedBucket {
            timestamp,
            count: rows.len(),
            means: mean_by_metric(rows),
        })
        .collect())
}
