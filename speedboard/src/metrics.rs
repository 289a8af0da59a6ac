//! The fixed set of metrics a speedtest result can carry.
//!
//! Each metric has a payload key, a display name, a unit, and a pure
//! conversion from the raw payload value to the unit shown to users. The
//! table is static: adding a metric means adding a [`Metric`] variant and a
//! row in [`METRICS`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unit a converted metric value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Megabits per second.
    Mbps,
    /// Milliseconds.
    Ms,
}

impl Unit {
    /// Short label used in table headers.
    pub fn label(self) -> &'static str {
        match self {
            Self::Mbps => "Mbps",
            Self::Ms => "ms",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Numeric transform applied to a raw payload value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversion {
    /// Raw value is a byte rate; divide by 1,000,000 to get Mbps.
    BytesPerSecToMbps,
    /// Raw value is already in the target unit.
    Identity,
}

impl Conversion {
    /// Applies this conversion to a raw payload value.
    ///
    /// ```rust
    /// use speedboard::metrics::Conversion;
    ///
    /// assert_eq!(Conversion::BytesPerSecToMbps.apply(50_000_000.0), 50.0);
    /// assert_eq!(Conversion::Identity.apply(12.5), 12.5);
    /// ```
    pub fn apply(self, raw: f64) -> f64 {
        match self {
            Self::BytesPerSecToMbps => raw / 1_000_000.0,
            Self::Identity => raw,
        }
    }
}

/// A known speedtest metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Download throughput.
    #[serde(rename = "download")]
    Download,
    /// Upload throughput.
    #[serde(rename = "upload")]
    Upload,
    /// Idle round-trip latency.
    #[serde(rename = "latency")]
    Latency,
    /// Idle latency jitter.
    #[serde(rename = "jitter")]
    Jitter,
    /// Latency measured while downloading.
    #[serde(rename = "downLoadedLatency")]
    DownLoadedLatency,
    /// Jitter measured while downloading.
    #[serde(rename = "downLoadedJitter")]
    DownLoadedJitter,
    /// Latency measured while uploading.
    #[serde(rename = "upLoadedLatency")]
    UpLoadedLatency,
    /// Jitter measured while uploading.
    #[serde(rename = "upLoadedJitter")]
    UpLoadedJitter,
}

/// Static description of one metric.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    /// The metric this row describes.
    pub metric: Metric,
    /// Key used in the payload's `result` object and in column names.
    pub key: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Unit of the converted value.
    pub unit: Unit,
    /// Transform from raw payload value to `unit`.
    pub conversion: Conversion,
}

/// All known metrics, in column order.
pub const METRICS: [MetricSpec; Metric::COUNT] = [
    MetricSpec {
        metric: Metric::Download,
        key: "download",
        name: "Download",
        unit: Unit::Mbps,
        conversion: Conversion::BytesPerSecToMbps,
    },
    MetricSpec {
        metric: Metric::Upload,
        key: "upload",
        name: "Upload",
        unit: Unit::Mbps,
        conversion: Conversion::BytesPerSecToMbps,
    },
    MetricSpec {
        metric: Metric::Latency,
        key: "latency",
        name: "Latency",
        unit: Unit::Ms,
        conversion: Conversion::Identity,
    },
    MetricSpec {
        metric: Metric::Jitter,
        key: "jitter",
        name: "Jitter",
        unit: Unit::Ms,
        conversion: Conversion::Identity,
    },
    MetricSpec {
        metric: Metric::DownLoadedLatency,
        key: "downLoadedLatency",
        name: "Loaded Latency (Down)",
        unit: Unit::Ms,
        conversion: Conversion::Identity,
    },
    MetricSpec {
        metric: Metric::DownLoadedJitter,
        key: "downLoadedJitter",
        name: "Loaded Jitter (Down)",
        unit: Unit::Ms,
        conversion: Conversion::Identity,
    },
    MetricSpec {
        metric: Metric::UpLoadedLatency,
        key: "upLoadedLatency",
        name: "Loaded Latency (Up)",
        unit: Unit::Ms,
        conversion: Conversion::Identity,
    },
    MetricSpec {
        metric: Metric::UpLoadedJitter,
        key: "upLoadedJitter",
        name: "Loaded Jitter (Up)",
        unit: Unit::Ms,
        conversion: Conversion::Identity,
    },
];

impl Metric {
    /// Number of known metrics.
    pub const COUNT: usize = 8;

    /// All metrics in column order.
    pub const ALL: [Metric; Self::COUNT] = [
        Self::Download,
        Self::Upload,
        Self::Latency,
        Self::Jitter,
        Self::DownLoadedLatency,
        Self::DownLoadedJitter,
        Self::UpLoadedLatency,
        Self::UpLoadedJitter,
    ];

    /// Position of this metric in [`METRICS`] and in [`MetricValues`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Static description of this metric.
    pub fn spec(self) -> &'static MetricSpec {
        &METRICS[self.index()]
    }

    /// Payload / column key.
    pub fn key(self) -> &'static str {
        self.spec().key
    }

    /// Looks up a metric by its exact payload key.
    ///
    /// ```rust
    /// use speedboard::metrics::Metric;
    ///
    /// assert_eq!(Metric::from_key("upLoadedJitter"), Some(Metric::UpLoadedJitter));
    /// assert_eq!(Metric::from_key("Download"), None);
    /// ```
    pub fn from_key(key: &str) -> Option<Self> {
        METRICS.iter().find(|spec| spec.key == key).map(|spec| spec.metric)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One optional value per known metric.
///
/// Absent metrics stay `None`; they are never defaulted to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricValues([Option<f64>; Metric::COUNT]);

impl MetricValues {
    /// Creates an empty set of values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `metric`, if present.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.0[metric.index()]
    }

    /// Sets the value for `metric`.
    pub fn set(&mut self, metric: Metric, value: f64) {
        self.0[metric.index()] = Some(value);
    }

    /// Clears the value for `metric`.
    pub fn clear(&mut self, metric: Metric) {
        self.0[metric.index()] = None;
    }

    /// Iterates over the metrics that have a value.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL
            .iter()
            .filter_map(|&metric| self.get(metric).map(|value| (metric, value)))
    }

    /// Returns true if no metric has a value.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

impl FromIterator<(Metric, f64)> for MetricValues {
    fn from_iter<I: IntoIterator<Item = (Metric, f64)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (metric, value) in iter {
            values.set(metric, value);
        }
        values
    }
}
