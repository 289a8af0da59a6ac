//! Timestamps encoded in measurement file names.
//!
//! The speedtest writer names each result after the moment it was taken,
//! using an ISO 8601 instant with the `:` and `.` separators replaced by
//! `-` so the name is valid on every filesystem:
//!
//! ```text
//! speedtest-2024-01-15T10-30-00-000Z.json
//!           └──date──┘ └──time───┘
//! ```
//!
//! Decoding is strict about shape (exact digit counts, separators, prefix
//! and suffix) and about calendar validity. Anything else is "no timestamp",
//! never a panic.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

/// File name prefix of every measurement file.
pub const FILE_PREFIX: &str = "speedtest-";

/// File name suffix of every measurement file.
pub const FILE_SUFFIX: &str = ".json";

/// Decodes the timestamp from a measurement file name.
///
/// Returns `None` if the name does not have the exact
/// `speedtest-YYYY-MM-DDTHH-MM-SS-mmmZ.json` shape or encodes an impossible
/// date or time.
///
/// ```rust
/// use speedboard::timestamp::parse_filename_timestamp;
///
/// let ts = parse_filename_timestamp("speedtest-2024-01-15T10-30-00-000Z.json").unwrap();
/// assert_eq!(ts.to_rfc3339(), "2024-01-15T10:30:00+00:00");
///
/// assert!(parse_filename_timestamp("speedtest-2024-1-15T10-30-00-000Z.json").is_none());
/// assert!(parse_filename_timestamp("notes.txt").is_none());
/// ```
pub fn parse_filename_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let body = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let (date, time) = body.split_once('T')?;
    let time = time.strip_suffix('Z')?;

    let [year, month, day] = split_fields::<3>(date, [4, 2, 2])?;
    let [hour, minute, second, millis] = split_fields::<4>(time, [2, 2, 2, 3])?;

    let date = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?;
    let time = NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?;

    Some(NaiveDateTime::new(date, time).and_utc())
}

/// Encodes a timestamp as a measurement file name.
///
/// Sub-millisecond precision is dropped, matching what the writer records.
/// Years outside `0..=9999` cannot be encoded and return `None`.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use speedboard::timestamp::encode_filename;
///
/// let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
/// assert_eq!(encode_filename(ts).unwrap(), "speedtest-2024-01-15T10-30-00-000Z.json");
/// ```
pub fn encode_filename(ts: DateTime<Utc>) -> Option<String> {
    if !(0..=9999).contains(&ts.year()) {
        return None;
    }
    let millis = ts.nanosecond() / 1_000_000 % 1000;
    Some(format!(
        "{FILE_PREFIX}{}-{:03}Z{FILE_SUFFIX}",
        ts.format("%Y-%m-%dT%H-%M-%S"),
        millis
    ))
}

/// Splits `s` on `-` into exactly `N` all-digit fields of the given widths.
fn split_fields<const N: usize>(s: &str, widths: [usize; N]) -> Option<[u32; N]> {
    let mut out = [0u32; N];
    let mut parts = s.split('-');
    for (slot, width) in out.iter_mut().zip(widths) {
        let part = parts.next()?;
        if part.len() != width || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}
