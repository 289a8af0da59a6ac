//! Bounded parallel extraction of a batch of measurement files.
//!
//! Workers are scoped threads that pull file indices from a shared counter,
//! so a backlog of thousands of files never spawns more than
//! [`MAX_WORKERS`] threads. Each extraction is independent; results are
//! gathered over a channel in completion order, and the caller is expected
//! to sort them.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::record::{MeasurementRecord, RecordExtractor};

/// Upper bound on concurrent extraction workers.
pub const MAX_WORKERS: usize = 32;

/// Number of workers used for a batch of `file_count` files.
///
/// ```rust
/// use speedboard::parallel::worker_count;
///
/// assert_eq!(worker_count(0), 0);
/// assert_eq!(worker_count(3), 3);
/// assert_eq!(worker_count(10_000), 32);
/// ```
pub fn worker_count(file_count: usize) -> usize {
    file_count.min(MAX_WORKERS)
}

/// Extracts every file in `paths`, keeping only the files that produce a record.
///
/// Output order is unspecified. A file that fails to extract, or whose
/// extraction panics, is dropped without affecting the rest of the batch.
pub fn load_files<E: RecordExtractor + ?Sized>(
    extractor: &E,
    paths: &[PathBuf],
) -> Vec<MeasurementRecord> {
    let workers = worker_count(paths.len());
    if workers == 0 {
        return Vec::new();
    }

    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();

    thread::scope(|s| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            s.spawn(move || {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(path) = paths.get(index) else {
                        break;
                    };
                    if let Some(record) = extract_contained(extractor, path) {
                        // Receiver outlives the scope; send cannot fail here.
                        let _ = tx.send(record);
                    }
                }
            });
        }
    });
    drop(tx);

    let records: Vec<_> = rx.into_iter().collect();
    tracing::debug!(
        "extracted {} record(s) from {} file(s) with {workers} worker(s)",
        records.len(),
        paths.len()
    );
    records
}

/// Runs one extraction, turning a panic into "no record".
fn extract_contained<E: RecordExtractor + ?Sized>(
    extractor: &E,
    path: &Path,
) -> Option<MeasurementRecord> {
    match catch_unwind(AssertUnwindSafe(|| extractor.extract(path))) {
        Ok(record) => record,
        Err(_) => {
            tracing::warn!("extractor panicked on '{}'", path.display());
            None
        }
    }
}
