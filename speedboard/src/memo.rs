//! Time-bounded memoization of an expensive value.
//!
//! [`RefreshMemo`] keeps the last computed value together with the instant
//! it was stored. While the entry is younger than the TTL it is returned as
//! is; after that the next caller recomputes it.
//!
//! No lock is held while computing. Two callers that miss at the same time
//! both recompute and the later store wins, which is fine for values that
//! are deterministic snapshots of disk state.
//!
//! [`Dashboard`] wires a memo to a [`DatasetLoader`] so that frequent
//! renders within one refresh interval share a single load.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::config::DashboardConfig;
use crate::dataset::Dataset;
use crate::load::DatasetLoader;
use crate::record::{JsonExtractor, RecordExtractor};

/// A stored value and when it was stored.
#[derive(Debug)]
pub struct TimedEntry<T> {
    /// The memoized value.
    pub value: Arc<T>,
    /// When `value` was stored.
    pub stored_at: Instant,
}

impl<T> TimedEntry<T> {
    /// Returns true if the entry is younger than `ttl` at `now`.
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

impl<T> Clone for TimedEntry<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            stored_at: self.stored_at,
        }
    }
}

/// A single memoized value with a freshness window.
#[derive(Debug)]
pub struct RefreshMemo<T> {
    ttl: Duration,
    entry: RwLock<Option<TimedEntry<T>>>,
}

impl<T> RefreshMemo<T> {
    /// Creates an empty memo whose entries stay fresh for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// The freshness window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the stored value if it is fresh at `now`.
    pub fn get_fresh(&self, now: Instant) -> Option<Arc<T>> {
        let guard = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Returns the fresh value, or computes and stores a new one.
    pub fn get_or_refresh<F>(&self, compute: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        self.get_or_refresh_at(Instant::now(), compute)
    }

    /// Like [`get_or_refresh`](Self::get_or_refresh) with an explicit clock.
    pub fn get_or_refresh_at<F>(&self, now: Instant, compute: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        if let Some(value) = self.get_fresh(now) {
            return value;
        }

        let value = Arc::new(compute());
        let entry = TimedEntry {
            value: Arc::clone(&value),
            stored_at: now,
        };
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);
        value
    }

    /// Drops the stored value so the next call recomputes.
    pub fn invalidate(&self) {
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The current entry, fresh or not.
    pub fn entry(&self) -> Option<TimedEntry<T>> {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A dataset loader behind a refresh memo.
#[derive(Debug)]
pub struct Dashboard<E = JsonExtractor> {
    config: DashboardConfig,
    loader: DatasetLoader<E>,
    memo: RefreshMemo<Dataset>,
}

impl Dashboard<JsonExtractor> {
    /// Creates a dashboard reading JSON measurement files.
    pub fn new(config: DashboardConfig) -> Self {
        Self::with_extractor(config, JsonExtractor)
    }
}

impl<E: RecordExtractor> Dashboard<E> {
    /// Creates a dashboard with a custom extractor.
    pub fn with_extractor(config: DashboardConfig, extractor: E) -> Self {
        let loader = DatasetLoader::with_extractor(&config, extractor);
        let memo = RefreshMemo::new(config.memo_ttl());
        Self {
            config,
            loader,
            memo,
        }
    }

    /// The configuration this dashboard was built from.
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// The underlying loader.
    pub fn loader(&self) -> &DatasetLoader<E> {
        &self.loader
    }

    /// The memoized dataset, reloaded once it is older than the memo TTL.
    pub fn dataset(&self) -> Arc<Dataset> {
        self.dataset_at(Instant::now())
    }

    /// Like [`dataset`](Self::dataset) with an explicit clock.
    pub fn dataset_at(&self, now: Instant) -> Arc<Dataset> {
        self.memo.get_or_refresh_at(now, || {
            tracing::debug!("dataset memo expired, reloading");
            self.loader.load()
        })
    }

    /// Forces the next [`dataset`](Self::dataset) call to reload.
    pub fn invalidate(&self) {
        self.memo.invalidate();
    }
}
