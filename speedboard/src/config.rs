//! Dashboard configuration.
//!
//! Configuration is an explicit value handed to the loader; nothing in the
//! pipeline reads process state on its own. [`DashboardConfig::from_env`]
//! is the one place environment variables are consulted:
//!
//! | variable | default | meaning |
//! |----------|---------|---------|
//! | `DATA_DIR` | `/data` | directory holding `speedtest-*.json` files |
//! | `REFRESH_INTERVAL_SECONDS` | `60` | how often the dashboard refreshes |
//! | `SPEEDBOARD_CACHE_DIR` | system temp dir | where the cache snapshot lives |

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Default refresh interval in seconds.
pub const DEFAULT_REFRESH_SECS: u64 = 60;

/// Shortest memoization window, regardless of refresh interval.
pub const MIN_MEMO_TTL: Duration = Duration::from_secs(5);

/// How much earlier than the refresh interval the memo expires.
const MEMO_LEAD: Duration = Duration::from_secs(5);

const DATA_DIR_VAR: &str = "DATA_DIR";
const REFRESH_VAR: &str = "REFRESH_INTERVAL_SECONDS";
const CACHE_DIR_VAR: &str = "SPEEDBOARD_CACHE_DIR";

/// Configuration for loading and refreshing a dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    /// Directory scanned for measurement files.
    pub data_dir: PathBuf,
    /// Dashboard refresh interval.
    pub refresh_interval: Duration,
    /// Directory the cache snapshot is written to.
    pub cache_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
            cache_dir: std::env::temp_dir(),
        }
    }
}

impl DashboardConfig {
    /// Creates a configuration for `data_dir`, caching in the system temp dir.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyDataDir`] if `data_dir` is empty.
    pub fn new<P: Into<PathBuf>>(data_dir: P, refresh_interval: Duration) -> Result<Self> {
        let config = Self {
            data_dir: data_dir.into(),
            refresh_interval,
            cache_dir: std::env::temp_dir(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration from an arbitrary key lookup.
    ///
    /// Unset and empty values fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the refresh interval is not
    /// a non-negative integer.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use speedboard::config::DashboardConfig;
    ///
    /// let config = DashboardConfig::from_lookup(|key| match key {
    ///     "DATA_DIR" => Some("/srv/speedtest".to_string()),
    ///     "REFRESH_INTERVAL_SECONDS" => Some("30".to_string()),
    ///     _ => None,
    /// })?;
    /// assert_eq!(config.refresh_interval, Duration::from_secs(30));
    /// # Ok::<(), speedboard::SpeedboardError>(())
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(DATA_DIR_VAR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(REFRESH_VAR) {
            let secs: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: REFRESH_VAR,
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
            config.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(dir) = get(CACHE_DIR_VAR) {
            config.cache_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyDataDir`] if the data directory is empty.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDataDir.into());
        }
        Ok(())
    }

    /// How long a loaded dataset stays fresh: the refresh interval minus
    /// five seconds, but never less than five seconds.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use speedboard::config::DashboardConfig;
    ///
    /// let mut config = DashboardConfig::default();
    /// assert_eq!(config.memo_ttl(), Duration::from_secs(55));
    /// config.refresh_interval = Duration::from_secs(3);
    /// assert_eq!(config.memo_ttl(), Duration::from_secs(5));
    /// ```
    pub fn memo_ttl(&self) -> Duration {
        self.refresh_interval
            .saturating_sub(MEMO_LEAD)
            .max(MIN_MEMO_TTL)
    }
}
