//! # Core Configuration Module
//!
//! Configuration for the search index sync core.
//!
//! ## Overview
//!
//! A builder constructs a [`CoreConfig`] holding the catalog database
//! location, the [`SyncOptions`] that drive both pipelines, and the host
//! capabilities the coordinator needs. Validation is fail-fast: a bad batch
//! size or an unparseable `sync_interval` is rejected at build time rather
//! than when the scheduler first fires.
//!
//! ## Required
//!
//! - Database location (`database_path` or `in_memory`)
//! - `BackgroundExecutor` when scheduled sync is enabled
//!
//! When the `desktop-shims` feature is enabled, a tokio-backed executor is
//! injected automatically if none was provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SyncOptions};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/reelsync/catalog.db")
//!     .sync_options(SyncOptions::default().with_batch_size(250))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;
use crate::schedule::Schedule;
use bridge_traits::{BackgroundExecutor, Clock, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default cadence of the scheduled incremental sync: every two hours.
pub const DEFAULT_SYNC_INTERVAL: &str = "0 */2 * * *";

/// Tuning knobs for the full and incremental pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Max entities per index call
    pub batch_size: usize,

    /// Register the recurring incremental sync on initialize
    pub enable_scheduled_sync: bool,

    /// Cron or interval expression for the recurring sync
    pub sync_interval: String,

    /// Advisory flag for callers deciding whether to sync after their own writes
    pub auto_sync: bool,

    /// Pause between full-sync movie pages
    pub batch_delay: Duration,

    /// Pause between per-movie episode fetches in full sync
    pub movie_delay: Duration,

    /// Look-back window for incremental sync when no checkpoint exists
    pub fallback_window: chrono::Duration,

    /// Emit a progress log line every N episodes during full sync
    pub progress_log_every: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            enable_scheduled_sync: true,
            sync_interval: DEFAULT_SYNC_INTERVAL.to_string(),
            auto_sync: false,
            batch_delay: Duration::from_millis(100),
            movie_delay: Duration::from_millis(10),
            fallback_window: chrono::Duration::days(7),
            progress_log_every: 1000,
        }
    }
}

impl SyncOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_scheduled_sync(mut self, enabled: bool) -> Self {
        self.enable_scheduled_sync = enabled;
        self
    }

    pub fn with_sync_interval(mut self, expression: impl Into<String>) -> Self {
        self.sync_interval = expression.into();
        self
    }

    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    /// Set both pacing delays; zero disables pacing.
    pub fn with_delays(mut self, batch_delay: Duration, movie_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self.movie_delay = movie_delay;
        self
    }

    pub fn with_fallback_window(mut self, window: chrono::Duration) -> Self {
        self.fallback_window = window;
        self
    }

    pub fn with_progress_log_every(mut self, episodes: usize) -> Self {
        self.progress_log_every = episodes;
        self
    }

    /// Parse `sync_interval`.
    pub fn schedule(&self) -> Result<Schedule> {
        Schedule::parse(&self.sync_interval)
    }

    /// Validates the options.
    ///
    /// This checks:
    /// - Batch size is greater than 0
    /// - Sync interval parses, even when scheduling is disabled
    /// - Fallback window is not negative
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        self.schedule()?;

        if self.fallback_window < chrono::Duration::zero() {
            return Err(Error::Config(
                "Fallback window cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Where the catalog database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// SQLite database file, created if missing
    File(PathBuf),
    /// Private in-memory database
    InMemory,
}

/// Core configuration for the sync service.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Catalog database location
    pub database: DatabaseLocation,

    /// Pipeline options
    pub sync: SyncOptions,

    /// Recurring task executor (required when scheduled sync is enabled)
    pub background_executor: Option<Arc<dyn BackgroundExecutor>>,

    /// Time source for watermarks
    pub clock: Arc<dyn Clock>,

    /// Install a global tracing subscriber on bootstrap when set
    pub logging: Option<LoggingConfig>,

    /// Event bus buffer size
    pub event_bus_capacity: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database", &self.database)
            .field("sync", &self.sync)
            .field(
                "background_executor",
                &self
                    .background_executor
                    .as_ref()
                    .map(|_| "BackgroundExecutor { ... }"),
            )
            .field("clock", &"Clock { ... }")
            .field("logging", &self.logging)
            .field("event_bus_capacity", &self.event_bus_capacity)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        self.sync.validate()?;

        if self.event_bus_capacity == 0 {
            return Err(Error::Config(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.sync.enable_scheduled_sync && self.background_executor.is_none() {
            return Err(background_executor_missing_error());
        }

        Ok(())
    }
}

fn background_executor_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "BackgroundExecutor".to_string(),
        message: "Scheduled sync is enabled but no BackgroundExecutor was provided. \
                  Inject one with .background_executor(), enable the `desktop-shims` \
                  feature, or disable scheduled sync."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_background_executor(
    clock: &Arc<dyn Clock>,
) -> Result<Arc<dyn BackgroundExecutor>> {
    Ok(Arc::new(bridge_desktop::TokioBackgroundExecutor::with_clock(
        Arc::clone(clock),
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_background_executor(
    _clock: &Arc<dyn Clock>,
) -> Result<Arc<dyn BackgroundExecutor>> {
    Err(background_executor_missing_error())
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database: Option<DatabaseLocation>,
    sync: Option<SyncOptions>,
    background_executor: Option<Arc<dyn BackgroundExecutor>>,
    clock: Option<Arc<dyn Clock>>,
    logging: Option<LoggingConfig>,
    event_bus_capacity: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the path to the SQLite catalog database.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    /// Uses a private in-memory database.
    pub fn in_memory(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    pub fn sync_options(mut self, options: SyncOptions) -> Self {
        self.sync = Some(options);
        self
    }

    pub fn background_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.background_executor = Some(executor);
        self
    }

    /// Overrides the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Installs logging during bootstrap.
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    pub fn event_bus_capacity(mut self, capacity: usize) -> Self {
        self.event_bus_capacity = Some(capacity);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no database location was set, the sync options
    /// are invalid, or scheduled sync lacks an executor.
    pub fn build(self) -> Result<CoreConfig> {
        let database = self.database.ok_or_else(|| {
            Error::Config(
                "Database location is required. Use .database_path() or .in_memory()."
                    .to_string(),
            )
        })?;

        let sync = self.sync.unwrap_or_default();
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let background_executor = match self.background_executor {
            Some(executor) => Some(executor),
            None if sync.enable_scheduled_sync => Some(provide_default_background_executor(&clock)?),
            None => None,
        };

        let config = CoreConfig {
            database,
            sync,
            background_executor,
            clock,
            logging: self.logging,
            event_bus_capacity: self.event_bus_capacity.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
