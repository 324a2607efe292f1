//! Core service façade and bootstrap helpers.
//!
//! This crate wires a [`CoreConfig`] and the host-provided search index and
//! watchlist notifier into a running [`SyncCoordinator`]: it opens the
//! catalog database, builds the repositories and checkpoint store, starts
//! the event bus and runs the coordinator's startup sequence. Server and
//! desktop hosts typically enable the `desktop-shims` feature so a tokio
//! background executor is provided when none is injected.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_library::db::{create_pool, DatabaseConfig};
use core_library::{SqliteEpisodeRepository, SqliteMovieRepository};
use core_runtime::config::DatabaseLocation;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::init_logging;
use core_sync::SqliteCheckpointRepository;
use sqlx::SqlitePool;
use tracing::info;

pub use core_runtime::config::{CoreConfig, CoreConfigBuilder, SyncOptions};
pub use core_sync::{
    BatchSyncReport, ChangeAction, EntityKind, IndexHealth, IndexStats, NoopNotifier,
    SearchIndex, SyncCoordinator, SyncReport, SyncStatusSnapshot, ValidationReport,
    WatchlistNotifier,
};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    coordinator: Arc<SyncCoordinator>,
    event_bus: EventBus,
    pool: SqlitePool,
    initial_sync: SyncReport,
}

impl CoreService {
    /// The sync coordinator; webhooks and admin actions call into it.
    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Subscribe to sync events.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Catalog connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Result of the catch-up pass run during bootstrap.
    pub fn initial_sync(&self) -> &SyncReport {
        &self.initial_sync
    }

    /// Cancel scheduled syncs and close the catalog pool.
    pub async fn shutdown(&self) -> Result<()> {
        self.coordinator.shutdown().await?;
        self.pool.close().await;
        info!("Core service shut down");
        Ok(())
    }
}

/// Build and start the sync engine.
///
/// Installs logging when `config.logging` is set, opens the catalog
/// database, and runs [`SyncCoordinator::initialize`], which schedules the
/// recurring incremental sync and performs one immediate pass.
///
/// ```ignore
/// use core_service::{bootstrap, CoreConfig};
///
/// let config = CoreConfig::builder()
///     .database_path("catalog.db")
///     .build()?;
/// let core = bootstrap(config, index, notifier).await?;
/// let report = core.coordinator().validate_sync().await?;
/// ```
pub async fn bootstrap(
    config: CoreConfig,
    index: Arc<dyn SearchIndex>,
    notifier: Arc<dyn WatchlistNotifier>,
) -> Result<CoreService> {
    config.validate().map_err(config_error)?;

    if let Some(logging) = config.logging.clone() {
        init_logging(logging)?;
    }

    let database = match &config.database {
        DatabaseLocation::File(path) => DatabaseConfig::new(path),
        DatabaseLocation::InMemory => DatabaseConfig::in_memory(),
    };
    let pool = create_pool(database).await?;

    let event_bus = EventBus::new(config.event_bus_capacity);
    let checkpoints =
        SqliteCheckpointRepository::new(pool.clone()).with_clock(Arc::clone(&config.clock));

    let coordinator = Arc::new(
        SyncCoordinator::new(
            config.sync.clone(),
            Arc::new(SqliteMovieRepository::new(pool.clone())),
            Arc::new(SqliteEpisodeRepository::new(pool.clone())),
            index,
            notifier,
            Arc::new(checkpoints),
        )
        .with_clock(Arc::clone(&config.clock))
        .with_event_bus(event_bus.clone()),
    );

    let initial_sync = coordinator
        .initialize(config.background_executor.clone())
        .await?;

    info!(
        movies = initial_sync.movies,
        episodes = initial_sync.episodes,
        errors = initial_sync.errors.len(),
        "Core service started"
    );

    Ok(CoreService {
        coordinator,
        event_bus,
        pool,
        initial_sync,
    })
}

fn config_error(err: core_runtime::Error) -> CoreError {
    match err {
        core_runtime::Error::CapabilityMissing {
            capability,
            message,
        } => CoreError::CapabilityMissing {
            capability,
            message,
        },
        other => CoreError::Runtime(other),
    }
}
