//! # Sync Coordinator
//!
//! Keeps the search index in step with the movie catalog.
//!
//! ## Overview
//!
//! The `SyncCoordinator` owns the sync options, the full-sync running flag,
//! the in-memory watermark and the recurring trigger. It reads the catalog
//! through the `MovieRepository`/`EpisodeRepository` ports, writes through
//! the [`SearchIndex`] port and records progress in a
//! [`CheckpointRepository`].
//!
//! ## Workflow
//!
//! ### Full Sync
//! 1. Reset every index (`reindex`)
//! 2. Page through all movies, one bulk index call per page
//! 3. Index the episodes of every movie
//! 4. Advance the watermark to the run's start time and persist it
//!
//! ### Incremental Sync
//! 1. Pick the `since` watermark (last sync, or the fallback window)
//! 2. Fetch movies modified after it and index them in batches
//! 3. Index each movie's episodes and notify its watchers
//! 4. Advance the watermark and persist it
//!
//! Item-level failures never abort a pass; they are collected in
//! [`SyncReport::errors`]. Only pipeline-level failures (the `reindex` call,
//! the catalog query that drives the pass) surface as `Err`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//! use std::sync::Arc;
//!
//! let coordinator = Arc::new(SyncCoordinator::new(
//!     options, movies, episodes, index, notifier, checkpoints,
//! ));
//! coordinator.initialize(Some(executor)).await?;
//!
//! let report = coordinator.full_sync().await?;
//! if !report.errors.is_empty() {
//!     tracing::warn!("Full sync finished with {} errors", report.errors.len());
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bridge_traits::background::{task_handler, BackgroundExecutor, TaskId};
use bridge_traits::error::BridgeError;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_library::{Episode, EpisodeRepository, MovieRepository, PageRequest};
use core_runtime::config::SyncOptions;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::checkpoint::CheckpointRepository;
use crate::error::{Result, SyncError};
use crate::index::{SearchIndex, EPISODES_INDEX, MOVIES_INDEX};
use crate::notifier::WatchlistNotifier;
use crate::report::{
    BatchSyncReport, ChangeAction, EntityKind, SyncReport, SyncStatusSnapshot, SyncType,
    ValidationReport,
};

/// Task id of the recurring incremental sync.
pub const SCHEDULED_SYNC_TASK: &str = "incremental_sync";

fn index_error(err: BridgeError) -> SyncError {
    SyncError::Index(err.to_string())
}

/// Holds the full-sync flag for the duration of a run.
struct FullSyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FullSyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FullSyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct ScheduledSync {
    executor: Arc<dyn BackgroundExecutor>,
    task_id: TaskId,
}

/// Search index sync coordinator
///
/// Construct once at startup and share behind an `Arc`.
pub struct SyncCoordinator {
    options: SyncOptions,
    movies: Arc<dyn MovieRepository>,
    episodes: Arc<dyn EpisodeRepository>,
    index: Arc<dyn SearchIndex>,
    notifier: Arc<dyn WatchlistNotifier>,
    checkpoints: Arc<dyn CheckpointRepository>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    full_sync_running: AtomicBool,
    last_sync_time: RwLock<Option<DateTime<Utc>>>,
    scheduled: Mutex<Option<ScheduledSync>>,
}

impl SyncCoordinator {
    pub fn new(
        options: SyncOptions,
        movies: Arc<dyn MovieRepository>,
        episodes: Arc<dyn EpisodeRepository>,
        index: Arc<dyn SearchIndex>,
        notifier: Arc<dyn WatchlistNotifier>,
        checkpoints: Arc<dyn CheckpointRepository>,
    ) -> Self {
        Self {
            options,
            movies,
            episodes,
            index,
            notifier,
            checkpoints,
            clock: Arc::new(SystemClock),
            event_bus: None,
            full_sync_running: AtomicBool::new(false),
            last_sync_time: RwLock::new(None),
            scheduled: Mutex::new(None),
        }
    }

    /// Time source for watermarks and the fallback window.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Startup sequence: load the checkpoint, register the recurring
    /// incremental sync, then run one incremental pass immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Scheduler`] if scheduled sync is enabled but no
    /// executor is available or the interval cannot be registered, and any
    /// pipeline-level error of the catch-up pass. A failed catch-up pass
    /// cancels the recurring task again before the error is returned.
    #[instrument(skip(self, executor))]
    pub async fn initialize(
        self: &Arc<Self>,
        executor: Option<Arc<dyn BackgroundExecutor>>,
    ) -> Result<SyncReport> {
        info!("Initializing sync coordinator");

        self.load_last_sync_time().await;

        if self.options.enable_scheduled_sync {
            let executor = executor.ok_or_else(|| {
                SyncError::Scheduler(
                    "Scheduled sync is enabled but no background executor was provided"
                        .to_string(),
                )
            })?;
            self.schedule_incremental_sync(executor).await?;
        } else {
            debug!("Scheduled sync disabled");
        }

        match self.incremental_sync().await {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Err(cancel) = self.shutdown().await {
                    warn!(error = %cancel, "Failed to cancel scheduled sync after startup failure");
                }
                Err(e)
            }
        }
    }

    async fn schedule_incremental_sync(
        self: &Arc<Self>,
        executor: Arc<dyn BackgroundExecutor>,
    ) -> Result<()> {
        let schedule = self
            .options
            .schedule()
            .map_err(|e| SyncError::Scheduler(e.to_string()))?;

        let weak: Weak<Self> = Arc::downgrade(self);
        let handler = task_handler(move || {
            let weak = weak.clone();
            async move {
                let Some(coordinator) = weak.upgrade() else {
                    return Ok(());
                };
                if let Err(e) = coordinator.incremental_sync().await {
                    error!(error = %e, "Scheduled incremental sync failed");
                }
                Ok(())
            }
        });

        let task_id = executor
            .schedule_recurring(SCHEDULED_SYNC_TASK, Arc::new(schedule), handler)
            .await
            .map_err(|e| SyncError::Scheduler(e.to_string()))?;

        info!(
            task_id = %task_id,
            interval = %self.options.sync_interval,
            "Scheduled incremental sync"
        );

        let previous = self
            .scheduled
            .lock()
            .await
            .replace(ScheduledSync { executor, task_id });
        if let Some(previous) = previous {
            debug!(task_id = %previous.task_id, "Replaced previously scheduled sync");
        }

        Ok(())
    }

    /// Cancel the recurring trigger, if one was registered.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(scheduled) = self.scheduled.lock().await.take() else {
            return Ok(());
        };

        scheduled
            .executor
            .cancel_task(&scheduled.task_id)
            .await
            .map_err(|e| SyncError::Scheduler(e.to_string()))?;

        info!(task_id = %scheduled.task_id, "Cancelled scheduled sync");
        Ok(())
    }

    // ========================================================================
    // Checkpoint
    // ========================================================================

    /// Load the persisted watermark into memory.
    ///
    /// Read failures are logged and leave the watermark unset; the next
    /// incremental pass then falls back to the configured window.
    pub async fn load_last_sync_time(&self) -> Option<DateTime<Utc>> {
        match self.checkpoints.load().await {
            Ok(Some(metadata)) => {
                let mut last = self.last_sync_time.write().await;
                let loaded = match (*last, metadata.last_sync_time) {
                    (Some(current), Some(stored)) => Some(current.max(stored)),
                    (current, stored) => current.or(stored),
                };
                *last = loaded;
                info!(
                    last_sync_time = ?loaded,
                    sync_count = metadata.sync_count,
                    "Loaded sync checkpoint"
                );
                loaded
            }
            Ok(None) => {
                info!("No sync checkpoint found");
                *self.last_sync_time.read().await
            }
            Err(e) => {
                warn!(error = %e, "Failed to load sync checkpoint");
                *self.last_sync_time.read().await
            }
        }
    }

    /// Advance the watermark to now and persist it.
    ///
    /// The stored `lastError` is carried over unchanged; only a completed
    /// pass replaces it.
    pub async fn persist_last_sync_time(&self, is_full_sync: bool) {
        let now = self.clock.now();
        let last_error = match self.checkpoints.load().await {
            Ok(stored) => stored.and_then(|metadata| metadata.last_error),
            Err(e) => {
                warn!(error = %e, "Failed to read stored sync error");
                None
            }
        };
        self.advance_watermark(now, is_full_sync, last_error).await;
    }

    /// Move the in-memory watermark forward and record the run.
    ///
    /// Persistence errors are logged and swallowed; memory has already
    /// advanced and a later successful write reconciles.
    async fn advance_watermark(
        &self,
        sync_time: DateTime<Utc>,
        is_full_sync: bool,
        last_error: Option<String>,
    ) {
        {
            let mut last = self.last_sync_time.write().await;
            *last = Some(last.map_or(sync_time, |current| current.max(sync_time)));
        }

        if let Err(e) = self
            .checkpoints
            .record_sync(sync_time, is_full_sync, last_error)
            .await
        {
            warn!(error = %e, "Failed to persist sync checkpoint");
        }
    }

    pub async fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_time.read().await
    }

    pub fn is_full_sync_running(&self) -> bool {
        self.full_sync_running.load(Ordering::Acquire)
    }

    pub fn is_auto_sync_enabled(&self) -> bool {
        self.options.auto_sync
    }

    // ========================================================================
    // Full Sync
    // ========================================================================

    /// Rebuild the index from the whole catalog.
    ///
    /// # Errors
    ///
    /// [`SyncError::FullSyncInProgress`] if another full sync is running;
    /// otherwise only pipeline-level failures. Batch and per-movie failures
    /// are reported in the returned [`SyncReport`].
    #[instrument(skip(self))]
    pub async fn full_sync(&self) -> Result<SyncReport> {
        let _guard = FullSyncGuard::acquire(&self.full_sync_running).ok_or_else(|| {
            warn!("Full sync requested while another is running");
            SyncError::FullSyncInProgress
        })?;

        let started = self.clock.now();
        info!("Starting full sync");
        self.emit(SyncEvent::Started {
            sync_type: SyncType::Full,
        });

        match self.run_full_sync().await {
            Ok(report) => {
                self.finish(SyncType::Full, started, &report).await;
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Full sync failed");
                self.emit(SyncEvent::Failed {
                    sync_type: SyncType::Full,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_full_sync(&self) -> Result<SyncReport> {
        self.index.reindex().await.map_err(index_error)?;
        debug!("Indexes reset");

        let mut report = SyncReport::default();
        let page_size = u32::try_from(self.options.batch_size.max(1)).unwrap_or(u32::MAX);
        let mut request = PageRequest::first(page_size);

        loop {
            let page = self.movies.list(request).await?;
            if page.is_empty() {
                break;
            }

            match self.index.index_movies(&page.items).await {
                Ok(()) => {
                    report.movies += page.items.len();
                    debug!(batch = request.page, count = page.items.len(), "Indexed movie batch");
                }
                Err(e) => {
                    warn!(batch = request.page, error = %e, "Movie batch failed");
                    report
                        .errors
                        .push(format!("Movie batch {}: {}", request.page, e));
                }
            }

            request = request.next();
            pause(self.options.batch_delay).await;
        }

        info!(movies = report.movies, "Movies indexed, indexing episodes");

        let slugs = self.movies.all_slugs().await?;
        let every = self.options.progress_log_every;
        let mut next_progress = every;

        for slug in &slugs {
            if let Err(e) = self.sync_movie_episodes(slug, &mut report).await {
                warn!(slug = %slug, error = %e, "Episode sync failed");
                report.errors.push(format!("Episodes for {}: {}", slug, e));
            }

            if every > 0 && report.episodes >= next_progress {
                info!(episodes = report.episodes, "Full sync progress");
                while next_progress <= report.episodes {
                    next_progress += every;
                }
            }

            pause(self.options.movie_delay).await;
        }

        Ok(report)
    }

    // ========================================================================
    // Incremental Sync
    // ========================================================================

    /// Index movies modified since the last sync.
    ///
    /// Without a watermark the pass looks back over the configured fallback
    /// window.
    #[instrument(skip(self))]
    pub async fn incremental_sync(&self) -> Result<SyncReport> {
        let started = self.clock.now();
        let since = self
            .last_sync_time()
            .await
            .unwrap_or(started - self.options.fallback_window);

        info!(since = %since, "Starting incremental sync");
        self.emit(SyncEvent::Started {
            sync_type: SyncType::Incremental,
        });

        match self.run_incremental_sync(since).await {
            Ok(report) => {
                self.finish(SyncType::Incremental, started, &report).await;
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Incremental sync failed");
                self.emit(SyncEvent::Failed {
                    sync_type: SyncType::Incremental,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_incremental_sync(&self, since: DateTime<Utc>) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let modified = self.movies.find_modified_since(since).await?;
        if modified.is_empty() {
            info!("No movies modified since last sync");
            return Ok(report);
        }

        info!(count = modified.len(), "Found modified movies");

        for (i, batch) in modified.chunks(self.options.batch_size.max(1)).enumerate() {
            let batch_number = i + 1;
            match self.index.index_movies(batch).await {
                Ok(()) => report.movies += batch.len(),
                Err(e) => {
                    warn!(batch = batch_number, error = %e, "Movie batch failed");
                    report
                        .errors
                        .push(format!("Movie batch {}: {}", batch_number, e));
                }
            }
        }

        for movie in &modified {
            if let Err(e) = self.sync_movie_episodes(&movie.slug, &mut report).await {
                warn!(slug = %movie.slug, error = %e, "Episode sync failed");
                report
                    .errors
                    .push(format!("Episodes for {}: {}", movie.slug, e));
                continue;
            }

            if let Err(e) = self.notifier.check_and_notify(&movie.slug).await {
                warn!(slug = %movie.slug, error = %e, "Watchlist notification failed");
                report.errors.push(format!("Notify {}: {}", movie.slug, e));
            }
        }

        Ok(report)
    }

    /// Index one movie's episodes, adding the count to `report` on success.
    async fn sync_movie_episodes(&self, slug: &str, report: &mut SyncReport) -> Result<()> {
        let episodes = self.episodes.find_by_movie_slug(slug).await?;
        if episodes.is_empty() {
            return Ok(());
        }

        self.index
            .index_episodes(&episodes)
            .await
            .map_err(index_error)?;
        report.episodes += episodes.len();
        Ok(())
    }

    async fn finish(&self, sync_type: SyncType, started: DateTime<Utc>, report: &SyncReport) {
        self.advance_watermark(
            started,
            sync_type == SyncType::Full,
            report.error_summary(),
        )
        .await;

        let duration_ms = (self.clock.now() - started).num_milliseconds().max(0) as u64;

        if report.is_clean() {
            info!(
                sync_type = %sync_type,
                movies = report.movies,
                episodes = report.episodes,
                duration_ms,
                "Sync completed"
            );
        } else {
            warn!(
                sync_type = %sync_type,
                movies = report.movies,
                episodes = report.episodes,
                errors = report.errors.len(),
                duration_ms,
                "Sync completed with errors"
            );
        }

        self.emit(SyncEvent::Completed {
            sync_type,
            movies: report.movies as u64,
            episodes: report.episodes as u64,
            errors: report.errors.len() as u64,
            duration_ms,
        });
    }

    // ========================================================================
    // Single-Entity Operations
    // ========================================================================

    /// Re-index one movie and its episodes.
    ///
    /// # Errors
    ///
    /// [`SyncError::MovieNotFound`] if the slug is not in the catalog, and
    /// any index or catalog failure.
    #[instrument(skip(self))]
    pub async fn sync_single_movie(&self, slug: &str) -> Result<()> {
        let movie = self
            .movies
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| SyncError::MovieNotFound {
                slug: slug.to_string(),
            })?;

        self.index.index_movie(&movie).await.map_err(index_error)?;

        let episodes = self.episodes.find_by_movie_slug(slug).await?;
        if !episodes.is_empty() {
            self.index
                .index_episodes(&episodes)
                .await
                .map_err(index_error)?;
        }

        info!(slug = %slug, episodes = episodes.len(), "Movie synced");
        self.emit(SyncEvent::MovieSynced {
            slug: slug.to_string(),
        });
        Ok(())
    }

    /// Remove one movie from the index.
    #[instrument(skip(self))]
    pub async fn delete_synced_movie(&self, slug: &str) -> Result<()> {
        self.index.delete_movie(slug).await.map_err(index_error)?;

        info!(slug = %slug, "Movie removed from index");
        self.emit(SyncEvent::MovieRemoved {
            slug: slug.to_string(),
        });
        Ok(())
    }

    /// Sync each slug in turn; one failure never stops the loop.
    #[instrument(skip(self, slugs), fields(count = slugs.len()))]
    pub async fn sync_batch(&self, slugs: &[String]) -> BatchSyncReport {
        let mut report = BatchSyncReport::default();

        for slug in slugs {
            match self.sync_single_movie(slug).await {
                Ok(()) => report.success += 1,
                Err(e) => {
                    warn!(slug = %slug, error = %e, "Batch item failed");
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", slug, e));
                }
            }
        }

        info!(
            success = report.success,
            failed = report.failed,
            "Batch sync finished"
        );
        report
    }

    /// Apply one change notification from the catalog.
    ///
    /// Movie changes take `data.slug`. Episode creates and updates take a
    /// full episode document; episode deletes only need `data.slug`.
    #[instrument(skip(self, data), fields(kind = %kind, action = %action))]
    pub async fn handle_data_change(
        &self,
        kind: EntityKind,
        action: ChangeAction,
        data: Value,
    ) -> Result<()> {
        match (kind, action) {
            (EntityKind::Movie, ChangeAction::Create | ChangeAction::Update) => {
                let slug = payload_slug(&data)?;
                self.sync_single_movie(slug).await
            }
            (EntityKind::Movie, ChangeAction::Delete) => {
                let slug = payload_slug(&data)?;
                self.delete_synced_movie(slug).await
            }
            (EntityKind::Episode, ChangeAction::Create | ChangeAction::Update) => {
                let episode: Episode = serde_json::from_value(data)
                    .map_err(|e| SyncError::InvalidPayload(e.to_string()))?;
                episode.validate().map_err(SyncError::InvalidPayload)?;

                self.index
                    .index_episode(&episode)
                    .await
                    .map_err(index_error)?;
                debug!(slug = %episode.slug, "Episode indexed");
                Ok(())
            }
            (EntityKind::Episode, ChangeAction::Delete) => {
                let slug = payload_slug(&data)?;
                self.index.delete_episode(slug).await.map_err(index_error)?;
                debug!(slug = %slug, "Episode removed from index");
                Ok(())
            }
        }
    }

    // ========================================================================
    // Status & Validation
    // ========================================================================

    /// Read-only snapshot of the coordinator; never fails.
    pub async fn get_sync_status(&self) -> SyncStatusSnapshot {
        let (elasticsearch_health, health_error) = match self.index.health().await {
            Ok(health) => (Some(health), None),
            Err(e) => {
                warn!(error = %e, "Search index health check failed");
                (None, Some(e.to_string()))
            }
        };

        let metadata = match self.checkpoints.load().await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "Failed to read sync checkpoint for status");
                None
            }
        };

        SyncStatusSnapshot {
            is_full_sync_running: self.is_full_sync_running(),
            last_sync_time: self.last_sync_time().await,
            elasticsearch_health,
            health_error,
            metadata,
            auto_sync: self.options.auto_sync,
        }
    }

    /// Compare catalog counts with index document counts.
    ///
    /// Detection only; nothing is repaired.
    #[instrument(skip(self))]
    pub async fn validate_sync(&self) -> Result<ValidationReport> {
        let db_movie_count = self.movies.count().await?;
        let db_episode_count = self.episodes.count().await?;
        let health = self.index.health().await.map_err(index_error)?;

        let report = ValidationReport::new(
            db_movie_count.max(0) as u64,
            health.doc_count(MOVIES_INDEX),
            db_episode_count.max(0) as u64,
            health.doc_count(EPISODES_INDEX),
        );

        if report.is_in_sync {
            info!("Search index is in sync with the catalog");
        } else {
            warn!(
                db_movies = report.db_movie_count,
                es_movies = report.es_movie_count,
                db_episodes = report.db_episode_count,
                es_episodes = report.es_episode_count,
                "Search index has drifted from the catalog"
            );
        }

        Ok(report)
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is not an error.
            let _ = bus.emit(CoreEvent::Sync(event));
        }
    }
}

fn payload_slug(data: &Value) -> Result<&str> {
    data.get("slug")
        .and_then(Value::as_str)
        .filter(|slug| !slug.trim().is_empty())
        .ok_or_else(|| SyncError::InvalidPayload("missing string field `slug`".to_string()))
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::SyncMetadata;
    use crate::index::IndexHealth;
    use async_trait::async_trait;
    use bridge_traits::time::ManualClock;
    use chrono::TimeZone;
    use core_library::db::create_test_pool;
    use core_library::{Movie, SqliteEpisodeRepository, SqliteMovieRepository};
    use mockall::mock;
    use std::sync::Mutex as StdMutex;

    mock! {
        pub Index {}

        #[async_trait]
        impl SearchIndex for Index {
            async fn index_movies(&self, movies: &[Movie]) -> bridge_traits::error::Result<()>;
            async fn index_movie(&self, movie: &Movie) -> bridge_traits::error::Result<()>;
            async fn index_episodes(&self, episodes: &[Episode]) -> bridge_traits::error::Result<()>;
            async fn index_episode(&self, episode: &Episode) -> bridge_traits::error::Result<()>;
            async fn delete_movie(&self, slug: &str) -> bridge_traits::error::Result<()>;
            async fn delete_episode(&self, slug: &str) -> bridge_traits::error::Result<()>;
            async fn reindex(&self) -> bridge_traits::error::Result<()>;
            async fn health(&self) -> bridge_traits::error::Result<IndexHealth>;
        }
    }

    mock! {
        pub Notifier {}

        #[async_trait]
        impl WatchlistNotifier for Notifier {
            async fn check_and_notify(&self, movie_slug: &str) -> bridge_traits::error::Result<()>;
        }
    }

    /// Checkpoint store that records calls and can be told to fail.
    #[derive(Default)]
    struct MemoryCheckpoints {
        stored: StdMutex<Option<SyncMetadata>>,
        fail: bool,
    }

    #[async_trait]
    impl CheckpointRepository for MemoryCheckpoints {
        async fn load(&self) -> Result<Option<SyncMetadata>> {
            if self.fail {
                return Err(SyncError::Checkpoint("disk on fire".to_string()));
            }
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn record_sync(
            &self,
            sync_time: DateTime<Utc>,
            is_full_sync: bool,
            last_error: Option<String>,
        ) -> Result<SyncMetadata> {
            if self.fail {
                return Err(SyncError::Checkpoint("disk on fire".to_string()));
            }
            let mut stored = self.stored.lock().unwrap();
            let next = stored
                .clone()
                .unwrap_or_default()
                .merged(sync_time, is_full_sync, last_error);
            *stored = Some(next.clone());
            Ok(next)
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn options() -> SyncOptions {
        SyncOptions::default()
            .with_scheduled_sync(false)
            .with_batch_size(2)
            .with_delays(Duration::ZERO, Duration::ZERO)
    }

    struct Fixture {
        movies: Arc<SqliteMovieRepository>,
        episodes: Arc<SqliteEpisodeRepository>,
        checkpoints: Arc<MemoryCheckpoints>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_checkpoints(MemoryCheckpoints::default()).await
        }

        async fn with_checkpoints(checkpoints: MemoryCheckpoints) -> Self {
            let pool = create_test_pool().await.unwrap();
            Self {
                movies: Arc::new(SqliteMovieRepository::new(pool.clone())),
                episodes: Arc::new(SqliteEpisodeRepository::new(pool)),
                checkpoints: Arc::new(checkpoints),
                clock: Arc::new(ManualClock::new(start())),
            }
        }

        async fn seed_movie(&self, slug: &str, episodes: usize) {
            let modified = (start() - chrono::Duration::hours(1)).timestamp_millis();
            self.movies
                .upsert(&Movie::new(slug, slug, modified))
                .await
                .unwrap();
            for n in 0..episodes {
                self.episodes
                    .upsert(&Episode::new(
                        format!("{}-ep-{}", slug, n + 1),
                        slug,
                        format!("Episode {}", n + 1),
                        modified,
                    ))
                    .await
                    .unwrap();
            }
        }

        fn coordinator(&self, index: MockIndex, notifier: MockNotifier) -> SyncCoordinator {
            self.coordinator_with(options(), index, notifier)
        }

        fn coordinator_with(
            &self,
            options: SyncOptions,
            index: MockIndex,
            notifier: MockNotifier,
        ) -> SyncCoordinator {
            SyncCoordinator::new(
                options,
                self.movies.clone(),
                self.episodes.clone(),
                Arc::new(index),
                Arc::new(notifier),
                self.checkpoints.clone(),
            )
            .with_clock(self.clock.clone())
        }
    }

    #[tokio::test]
    async fn test_full_sync_indexes_movies_and_episodes() {
        let fixture = Fixture::new().await;
        fixture.seed_movie("alpha", 2).await;
        fixture.seed_movie("beta", 0).await;
        fixture.seed_movie("gamma", 1).await;

        let mut index = MockIndex::new();
        index.expect_reindex().times(1).returning(|| Ok(()));
        index.expect_index_movies().times(2).returning(|_| Ok(()));
        index.expect_index_episodes().times(2).returning(|_| Ok(()));

        let coordinator = fixture.coordinator(index, MockNotifier::new());
        let report = coordinator.full_sync().await.unwrap();

        assert_eq!(report.movies, 3);
        assert_eq!(report.episodes, 3);
        assert!(report.errors.is_empty());
        assert!(!coordinator.is_full_sync_running());
        assert_eq!(coordinator.last_sync_time().await, Some(start()));

        let stored = fixture.checkpoints.load().await.unwrap().unwrap();
        assert_eq!(stored.last_full_sync, Some(start()));
        assert_eq!(stored.sync_count, 1);
    }

    #[tokio::test]
    async fn test_full_sync_with_zero_batch_size_still_pages() {
        let fixture = Fixture::new().await;
        fixture.seed_movie("alpha", 0).await;
        fixture.seed_movie("beta", 0).await;

        let mut index = MockIndex::new();
        index.expect_reindex().returning(|| Ok(()));
        index
            .expect_index_movies()
            .withf(|movies| movies.len() == 1)
            .times(2)
            .returning(|_| Ok(()));
        index.expect_index_episodes().never();

        let coordinator =
            fixture.coordinator_with(options().with_batch_size(0), index, MockNotifier::new());
        let report = coordinator.full_sync().await.unwrap();

        assert_eq!(report.movies, 2);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_full_sync_continues_past_episode_failure() {
        let fixture = Fixture::new().await;
        fixture.seed_movie("alpha", 1).await;
        fixture.seed_movie("beta", 2).await;

        let mut index = MockIndex::new();
        index.expect_reindex().returning(|| Ok(()));
        index.expect_index_movies().times(1).returning(|_| Ok(()));
        index
            .expect_index_episodes()
            .withf(|episodes| episodes[0].movie_slug == "alpha")
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("mapping conflict".into())));
        index
            .expect_index_episodes()
            .withf(|episodes| episodes[0].movie_slug == "beta")
            .times(1)
            .returning(|_| Ok(()));

        let coordinator = fixture.coordinator(index, MockNotifier::new());
        let report = coordinator.full_sync().await.unwrap();

        assert_eq!(report.movies, 2);
        assert_eq!(report.episodes, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Episodes for alpha:"));
        assert!(report.errors[0].contains("mapping conflict"));
        assert!(!coordinator.is_full_sync_running());

        let stored = fixture.checkpoints.load().await.unwrap().unwrap();
        assert_eq!(stored.last_full_sync, Some(start()));
        assert!(stored
            .last_error
            .unwrap()
            .starts_with("1 error(s); first: Episodes for alpha"));
    }

    #[tokio::test]
    async fn test_full_sync_reindex_failure_is_fatal() {
        let fixture = Fixture::new().await;
        fixture.seed_movie("alpha", 0).await;

        let mut index = MockIndex::new();
        index
            .expect_reindex()
            .returning(|| Err(BridgeError::OperationFailed("cluster down".into())));
        index.expect_index_movies().never();

        let coordinator = fixture.coordinator(index, MockNotifier::new());
        let result = coordinator.full_sync().await;

        assert!(matches!(result, Err(SyncError::Index(msg)) if msg.contains("cluster down")));
        assert!(!coordinator.is_full_sync_running());
        assert_eq!(coordinator.last_sync_time().await, None);
        assert_eq!(fixture.checkpoints.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incremental_notifies_each_modified_movie() {
        let fixture = Fixture::new().await;
        fixture.seed_movie("alpha", 1).await;
        fixture.seed_movie("beta", 1).await;

        let mut index = MockIndex::new();
        index.expect_index_movies().times(1).returning(|_| Ok(()));
        index.expect_index_episodes().times(2).returning(|_| Ok(()));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_check_and_notify()
            .withf(|slug| slug == "alpha")
            .times(1)
            .returning(|_| Ok(()));
        notifier
            .expect_check_and_notify()
            .withf(|slug| slug == "beta")
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("smtp".into())));

        let coordinator = fixture.coordinator(index, notifier);
        let report = coordinator.incremental_sync().await.unwrap();

        assert_eq!(report.movies, 2);
        assert_eq!(report.episodes, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Notify beta:"));

        let stored = fixture.checkpoints.load().await.unwrap().unwrap();
        assert_eq!(stored.last_full_sync, None);
        assert!(stored.last_error.unwrap().starts_with("1 error(s); first: Notify beta"));
    }

    #[tokio::test]
    async fn test_episode_failure_skips_notification() {
        let fixture = Fixture::new().await;
        fixture.seed_movie("alpha", 1).await;

        let mut index = MockIndex::new();
        index.expect_index_movies().returning(|_| Ok(()));
        index
            .expect_index_episodes()
            .returning(|_| Err(BridgeError::OperationFailed("bulk rejected".into())));

        let mut notifier = MockNotifier::new();
        notifier.expect_check_and_notify().never();

        let coordinator = fixture.coordinator(index, notifier);
        let report = coordinator.incremental_sync().await.unwrap();

        assert_eq!(report.episodes, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Episodes for alpha:"));
    }

    #[tokio::test]
    async fn test_checkpoint_failure_does_not_fail_sync() {
        let fixture = Fixture::with_checkpoints(MemoryCheckpoints {
            fail: true,
            ..Default::default()
        })
        .await;

        let coordinator = fixture.coordinator(MockIndex::new(), MockNotifier::new());

        assert_eq!(coordinator.load_last_sync_time().await, None);

        let report = coordinator.incremental_sync().await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(coordinator.last_sync_time().await, Some(start()));
    }

    #[tokio::test]
    async fn test_persist_keeps_stored_error_summary() {
        let fixture = Fixture::new().await;
        fixture.seed_movie("alpha", 0).await;

        let mut index = MockIndex::new();
        index.expect_index_movies().returning(|_| Ok(()));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_check_and_notify()
            .returning(|_| Err(BridgeError::OperationFailed("smtp".into())));

        let coordinator = fixture.coordinator(index, notifier);
        coordinator.incremental_sync().await.unwrap();
        let summary = fixture
            .checkpoints
            .load()
            .await
            .unwrap()
            .unwrap()
            .last_error;
        assert!(summary.is_some());

        fixture.clock.advance(chrono::Duration::hours(1));
        coordinator.persist_last_sync_time(false).await;

        let stored = fixture.checkpoints.load().await.unwrap().unwrap();
        assert_eq!(stored.last_error, summary);
        assert_eq!(stored.sync_count, 2);
        assert_eq!(stored.last_sync_time, Some(start() + chrono::Duration::hours(1)));
        assert_eq!(
            coordinator.last_sync_time().await,
            Some(start() + chrono::Duration::hours(1))
        );
    }

    #[tokio::test]
    async fn test_sync_single_movie_not_found() {
        let fixture = Fixture::new().await;

        let mut index = MockIndex::new();
        index.expect_index_movie().never();

        let coordinator = fixture.coordinator(index, MockNotifier::new());
        let result = coordinator.sync_single_movie("missing").await;

        assert!(matches!(result, Err(SyncError::MovieNotFound { slug }) if slug == "missing"));
    }

    #[tokio::test]
    async fn test_sync_batch_counts_outcomes() {
        let fixture = Fixture::new().await;
        fixture.seed_movie("alpha", 1).await;
        fixture.seed_movie("beta", 0).await;

        let mut index = MockIndex::new();
        index.expect_index_movie().times(2).returning(|_| Ok(()));
        index.expect_index_episodes().times(1).returning(|_| Ok(()));

        let coordinator = fixture.coordinator(index, MockNotifier::new());
        let slugs = vec!["alpha".to_string(), "ghost".to_string(), "beta".to_string()];
        let report = coordinator.sync_batch(&slugs).await;

        assert_eq!(report.success, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors, vec!["ghost: Movie not found: ghost".to_string()]);
    }

    #[tokio::test]
    async fn test_handle_episode_upsert_goes_straight_to_index() {
        let fixture = Fixture::new().await;

        let mut index = MockIndex::new();
        index
            .expect_index_episode()
            .withf(|episode| episode.slug == "dark-s01e01" && episode.movie_slug == "dark")
            .times(1)
            .returning(|_| Ok(()));
        index.expect_index_movie().never();

        let coordinator = fixture.coordinator(index, MockNotifier::new());
        let data = serde_json::json!({
            "slug": "dark-s01e01",
            "movieSlug": "dark",
            "name": "Secrets",
            "episodeNumber": 1,
            "serverName": null,
            "link": null
        });

        coordinator
            .handle_data_change(EntityKind::Episode, ChangeAction::Update, data)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handle_change_rejects_missing_slug() {
        let fixture = Fixture::new().await;
        let coordinator = fixture.coordinator(MockIndex::new(), MockNotifier::new());

        let result = coordinator
            .handle_data_change(
                EntityKind::Movie,
                ChangeAction::Delete,
                serde_json::json!({ "id": 7 }),
            )
            .await;

        assert!(matches!(result, Err(SyncError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn test_status_survives_health_and_checkpoint_failures() {
        let fixture = Fixture::with_checkpoints(MemoryCheckpoints {
            fail: true,
            ..Default::default()
        })
        .await;

        let mut index = MockIndex::new();
        index
            .expect_health()
            .returning(|| Err(BridgeError::NotAvailable("no route to host".into())));

        let coordinator = fixture.coordinator(index, MockNotifier::new());
        let status = coordinator.get_sync_status().await;

        assert!(!status.is_full_sync_running);
        assert_eq!(status.elasticsearch_health, None);
        assert!(status.health_error.unwrap().contains("no route to host"));
        assert_eq!(status.metadata, None);
        assert!(!status.auto_sync);
    }

    #[tokio::test]
    async fn test_events_for_successful_full_sync() {
        let fixture = Fixture::new().await;

        let mut index = MockIndex::new();
        index.expect_reindex().returning(|| Ok(()));

        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let coordinator = fixture
            .coordinator(index, MockNotifier::new())
            .with_event_bus(bus);

        coordinator.full_sync().await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Started {
                sync_type: SyncType::Full
            })
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Sync(SyncEvent::Completed {
                sync_type: SyncType::Full,
                movies: 0,
                errors: 0,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_initialize_requires_executor_when_scheduling() {
        let fixture = Fixture::new().await;
        let coordinator = Arc::new(
            SyncCoordinator::new(
                options().with_scheduled_sync(true),
                fixture.movies.clone(),
                fixture.episodes.clone(),
                Arc::new(MockIndex::new()),
                Arc::new(MockNotifier::new()),
                fixture.checkpoints.clone(),
            )
            .with_clock(fixture.clock.clone()),
        );

        let result = coordinator.initialize(None).await;
        assert!(matches!(result, Err(SyncError::Scheduler(_))));
    }
}
