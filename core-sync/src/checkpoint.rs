//! # Sync Checkpoint
//!
//! Durable record of the sync watermark, stored as one JSON row in the
//! `sync_metadata` table under a well-known key.
//!
//! Several coordinator instances may share a catalog database, so the row is
//! updated with a compare-and-swap on its `version` column. A writer that
//! loses the race reloads, re-merges and retries. Merging keeps the larger
//! of each timestamp, so the stored watermark never moves backwards no
//! matter which writer lands last.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};

/// Row key of the checkpoint.
pub const CHECKPOINT_KEY: &str = "elasticsearch_sync";

/// Attempts before a contended update gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Persisted sync watermark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Start time of the latest successful run
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Start time of the latest successful full run
    #[serde(default)]
    pub last_full_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync_count: u64,
    /// Error summary of the latest run, if it had item-level failures
    #[serde(default)]
    pub last_error: Option<String>,
}

impl SyncMetadata {
    /// Fold one completed run into the stored state.
    pub fn merged(
        &self,
        sync_time: DateTime<Utc>,
        is_full_sync: bool,
        last_error: Option<String>,
    ) -> Self {
        let last_full_sync = if is_full_sync {
            Some(self.last_full_sync.map_or(sync_time, |t| t.max(sync_time)))
        } else {
            self.last_full_sync
        };

        Self {
            last_sync_time: Some(self.last_sync_time.map_or(sync_time, |t| t.max(sync_time))),
            last_full_sync,
            sync_count: self.sync_count.saturating_add(1),
            last_error,
        }
    }
}

/// Storage for the sync checkpoint.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Current checkpoint, `None` before the first recorded run.
    async fn load(&self) -> Result<Option<SyncMetadata>>;

    /// Merge a completed run into the checkpoint and return the stored result.
    async fn record_sync(
        &self,
        sync_time: DateTime<Utc>,
        is_full_sync: bool,
        last_error: Option<String>,
    ) -> Result<SyncMetadata>;
}

#[derive(Debug, FromRow)]
struct CheckpointRow {
    value: String,
    version: i64,
}

/// SQLite-backed checkpoint store.
pub struct SqliteCheckpointRepository {
    pool: SqlitePool,
    key: String,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl SqliteCheckpointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            key: CHECKPOINT_KEY.to_string(),
            clock: Arc::new(SystemClock),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Store the checkpoint under a different row key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Clock used for the row's `updated_at` column.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn fetch_row(&self) -> Result<Option<CheckpointRow>> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            "SELECT value, version FROM sync_metadata WHERE key = ?",
        )
        .bind(&self.key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    fn decode(value: &str) -> Result<SyncMetadata> {
        serde_json::from_str(value)
            .map_err(|e| SyncError::Checkpoint(format!("Corrupt checkpoint value: {}", e)))
    }

    fn encode(metadata: &SyncMetadata) -> Result<String> {
        serde_json::to_string(metadata)
            .map_err(|e| SyncError::Checkpoint(format!("Failed to encode checkpoint: {}", e)))
    }

    /// Insert the first row. Returns false if another writer got there first.
    async fn try_insert(&self, metadata: &SyncMetadata) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_metadata (key, value, version, updated_at)
            VALUES (?, ?, 0, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(&self.key)
        .bind(Self::encode(metadata)?)
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Replace the row if it is still at `version`.
    async fn try_update(&self, metadata: &SyncMetadata, version: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_metadata
            SET value = ?, version = version + 1, updated_at = ?
            WHERE key = ? AND version = ?
            "#,
        )
        .bind(Self::encode(metadata)?)
        .bind(self.clock.unix_timestamp_millis())
        .bind(&self.key)
        .bind(version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CheckpointRepository for SqliteCheckpointRepository {
    async fn load(&self) -> Result<Option<SyncMetadata>> {
        match self.fetch_row().await? {
            Some(row) => Ok(Some(Self::decode(&row.value)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, last_error), fields(key = %self.key))]
    async fn record_sync(
        &self,
        sync_time: DateTime<Utc>,
        is_full_sync: bool,
        last_error: Option<String>,
    ) -> Result<SyncMetadata> {
        for attempt in 1..=self.max_attempts {
            let written = match self.fetch_row().await? {
                None => {
                    let next = SyncMetadata::default().merged(
                        sync_time,
                        is_full_sync,
                        last_error.clone(),
                    );
                    self.try_insert(&next).await?.then_some(next)
                }
                Some(row) => {
                    let next = Self::decode(&row.value)?.merged(
                        sync_time,
                        is_full_sync,
                        last_error.clone(),
                    );
                    self.try_update(&next, row.version).await?.then_some(next)
                }
            };

            if let Some(metadata) = written {
                debug!(attempt, sync_count = metadata.sync_count, "Checkpoint recorded");
                return Ok(metadata);
            }

            debug!(attempt, "Checkpoint changed concurrently, retrying");
            tokio::task::yield_now().await;
        }

        warn!(attempts = self.max_attempts, "Giving up on contended checkpoint");
        Err(SyncError::CheckpointConflict {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_library::db::create_test_pool;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    async fn repo() -> SqliteCheckpointRepository {
        SqliteCheckpointRepository::new(create_test_pool().await.unwrap())
    }

    async fn row_count(repo: &SqliteCheckpointRepository) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_metadata")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        count
    }

    #[test]
    fn test_merge_keeps_latest_timestamps() {
        let stored = SyncMetadata::default().merged(at(10), true, None);
        let merged = stored.merged(at(8), false, Some("1 error(s); first: x".into()));

        assert_eq!(merged.last_sync_time, Some(at(10)));
        assert_eq!(merged.last_full_sync, Some(at(10)));
        assert_eq!(merged.sync_count, 2);
        assert_eq!(merged.last_error.as_deref(), Some("1 error(s); first: x"));
    }

    #[tokio::test]
    async fn test_load_before_first_run() {
        let repo = repo().await;
        assert_eq!(repo.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_first_record_inserts_row() {
        let repo = repo().await;

        let stored = repo.record_sync(at(10), false, None).await.unwrap();

        assert_eq!(stored.sync_count, 1);
        assert_eq!(stored.last_sync_time, Some(at(10)));
        assert_eq!(stored.last_full_sync, None);
        assert_eq!(repo.load().await.unwrap(), Some(stored));
        assert_eq!(row_count(&repo).await, 1);
    }

    #[tokio::test]
    async fn test_second_record_updates_same_row() {
        let repo = repo().await;

        repo.record_sync(at(10), true, None).await.unwrap();
        let stored = repo.record_sync(at(12), false, None).await.unwrap();

        assert_eq!(stored.sync_count, 2);
        assert_eq!(stored.last_sync_time, Some(at(12)));
        assert_eq!(stored.last_full_sync, Some(at(10)));
        assert_eq!(row_count(&repo).await, 1);

        let (version,): (i64,) = sqlx::query_as("SELECT version FROM sync_metadata WHERE key = ?")
            .bind(CHECKPOINT_KEY)
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn test_watermark_never_moves_backwards() {
        let repo = repo().await;

        repo.record_sync(at(12), false, None).await.unwrap();
        let stored = repo
            .record_sync(at(12) - Duration::hours(3), false, None)
            .await
            .unwrap();

        assert_eq!(stored.last_sync_time, Some(at(12)));
        assert_eq!(stored.sync_count, 2);
    }

    #[tokio::test]
    async fn test_json_layout() {
        let repo = repo().await;
        repo.record_sync(at(10), true, Some("1 error(s); first: boom".into()))
            .await
            .unwrap();

        let row = repo.fetch_row().await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&row.value).unwrap();

        assert_eq!(json["syncCount"], 1);
        assert_eq!(json["lastError"], "1 error(s); first: boom");
        assert!(json["lastSyncTime"].is_string());
        assert!(json["lastFullSync"].is_string());
    }

    #[tokio::test]
    async fn test_concurrent_writers_all_land() {
        let repo = Arc::new(repo().await);

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { repo.record_sync(at(i), false, None).await })
            })
            .collect();

        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let stored = repo.load().await.unwrap().unwrap();
        assert_eq!(stored.sync_count, 8);
        assert_eq!(stored.last_sync_time, Some(at(7)));
        assert_eq!(row_count(&repo).await, 1);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_reported() {
        let repo = repo().await;
        sqlx::query("INSERT INTO sync_metadata (key, value, version, updated_at) VALUES (?, 'nope', 0, 0)")
            .bind(CHECKPOINT_KEY)
            .execute(&repo.pool)
            .await
            .unwrap();

        assert!(matches!(repo.load().await, Err(SyncError::Checkpoint(_))));
    }
}
