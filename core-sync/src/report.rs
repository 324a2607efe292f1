//! Result and status types returned by the sync coordinator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::SyncMetadata;
use crate::error::SyncError;
use crate::index::IndexHealth;

pub use core_runtime::events::SyncType;

/// Outcome of a full or incremental pass.
///
/// A pass with a non-empty `errors` list still counts as completed; callers
/// inspect the list to detect partial failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Movies successfully indexed
    pub movies: usize,
    /// Episodes successfully indexed
    pub episodes: usize,
    /// Item-level failures, one line each
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// One-line summary stored as the checkpoint's `lastError`.
    pub fn error_summary(&self) -> Option<String> {
        self.errors
            .first()
            .map(|first| format!("{} error(s); first: {}", self.errors.len(), first))
    }
}

/// Outcome of [`sync_batch`](crate::SyncCoordinator::sync_batch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSyncReport {
    pub success: usize,
    pub failed: usize,
    /// `"<slug>: <error>"` for every failed slug
    pub errors: Vec<String>,
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusSnapshot {
    pub is_full_sync_running: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Search index health; `None` when the health call failed
    pub elasticsearch_health: Option<IndexHealth>,
    /// Why `elasticsearch_health` is missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_error: Option<String>,
    /// Persisted checkpoint; omitted when absent or unreadable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SyncMetadata>,
    pub auto_sync: bool,
}

/// Drift check between catalog counts and index document counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub db_movie_count: u64,
    pub es_movie_count: u64,
    pub db_episode_count: u64,
    pub es_episode_count: u64,
    pub is_in_sync: bool,
}

impl ValidationReport {
    pub fn new(
        db_movie_count: u64,
        es_movie_count: u64,
        db_episode_count: u64,
        es_episode_count: u64,
    ) -> Self {
        Self {
            db_movie_count,
            es_movie_count,
            db_episode_count,
            es_episode_count,
            is_in_sync: db_movie_count == es_movie_count && db_episode_count == es_episode_count,
        }
    }
}

/// Entity named by a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Movie,
    Episode,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Movie => "movie",
            EntityKind::Episode => "episode",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(EntityKind::Movie),
            "episode" => Ok(EntityKind::Episode),
            other => Err(SyncError::InvalidEntityKind(other.to_string())),
        }
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeAction {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(ChangeAction::Create),
            "update" => Ok(ChangeAction::Update),
            "delete" => Ok(ChangeAction::Delete),
            other => Err(SyncError::InvalidChangeAction(other.to_string())),
        }
    }
}
