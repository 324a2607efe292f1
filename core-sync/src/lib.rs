//! # Search Index Sync
//!
//! Keeps a search index consistent with the movie catalog.
//!
//! ## Overview
//!
//! The engine pushes catalog rows into the index in three ways:
//! - Full rebuilds that reset the index and re-index everything
//! - Incremental passes over movies modified since the last checkpoint
//! - Single-entity operations driven by webhooks and admin actions
//!
//! ## Components
//!
//! - **Sync Coordinator** (`coordinator`): Runs the pipelines, owns the watermark and the recurring trigger
//! - **Checkpoint** (`checkpoint`): Durable watermark row with optimistic concurrency
//! - **Search Index** (`index`): Port to the search backend
//! - **Notifier** (`notifier`): Watchlist notification hook
//! - **Reports** (`report`): Results returned to callers

pub mod checkpoint;
pub mod coordinator;
pub mod error;
pub mod index;
pub mod notifier;
pub mod report;

pub use checkpoint::{
    CheckpointRepository, SqliteCheckpointRepository, SyncMetadata, CHECKPOINT_KEY,
};
pub use coordinator::{SyncCoordinator, SCHEDULED_SYNC_TASK};
pub use error::{Result, SyncError};
pub use index::{IndexHealth, IndexStats, SearchIndex, EPISODES_INDEX, MOVIES_INDEX};
pub use notifier::{NoopNotifier, WatchlistNotifier};
pub use report::{
    BatchSyncReport, ChangeAction, EntityKind, SyncReport, SyncStatusSnapshot, SyncType,
    ValidationReport,
};
