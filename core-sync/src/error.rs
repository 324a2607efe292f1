use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Movie not found: {slug}")]
    MovieNotFound { slug: String },

    #[error("Full sync already in progress")]
    FullSyncInProgress,

    #[error("Search index error: {0}")]
    Index(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] LibraryError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Checkpoint update lost {attempts} consecutive races")]
    CheckpointConflict { attempts: u32 },

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid entity kind: {0}")]
    InvalidEntityKind(String),

    #[error("Invalid change action: {0}")]
    InvalidChangeAction(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Checkpoint(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
