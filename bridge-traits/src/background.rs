//! Background Execution and Task Scheduling
//!
//! Provides recurring task scheduling driven by a next-fire-time source.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};

use crate::error::Result;

/// Source of fire times for a recurring task.
///
/// Executors ask for the next instant strictly after "now", sleep until
/// then, run the handler, and ask again. Returning `None` ends the task.
pub trait TaskSchedule: Send + Sync {
    /// Next fire time strictly after `after`
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// Human-readable form of the schedule for logs
    fn describe(&self) -> String;
}

/// Scheduled task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task is waiting for its next fire time
    Scheduled,
    /// Task handler is currently executing
    Running,
    /// Last run completed successfully
    Completed,
    /// Last run failed; the task stays scheduled
    Failed,
    /// Task was cancelled
    Cancelled,
}

/// Zero-argument async callback invoked on every fire.
pub type TaskHandler = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure into a [`TaskHandler`].
pub fn task_handler<F, Fut>(handler: F) -> TaskHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move || handler().boxed())
}

/// Background task executor trait
///
/// Abstracts recurring task scheduling so the sync engine can register its
/// periodic incremental pass without owning a timer loop.
///
/// A failed handler run must never cancel future runs: implementations log
/// the failure, mark the task [`TaskStatus::Failed`], and keep the schedule.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{task_handler, BackgroundExecutor};
///
/// async fn schedule_sync(executor: &dyn BackgroundExecutor, schedule: Arc<dyn TaskSchedule>) -> Result<()> {
///     executor
///         .schedule_recurring("incremental_sync", schedule, task_handler(|| async { Ok(()) }))
///         .await?;
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait BackgroundExecutor: Send + Sync {
    /// Schedule a recurring task
    ///
    /// # Arguments
    ///
    /// * `task_id` - Unique identifier for the task
    /// * `schedule` - Fire-time source
    /// * `handler` - Callback invoked on every fire
    ///
    /// Scheduling an id that is already registered replaces the old task.
    async fn schedule_recurring(
        &self,
        task_id: &str,
        schedule: Arc<dyn TaskSchedule>,
        handler: TaskHandler,
    ) -> Result<TaskId>;

    /// Cancel a scheduled task
    async fn cancel_task(&self, task_id: &TaskId) -> Result<()>;

    /// Get status of a task
    async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus>;

    /// List all scheduled tasks
    async fn list_tasks(&self) -> Result<Vec<TaskId>>;

    /// Check if background execution is available
    async fn is_available(&self) -> bool {
        true
    }

    /// Get time until next execution
    ///
    /// Returns `None` if the task has no further fire time.
    async fn next_execution_time(&self, task_id: &TaskId) -> Result<Option<Duration>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_task_id() {
        let id1 = TaskId::new("incremental_sync");
        let id2 = TaskId::new("incremental_sync");

        assert_eq!(id1, id2);
        assert_eq!(id1.to_string(), "incremental_sync");
    }

    #[tokio::test]
    async fn test_task_handler_invokes_closure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let handler = task_handler(move || {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        handler().await.unwrap();
        handler().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
