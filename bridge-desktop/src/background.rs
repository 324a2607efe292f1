//! Background Task Execution Implementation

use async_trait::async_trait;
use bridge_traits::{
    background::{BackgroundExecutor, TaskHandler, TaskId, TaskSchedule, TaskStatus},
    error::{BridgeError, Result},
    time::{Clock, SystemClock},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Tokio-based background executor for server and desktop hosts.
pub struct TokioBackgroundExecutor {
    tasks: Arc<RwLock<HashMap<TaskId, TaskInfo>>>,
    clock: Arc<dyn Clock>,
}

struct TaskInfo {
    status: TaskStatus,
    handle: Option<JoinHandle<()>>,
    cancel: Option<oneshot::Sender<()>>,
    last_run: Option<i64>,
    next_run: Option<i64>,
}

impl TokioBackgroundExecutor {
    /// Create a new background executor driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a background executor with a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn millis_to_duration(millis: i64) -> Duration {
        if millis <= 0 {
            Duration::from_secs(0)
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    async fn set_status(
        tasks: &RwLock<HashMap<TaskId, TaskInfo>>,
        id: &TaskId,
        status: TaskStatus,
        next_run: Option<i64>,
    ) {
        let mut tasks = tasks.write().await;
        if let Some(info) = tasks.get_mut(id) {
            info.status = status;
            info.next_run = next_run;
        }
    }

    async fn run_recurring_task(
        tasks: Arc<RwLock<HashMap<TaskId, TaskInfo>>>,
        id: TaskId,
        handler: TaskHandler,
        schedule: Arc<dyn TaskSchedule>,
        mut cancel_rx: oneshot::Receiver<()>,
        clock: Arc<dyn Clock>,
    ) {
        loop {
            let now = clock.now();
            let Some(next) = schedule.next_after(now) else {
                info!(task_id = %id, "Schedule has no further fire times; stopping task");
                Self::set_status(&tasks, &id, TaskStatus::Completed, None).await;
                break;
            };

            let next_millis = next.timestamp_millis();
            {
                let mut tasks = tasks.write().await;
                if let Some(info) = tasks.get_mut(&id) {
                    info.next_run = Some(next_millis);
                }
            }

            let wait = Self::millis_to_duration(next_millis - now.timestamp_millis());
            debug!(task_id = %id, wait_ms = wait.as_millis() as u64, "Waiting for next fire time");

            let fire = sleep(wait);
            tokio::pin!(fire);
            tokio::select! {
                _ = &mut cancel_rx => {
                    Self::set_status(&tasks, &id, TaskStatus::Cancelled, None).await;
                    break;
                }
                _ = fire.as_mut() => {}
            }

            Self::set_status(&tasks, &id, TaskStatus::Running, None).await;

            let result = handler().await;

            let mut tasks = tasks.write().await;
            if let Some(info) = tasks.get_mut(&id) {
                info.last_run = Some(clock.unix_timestamp_millis());
                info.status = match result {
                    Ok(()) => TaskStatus::Completed,
                    Err(err) => {
                        warn!(task_id = %id, error = %err, "Recurring task failed");
                        TaskStatus::Failed
                    }
                };
            }
        }
    }

    /// Timestamp (unix millis) of the last completed run, if any.
    pub async fn last_run(&self, task_id: &TaskId) -> Option<i64> {
        let tasks = self.tasks.read().await;
        tasks.get(task_id).and_then(|info| info.last_run)
    }

    async fn abort_existing(&self, id: &TaskId) {
        let mut tasks = self.tasks.write().await;
        if let Some(mut info) = tasks.remove(id) {
            if let Some(cancel) = info.cancel.take() {
                let _ = cancel.send(());
            }
            if let Some(handle) = info.handle.take() {
                handle.abort();
            }
        }
    }
}

impl Default for TokioBackgroundExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundExecutor for TokioBackgroundExecutor {
    async fn schedule_recurring(
        &self,
        task_id: &str,
        schedule: Arc<dyn TaskSchedule>,
        handler: TaskHandler,
    ) -> Result<TaskId> {
        let id = TaskId::new(task_id);

        info!(
            task_id = task_id,
            schedule = %schedule.describe(),
            "Scheduling recurring task"
        );

        self.abort_existing(&id).await;

        let (cancel_tx, cancel_rx) = oneshot::channel();

        {
            let mut tasks = self.tasks.write().await;
            tasks.insert(
                id.clone(),
                TaskInfo {
                    status: TaskStatus::Scheduled,
                    handle: None,
                    cancel: Some(cancel_tx),
                    last_run: None,
                    next_run: None,
                },
            );
        }

        let tasks = Arc::clone(&self.tasks);
        let task_id_clone = id.clone();
        let clock = Arc::clone(&self.clock);

        let handle = tokio::spawn(async move {
            TokioBackgroundExecutor::run_recurring_task(
                tasks,
                task_id_clone,
                handler,
                schedule,
                cancel_rx,
                clock,
            )
            .await;
        });

        let mut tasks = self.tasks.write().await;
        if let Some(info) = tasks.get_mut(&id) {
            info.handle = Some(handle);
        }

        Ok(id)
    }

    async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        debug!(task_id = %task_id, "Cancelling task");

        let mut tasks = self.tasks.write().await;
        if let Some(mut info) = tasks.remove(task_id) {
            if let Some(cancel) = info.cancel.take() {
                let _ = cancel.send(());
            }
            if let Some(handle) = info.handle.take() {
                handle.abort();
            }
            return Ok(());
        }

        Err(BridgeError::TaskNotFound(task_id.to_string()))
    }

    async fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus> {
        let tasks = self.tasks.read().await;
        tasks
            .get(task_id)
            .map(|info| info.status.clone())
            .ok_or_else(|| BridgeError::TaskNotFound(task_id.to_string()))
    }

    async fn list_tasks(&self) -> Result<Vec<TaskId>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.keys().cloned().collect())
    }

    async fn next_execution_time(&self, task_id: &TaskId) -> Result<Option<Duration>> {
        let tasks = self.tasks.read().await;
        let info = tasks
            .get(task_id)
            .ok_or_else(|| BridgeError::TaskNotFound(task_id.to_string()))?;

        Ok(info.next_run.map(|next| {
            Self::millis_to_duration(next - self.clock.unix_timestamp_millis())
        }))
    }
}
