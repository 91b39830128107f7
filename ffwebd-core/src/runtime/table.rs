//! The in-memory task table.
//!
//! Single source of truth for task state. All transitions happen under
//! the write lock and publish a whole new task value, so readers always
//! observe a consistent snapshot and the FSM can never move backwards.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, RwLock};
use tracing::warn;

use crate::runtime::task::{Task, TaskStatus};
use crate::runtime::types::ManagerError;

/// A task plus its runtime-only cancellation capability.
///
/// The handle is installed when an executor takes the task into
/// `processing` and cleared on the terminal transition, so it is
/// non-nil exactly while the task is processing.
#[derive(Debug)]
struct TaskRecord {
    task: Task,
    cancel_tx: Option<Arc<watch::Sender<bool>>>,
}

/// What a cancel request resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was still queued and is now terminally canceled.
    CanceledInQueue,
    /// The task is processing; its cancel handle was fired and the
    /// executor will publish the terminal state.
    SignalSent,
}

#[derive(Debug, Default)]
pub struct TaskTable {
    inner: RwLock<HashMap<String, TaskRecord>>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: Task) {
        let record = TaskRecord {
            task,
            cancel_tx: None,
        };
        self.inner
            .write()
            .await
            .insert(record.task.id.clone(), record);
    }

    /// Remove a row entirely (submission rollback only).
    pub async fn remove(&self, id: &str) {
        self.inner.write().await.remove(id);
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.inner.read().await.get(id).map(|r| r.task.clone())
    }

    /// Unordered snapshot of every task.
    pub async fn list(&self) -> Vec<Task> {
        self.inner
            .read()
            .await
            .values()
            .map(|r| r.task.clone())
            .collect()
    }

    /// Move a queued task into `processing`, installing its cancel
    /// handle and start timestamp in the same publish.
    ///
    /// Returns the fresh snapshot, or `None` when the task is unknown
    /// or no longer queued (e.g. canceled while waiting), in which case
    /// the caller must drop the task without running the driver.
    pub async fn begin_processing(
        &self,
        id: &str,
        cancel_tx: Arc<watch::Sender<bool>>,
    ) -> Option<Task> {
        let mut guard = self.inner.write().await;
        let record = guard.get_mut(id)?;
        if record.task.status != TaskStatus::Queued {
            return None;
        }
        record.task.status = TaskStatus::Processing;
        record.task.started_at = Some(Utc::now());
        record.cancel_tx = Some(cancel_tx);
        Some(record.task.clone())
    }

    /// Publish the terminal state of a processing task and clear its
    /// cancel handle.
    pub async fn finish(
        &self,
        id: &str,
        status: TaskStatus,
        error: Option<String>,
        driver_log: String,
        input_path: Option<PathBuf>,
        output_path: Option<PathBuf>,
    ) {
        debug_assert!(status.is_terminal());
        let mut guard = self.inner.write().await;
        let Some(record) = guard.get_mut(id) else {
            warn!(task_id = %id, "finish on unknown task");
            return;
        };
        if record.task.status != TaskStatus::Processing {
            warn!(
                task_id = %id,
                status = %record.task.status,
                "refusing terminal transition from non-processing state"
            );
            return;
        }
        record.task.status = status;
        record.task.error = error;
        record.task.driver_log = Some(driver_log);
        record.task.input_path = input_path;
        record.task.output_path = output_path;
        record.task.completed_at = Some(Utc::now());
        record.cancel_tx = None;
    }

    /// Apply a user cancel request under the table lock.
    pub async fn cancel(&self, id: &str) -> Result<CancelOutcome, ManagerError> {
        let mut guard = self.inner.write().await;
        let record = guard.get_mut(id).ok_or_else(|| ManagerError::NotFound {
            task_id: id.to_owned(),
        })?;
        match record.task.status {
            status if status.is_terminal() => Err(ManagerError::IllegalState {
                status: status.as_str().to_owned(),
            }),
            TaskStatus::Queued => {
                record.task.status = TaskStatus::Canceled;
                record.task.error = Some("Canceled by user while in queue".into());
                Ok(CancelOutcome::CanceledInQueue)
            }
            TaskStatus::Processing => match &record.cancel_tx {
                Some(tx) => {
                    let _ = tx.send(true);
                    Ok(CancelOutcome::SignalSent)
                }
                None => Err(ManagerError::MissingCancelHandle {
                    task_id: id.to_owned(),
                }),
            },
            // Terminal states are matched by the guard arm above.
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_task() -> Task {
        Task::new("-i ${INPUT_MEDIA}".into(), "/tmp/in.mp4".into(), "mp4".into())
    }

    fn handle() -> Arc<watch::Sender<bool>> {
        Arc::new(watch::channel(false).0)
    }

    #[tokio::test]
    async fn begin_processing_installs_handle_and_timestamps() {
        let table = TaskTable::new();
        let task = queued_task();
        let id = task.id.clone();
        table.insert(task).await;

        let snap = table.begin_processing(&id, handle()).await.unwrap();
        assert_eq!(snap.status, TaskStatus::Processing);
        assert!(snap.started_at.is_some());
        assert!(snap.started_at.unwrap() >= snap.created_at);
    }

    #[tokio::test]
    async fn begin_processing_skips_canceled_tasks() {
        let table = TaskTable::new();
        let task = queued_task();
        let id = task.id.clone();
        table.insert(task).await;

        assert_eq!(
            table.cancel(&id).await.unwrap(),
            CancelOutcome::CanceledInQueue
        );
        assert!(table.begin_processing(&id, handle()).await.is_none());

        let task = table.get(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Canceled);
        assert_eq!(task.error.as_deref(), Some("Canceled by user while in queue"));
    }

    #[tokio::test]
    async fn finish_publishes_terminal_state_once() {
        let table = TaskTable::new();
        let task = queued_task();
        let id = task.id.clone();
        table.insert(task).await;
        table.begin_processing(&id, handle()).await.unwrap();

        table
            .finish(&id, TaskStatus::Completed, None, "log".into(), None, None)
            .await;
        let task = table.get(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.unwrap() >= task.started_at.unwrap());

        // A second terminal publish is refused; the FSM never moves
        // backwards out of a terminal state.
        table
            .finish(&id, TaskStatus::Failed, Some("late".into()), String::new(), None, None)
            .await;
        let task = table.get(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.error.is_none());
    }

    #[tokio::test]
    async fn cancel_is_illegal_on_terminal_tasks() {
        let table = TaskTable::new();
        let task = queued_task();
        let id = task.id.clone();
        table.insert(task).await;
        table.begin_processing(&id, handle()).await.unwrap();
        table
            .finish(&id, TaskStatus::Failed, Some("boom".into()), String::new(), None, None)
            .await;

        let err = table.cancel(&id).await.unwrap_err();
        assert!(matches!(err, ManagerError::IllegalState { .. }));
        // Idempotently illegal.
        let err = table.cancel(&id).await.unwrap_err();
        assert!(matches!(err, ManagerError::IllegalState { .. }));
    }

    #[tokio::test]
    async fn cancel_processing_fires_the_handle() {
        let table = TaskTable::new();
        let task = queued_task();
        let id = task.id.clone();
        table.insert(task).await;

        let (tx, rx) = watch::channel(false);
        table.begin_processing(&id, Arc::new(tx)).await.unwrap();

        assert_eq!(table.cancel(&id).await.unwrap(), CancelOutcome::SignalSent);
        assert!(*rx.borrow());
        // Status is still processing; the executor owns the terminal
        // transition.
        assert_eq!(table.get(&id).await.unwrap().status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn cancel_unknown_task_is_not_found() {
        let table = TaskTable::new();
        let err = table.cancel("nope").await.unwrap_err();
        assert!(matches!(err, ManagerError::NotFound { .. }));
    }
}
