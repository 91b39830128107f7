//! The task manager: submission queue, bounded worker pool, cancellation
//! dispatch, and the artifact reaper.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::runtime::driver::{watch_flagged, RunSignals, TranscodeRunner};
use crate::runtime::table::{CancelOutcome, TaskTable};
use crate::runtime::task::{Task, TaskStatus};
use crate::runtime::types::ManagerError;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Hard bound on concurrently processing tasks.
    pub max_concurrency: usize,
    /// Submission queue capacity; overflow is rejected, not blocked.
    pub queue_capacity: usize,
    /// Per-task deadline, measured from the start of processing.
    pub task_timeout: Duration,
    /// How long completed artifacts are retained on disk.
    pub output_lifetime: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            queue_capacity: 100,
            task_timeout: Duration::from_secs(12 * 60 + 3),
            output_lifetime: Duration::from_secs(60 * 83),
        }
    }
}

/// Cloneable handle to the control plane.
///
/// `start` spawns the dispatch loop and the reaper; both exit when the
/// shutdown watch flips, and in-flight executors observe the same
/// signal through their run context.
#[derive(Clone)]
pub struct Manager {
    table: Arc<TaskTable>,
    queue_tx: mpsc::Sender<String>,
    queue_capacity: usize,
    temp_root: PathBuf,
}

impl Manager {
    pub fn start(
        cfg: ManagerConfig,
        runner: Arc<dyn TranscodeRunner>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel::<String>(cfg.queue_capacity);
        let table = Arc::new(TaskTable::new());
        let semaphore = Arc::new(Semaphore::new(cfg.max_concurrency));
        let temp_root = runner.temp_root().to_path_buf();

        info!(
            max_concurrency = cfg.max_concurrency,
            queue_capacity = cfg.queue_capacity,
            "task manager started"
        );

        tokio::spawn(dispatch_loop(
            queue_rx,
            Arc::clone(&table),
            runner,
            semaphore,
            shutdown.clone(),
            cfg.task_timeout,
        ));
        tokio::spawn(reaper_loop(
            Arc::clone(&table),
            cfg.output_lifetime,
            shutdown,
        ));

        Self {
            table,
            queue_tx,
            queue_capacity: cfg.queue_capacity,
            temp_root,
        }
    }

    /// Create a task and enqueue it. The command is assumed to have
    /// passed admission validation already.
    pub async fn submit(
        &self,
        command: String,
        input_media: String,
        output_ext: String,
    ) -> Result<Task, ManagerError> {
        let task = Task::new(command, input_media, output_ext);
        self.table.insert(task.clone()).await;

        if let Err(err) = self.queue_tx.try_send(task.id.clone()) {
            self.table.remove(&task.id).await;
            return Err(match err {
                mpsc::error::TrySendError::Full(_) => ManagerError::QueueFull {
                    capacity: self.queue_capacity,
                },
                mpsc::error::TrySendError::Closed(_) => ManagerError::ShuttingDown,
            });
        }

        info!(task_id = %task.id, "task submitted to queue");
        Ok(task)
    }

    pub async fn get(&self, id: &str) -> Result<Task, ManagerError> {
        self.table.get(id).await.ok_or_else(|| ManagerError::NotFound {
            task_id: id.to_owned(),
        })
    }

    /// Unordered snapshot of all tasks.
    pub async fn list(&self) -> Vec<Task> {
        self.table.list().await
    }

    /// Request cancellation. Queued tasks transition immediately;
    /// processing tasks are signalled and the executor publishes the
    /// terminal state; terminal tasks are rejected.
    pub async fn cancel(&self, id: &str) -> Result<(), ManagerError> {
        match self.table.cancel(id).await? {
            CancelOutcome::CanceledInQueue => {
                info!(task_id = %id, "task marked as canceled in queue");
            }
            CancelOutcome::SignalSent => {
                info!(task_id = %id, "cancellation signal sent to running task");
            }
        }
        Ok(())
    }

    /// The sole authorized read path for artifacts: basenames only,
    /// joined under the temp root, and only if the file exists.
    pub async fn resolve_artifact(&self, filename: &str) -> Result<PathBuf, ManagerError> {
        let basename = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str());
        if filename.is_empty()
            || filename.contains(['/', '\\'])
            || basename != Some(filename)
        {
            return Err(ManagerError::InvalidFilename);
        }

        let full_path = self.temp_root.join(filename);
        match tokio::fs::metadata(&full_path).await {
            Ok(meta) if meta.is_file() => Ok(full_path),
            _ => Err(ManagerError::FileNotFound),
        }
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }
}

/// Pops task ids FIFO and launches executors, each owning a semaphore
/// permit. Acquiring the permit here (not in the executor) keeps
/// dispatch in submission order and makes a zero-capacity semaphore
/// freeze dispatch entirely.
async fn dispatch_loop(
    mut queue_rx: mpsc::Receiver<String>,
    table: Arc<TaskTable>,
    runner: Arc<dyn TranscodeRunner>,
    semaphore: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
    task_timeout: Duration,
) {
    loop {
        let task_id = tokio::select! {
            _ = watch_flagged(&mut shutdown) => break,
            next = queue_rx.recv() => match next {
                Some(id) => id,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = watch_flagged(&mut shutdown) => break,
            acquired = Arc::clone(&semaphore).acquire_owned() => match acquired {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        tokio::spawn(execute(
            task_id,
            permit,
            Arc::clone(&table),
            Arc::clone(&runner),
            shutdown.clone(),
            task_timeout,
        ));
    }
    info!("dispatch loop shutting down");
}

/// Runs one task to a terminal state. Holds its semaphore permit for
/// the whole execution.
async fn execute(
    task_id: String,
    permit: OwnedSemaphorePermit,
    table: Arc<TaskTable>,
    runner: Arc<dyn TranscodeRunner>,
    shutdown: watch::Receiver<bool>,
    task_timeout: Duration,
) {
    let _permit = permit;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let Some(task) = table.begin_processing(&task_id, Arc::new(cancel_tx)).await else {
        debug!(task_id = %task_id, "task no longer queued; dropping without execution");
        return;
    };

    info!(task_id = %task_id, "processing task");
    let mut signals = RunSignals::new(cancel_rx, shutdown, Instant::now() + task_timeout);
    let report = runner.run(&task, &mut signals).await;

    let (status, error) = match &report.outcome {
        Ok(()) => (TaskStatus::Completed, None),
        Err(err) if err.is_cancellation() => (
            TaskStatus::Canceled,
            Some("Task was canceled or timed out".to_owned()),
        ),
        Err(err) => (TaskStatus::Failed, Some(err.to_string())),
    };
    match status {
        TaskStatus::Completed => info!(task_id = %task_id, "task completed successfully"),
        TaskStatus::Canceled => info!(task_id = %task_id, "task canceled or timed out"),
        _ => warn!(task_id = %task_id, error = error.as_deref().unwrap_or(""), "task failed"),
    }

    table
        .finish(
            &task_id,
            status,
            error,
            report.log,
            report.input_path,
            report.output_path,
        )
        .await;
}

/// Periodically deletes output artifacts of completed tasks older than
/// the retention window. Task rows are retained so status lookups keep
/// working; only the file disappears.
async fn reaper_loop(table: Arc<TaskTable>, lifetime: Duration, mut shutdown: watch::Receiver<bool>) {
    let tick = (lifetime / 4).max(Duration::from_millis(10));
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = watch_flagged(&mut shutdown) => break,
            _ = interval.tick() => reap_expired(&table, lifetime).await,
        }
    }
    info!("artifact reaper shutting down");
}

async fn reap_expired(table: &TaskTable, lifetime: Duration) {
    for task in table.list().await {
        if task.status != TaskStatus::Completed {
            continue;
        }
        let (Some(output_path), Some(completed_at)) = (&task.output_path, task.completed_at)
        else {
            continue;
        };
        let age = (Utc::now() - completed_at).to_std().unwrap_or_default();
        if age <= lifetime {
            continue;
        }
        match tokio::fs::remove_file(output_path).await {
            Ok(()) => info!(
                task_id = %task.id,
                path = %output_path.display(),
                "removed expired output artifact"
            ),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                task_id = %task.id,
                path = %output_path.display(),
                error = %err,
                "failed to remove expired artifact"
            ),
        }
    }
}
