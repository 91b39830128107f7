use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle state of a task.
///
/// Transitions are strictly forward:
/// `Queued → Processing → {Completed, Failed, Canceled}` plus the
/// `Queued → Canceled` shortcut for user cancellation while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The in-memory record for a single transcoding job.
///
/// The task table owns the canonical copy; every observer gets a clone,
/// so a `Task` value is always a consistent snapshot of one published
/// state.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique, URL-safe identifier: uuid (hex) + submission epoch seconds.
    pub id: String,
    pub status: TaskStatus,
    /// Raw user command string. Never echoed back to clients.
    pub command: String,
    /// User-supplied URL or local path.
    pub input_media: String,
    /// Requested output extension, validated alphanumeric at admission.
    pub output_ext: String,
    /// Where the input was staged. Bookkeeping only; the file itself is
    /// removed before the task reaches a terminal state.
    pub input_path: Option<PathBuf>,
    /// Output artifact. Set exactly when the task completed.
    pub output_path: Option<PathBuf>,
    /// Human-readable failure summary for terminal non-success states.
    pub error: Option<String>,
    /// Merged stdout+stderr of the transcoder run.
    pub driver_log: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(command: String, input_media: String, output_ext: String) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{}_{}", Uuid::new_v4().simple(), now.timestamp()),
            status: TaskStatus::Queued,
            command,
            input_media,
            output_ext,
            input_path: None,
            output_path: None,
            error: None,
            driver_log: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_queued_with_unique_id() {
        let a = Task::new("-i x".into(), "/tmp/a".into(), "mp4".into());
        let b = Task::new("-i x".into(), "/tmp/a".into(), "mp4".into());
        assert_eq!(a.status, TaskStatus::Queued);
        assert_ne!(a.id, b.id);
        assert!(a.started_at.is_none());
        assert!(a.output_path.is_none());
    }

    #[test]
    fn id_is_url_safe() {
        let t = Task::new(String::new(), String::new(), "mp4".into());
        assert!(t
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
    }
}
