use thiserror::Error;

/// Errors produced on the execution path of a single task.
///
/// Everything here ends up recorded on the task row; only the command
/// errors ([`TaskError::Syntax`], [`TaskError::DisallowedCharacter`],
/// [`TaskError::MissingPlaceholder`]) are also surfaced synchronously at
/// admission time.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The command string could not be tokenized.
    #[error("invalid command syntax: {0}")]
    Syntax(String),

    /// An argument contains a forbidden shell metacharacter.
    #[error("disallowed character found in argument: {0}")]
    DisallowedCharacter(String),

    /// No argument equals the input placeholder token.
    #[error("command must include the input placeholder '${{INPUT_MEDIA}}'")]
    MissingPlaceholder,

    /// The resource gate rejected the job.
    #[error("insufficient system resources: {0}")]
    ResourceExhausted(String),

    /// The input URL answered with a non-success status.
    #[error("failed to download input, status: {status}")]
    Upstream { status: u16 },

    /// The input exceeded the configured size cap.
    #[error("input file size exceeds limit of {limit} bytes")]
    InputTooLarge { limit: u64 },

    /// The input uses a scheme the stager does not handle.
    #[error("unsupported input scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    /// Network failure while fetching a URL input.
    #[error("failed to download input: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem failure while staging input or preparing the temp root.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured transcoder binary could not be resolved at startup.
    #[error("transcoder binary not found or not in PATH: {0}")]
    BinaryNotFound(String),

    /// The transcoder exited non-zero or could not be spawned.
    #[error("transcoder execution failed: {detail}")]
    Driver { detail: String },

    /// The per-task context was canceled or its deadline expired.
    #[error("task was canceled or timed out")]
    Canceled,
}

impl TaskError {
    /// True for outcomes that terminate the task as `canceled` rather
    /// than `failed`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }
}

/// Errors produced by the control operations of the task manager.
#[derive(Debug, Clone, Error)]
pub enum ManagerError {
    /// The referenced task does not exist.
    #[error("task {task_id} not found")]
    NotFound { task_id: String },

    /// The requested transition is not legal from the task's state.
    #[error("cannot cancel task in state: {status}")]
    IllegalState { status: String },

    /// A processing task has no installed cancellation handle.
    #[error("task {task_id} is processing but has no cancellation handle")]
    MissingCancelHandle { task_id: String },

    /// The submission queue is at capacity.
    #[error("submission queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The manager's loops have exited.
    #[error("task manager is shutting down")]
    ShuttingDown,

    /// The artifact name is not a plain basename.
    #[error("invalid filename")]
    InvalidFilename,

    /// The artifact does not exist under the temp root.
    #[error("file not found")]
    FileNotFound,
}
