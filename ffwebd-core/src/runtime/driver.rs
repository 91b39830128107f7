//! Transcoder driver.
//!
//! Turns a validated task into an argv, spawns the external transcoder
//! under a cancellable deadline, captures its merged output, and
//! enforces the post-conditions (partial-output cleanup, staged-input
//! release).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::runtime::command::{split_command, INPUT_MEDIA_PLACEHOLDER};
use crate::runtime::gate::{GateConfig, ResourceGate};
use crate::runtime::staging::stage;
use crate::runtime::task::Task;
use crate::runtime::types::TaskError;

/// Interruption sources for a single run: the task's own cancel handle,
/// the process-wide shutdown signal, and the per-task deadline.
#[derive(Debug)]
pub struct RunSignals {
    cancel: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
    deadline: Instant,
}

impl RunSignals {
    pub fn new(
        cancel: watch::Receiver<bool>,
        shutdown: watch::Receiver<bool>,
        deadline: Instant,
    ) -> Self {
        Self {
            cancel,
            shutdown,
            deadline,
        }
    }

    /// Resolves when any interruption source fires. Never resolves
    /// spuriously; the deadline alone bounds the wait.
    pub async fn interrupted(&mut self) {
        tokio::select! {
            _ = watch_flagged(&mut self.cancel) => {}
            _ = watch_flagged(&mut self.shutdown) => {}
            _ = tokio::time::sleep_until(self.deadline) => {}
        }
    }
}

/// Resolves once the watched flag becomes true. A closed channel pends
/// forever; callers always pair this with a bounded branch.
pub(crate) async fn watch_flagged(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Everything the worker needs to classify and publish a finished run.
#[derive(Debug)]
pub struct RunReport {
    /// Merged stdout+stderr of the transcoder, empty if it never ran.
    pub log: String,
    /// Where the input was staged (already released by the time the
    /// report is returned).
    pub input_path: Option<PathBuf>,
    /// The produced artifact; `Some` only on success.
    pub output_path: Option<PathBuf>,
    pub outcome: Result<(), TaskError>,
}

impl RunReport {
    fn failure(err: TaskError) -> Self {
        Self {
            log: String::new(),
            input_path: None,
            output_path: None,
            outcome: Err(err),
        }
    }
}

/// The execution seam between the task manager and the external
/// transcoder, mockable in manager tests.
#[async_trait]
pub trait TranscodeRunner: Send + Sync {
    async fn run(&self, task: &Task, signals: &mut RunSignals) -> RunReport;

    /// Root directory holding staged inputs and output artifacts.
    fn temp_root(&self) -> &Path;
}

/// Driver configuration, derived from service config at startup.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Transcoder binary; resolved on PATH or as a filesystem path.
    pub ff_bin: String,
    /// Input size cap in bytes.
    pub max_input_size: u64,
    pub gate: GateConfig,
}

/// Drives the external transcoder binary.
#[derive(Debug)]
pub struct FfmpegDriver {
    ff_bin: PathBuf,
    max_input_size: u64,
    gate: ResourceGate,
    http: reqwest::Client,
    temp_dir: tempfile::TempDir,
}

impl FfmpegDriver {
    /// Validates the binary and creates the process-private temp root
    /// (mode 0700, `ffwebapi_*` under the OS temp directory).
    pub fn new(cfg: DriverConfig) -> Result<Self, TaskError> {
        let ff_bin =
            resolve_binary(&cfg.ff_bin).ok_or_else(|| TaskError::BinaryNotFound(cfg.ff_bin.clone()))?;

        let temp_dir = tempfile::Builder::new().prefix("ffwebapi_").tempdir()?;
        info!(path = %temp_dir.path().display(), "using temporary directory");

        let gate = ResourceGate::new(cfg.gate, temp_dir.path().to_path_buf());
        Ok(Self {
            ff_bin,
            max_input_size: cfg.max_input_size,
            gate,
            http: reqwest::Client::new(),
            temp_dir,
        })
    }
}

#[async_trait]
impl TranscodeRunner for FfmpegDriver {
    async fn run(&self, task: &Task, signals: &mut RunSignals) -> RunReport {
        // 1. Admission against host telemetry.
        if let Err(err) = self.gate.admit().await {
            return RunReport::failure(err);
        }

        // 2. Stage the input. The guard releases the staged file on every
        // exit path below, including the interrupt drops.
        let staged = tokio::select! {
            result = stage(
                &self.http,
                self.temp_dir.path(),
                &task.input_media,
                &task.id,
                self.max_input_size,
            ) => match result {
                Ok(staged) => staged,
                Err(err) => return RunReport::failure(err),
            },
            _ = signals.interrupted() => return RunReport::failure(TaskError::Canceled),
        };
        let input_path = staged.path().to_path_buf();

        // 3. Build the argv: substitute the first exact-match sentinel
        // token with the staged path.
        let mut args = match split_command(&task.command) {
            Ok(args) => args,
            Err(err) => {
                return RunReport {
                    log: String::new(),
                    input_path: Some(input_path),
                    output_path: None,
                    outcome: Err(err),
                }
            }
        };
        let Some(slot) = args.iter().position(|arg| arg == INPUT_MEDIA_PLACEHOLDER) else {
            return RunReport {
                log: String::new(),
                input_path: Some(input_path),
                output_path: None,
                outcome: Err(TaskError::MissingPlaceholder),
            };
        };
        args[slot] = input_path.to_string_lossy().into_owned();

        // 4. Output artifact is always the final positional argument.
        let output_path = self
            .temp_dir
            .path()
            .join(format!("{}_output.{}", task.id, task.output_ext));
        args.push(output_path.to_string_lossy().into_owned());

        info!(
            task_id = %task.id,
            bin = %self.ff_bin.display(),
            argv = %args.join(" "),
            "executing transcoder"
        );

        // 5. Spawn with merged output capture. kill_on_drop backstops
        // the explicit kill below.
        let mut cmd = tokio::process::Command::new(&self.ff_bin);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return RunReport {
                    log: String::new(),
                    input_path: Some(input_path),
                    output_path: None,
                    outcome: Err(TaskError::Driver {
                        detail: format!("failed to spawn {}: {err}", self.ff_bin.display()),
                    }),
                }
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(drain(stdout));
        let stderr_task = tokio::spawn(drain(stderr));

        // 6. Wait for exit, or signal and reap the child on interrupt.
        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = signals.interrupted() => None,
        };
        let status = match waited {
            Some(status) => Some(status),
            None => {
                if let Err(err) = child.start_kill() {
                    warn!(task_id = %task.id, error = %err, "failed to signal transcoder");
                }
                let _ = child.wait().await;
                None
            }
        };

        let mut merged = stdout_task.await.unwrap_or_default();
        merged.extend(stderr_task.await.unwrap_or_default());
        let log = String::from_utf8_lossy(&merged).into_owned();

        let outcome = match status {
            None => {
                remove_partial(&output_path).await;
                Err(TaskError::Canceled)
            }
            Some(Err(err)) => {
                remove_partial(&output_path).await;
                Err(TaskError::Driver {
                    detail: format!("failed to wait for transcoder: {err}"),
                })
            }
            Some(Ok(status)) if !status.success() => {
                remove_partial(&output_path).await;
                Err(TaskError::Driver {
                    detail: match status.code() {
                        Some(code) => format!("exit status {code}"),
                        None => "terminated by signal".into(),
                    },
                })
            }
            Some(Ok(_)) => Ok(()),
        };

        let succeeded = outcome.is_ok();
        RunReport {
            log,
            input_path: Some(input_path),
            output_path: succeeded.then_some(output_path),
            outcome,
        }
        // `staged` drops here: the input file is released before the
        // worker can publish a terminal state.
    }

    fn temp_root(&self) -> &Path {
        self.temp_dir.path()
    }
}

async fn drain<R>(pipe: Option<R>) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove partial output"),
    }
}

/// Resolve the transcoder binary: paths are checked directly, bare names
/// are searched on PATH.
fn resolve_binary(bin: &str) -> Option<PathBuf> {
    let candidate = Path::new(bin);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(bin))
        .find(|full| full.is_file())
}
