mod runtime;

pub use runtime::command::{split_command, validate_args, INPUT_MEDIA_PLACEHOLDER};
pub use runtime::driver::{DriverConfig, FfmpegDriver, RunReport, RunSignals, TranscodeRunner};
pub use runtime::gate::{GateConfig, ResourceGate};
pub use runtime::manager::{Manager, ManagerConfig};
pub use runtime::task::{Task, TaskStatus};
pub use runtime::types::{ManagerError, TaskError};
