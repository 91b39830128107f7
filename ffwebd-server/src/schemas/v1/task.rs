use serde::{Deserialize, Serialize};

use ffwebd_core::Task;

/// Body of `POST /api/v1/tasks`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub command: String,
    #[serde(default)]
    pub input_media: String,
    pub output_ext: String,
}

/// Client-facing view of a task.
///
/// The raw command and input locations are deliberately absent; the
/// transcoder log is exposed under its historical `ffmpegOutput` name.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(rename = "ffmpegOutput", skip_serializing_if = "Option::is_none")]
    pub ffmpeg_output: Option<String>,
}

impl TaskResponse {
    pub fn from_task(task: &Task, download_url: Option<String>) -> Self {
        Self {
            id: task.id.clone(),
            status: task.status.as_str().to_owned(),
            output_path: task
                .output_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            download_url,
            error: task.error.clone(),
            created_at: task.created_at.to_rfc3339(),
            started_at: task.started_at.map(|t| t.to_rfc3339()),
            completed_at: task.completed_at.map(|t| t.to_rfc3339()),
            ffmpeg_output: task.driver_log.clone(),
        }
    }
}
