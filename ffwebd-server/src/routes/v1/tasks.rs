//! Asynchronous task endpoints: submit, list, inspect, cancel.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::json;

use ffwebd_core::{split_command, validate_args, Task, TaskStatus};

use crate::config::Config;
use crate::error::ServerError;
use crate::schemas::v1::task::{CreateTaskRequest, TaskResponse};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/cancel", patch(cancel_task))
}

/// Admission: command syntax and safety are validated synchronously;
/// everything that can only fail at execution time lands on the task
/// row instead.
async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    let args = split_command(&req.command).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    validate_args(&args).map_err(|e| ServerError::BadRequest(format!("Invalid command: {e}")))?;

    if req.output_ext.is_empty() || !req.output_ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ServerError::BadRequest(
            "outputExt must be alphanumeric with no separators".into(),
        ));
    }

    let task = state
        .manager
        .submit(req.command, req.input_media, req.output_ext)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "taskId": task.id }))))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<TaskResponse>>, ServerError> {
    let tasks = state.manager.list().await;
    Ok(Json(
        tasks
            .iter()
            .map(|t| TaskResponse::from_task(t, download_url(&state.config, &headers, t)))
            .collect(),
    ))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TaskResponse>, ServerError> {
    let task = state.manager.get(&id).await?;
    let url = download_url(&state.config, &headers, &task);
    Ok(Json(TaskResponse::from_task(&task, url)))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.manager.cancel(&id).await?;
    Ok(Json(json!({ "message": "Task cancellation requested" })))
}

/// Construct the artifact download URL for a completed task.
///
/// `BASE` wins when configured; otherwise the URL is derived from the
/// request `Host` header. The server itself never terminates TLS, so
/// the derived scheme is plain http.
fn download_url(config: &Config, headers: &HeaderMap, task: &Task) -> Option<String> {
    if task.status != TaskStatus::Completed {
        return None;
    }
    let filename = task.output_path.as_ref()?.file_name()?.to_string_lossy();

    let base = if config.base_url.is_empty() {
        let host = headers.get(header::HOST).and_then(|v| v.to_str().ok())?;
        format!("http://{host}")
    } else {
        config.base_url.trim_end_matches('/').to_owned()
    };
    Some(format!("{base}/api/v1/files/{filename}"))
}
