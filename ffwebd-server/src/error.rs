//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are converted to a JSON
//! `{"error": …}` body with the right status code. Internal errors are
//! logged with full detail but only a generic message reaches the
//! caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use ffwebd_core::ManagerError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Admission is temporarily impossible (queue full, shutting down).
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<ManagerError> for ServerError {
    fn from(err: ManagerError) -> Self {
        match &err {
            ManagerError::NotFound { .. }
            | ManagerError::InvalidFilename
            | ManagerError::FileNotFound => ServerError::NotFound(err.to_string()),
            ManagerError::IllegalState { .. } => ServerError::BadRequest(err.to_string()),
            ManagerError::QueueFull { .. } | ManagerError::ShuttingDown => {
                ServerError::Unavailable(err.to_string())
            }
            ManagerError::MissingCancelHandle { .. } => ServerError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ServerError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn manager_errors_map_to_expected_statuses() {
        assert_eq!(
            status_of(
                ManagerError::NotFound {
                    task_id: "x".into()
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                ManagerError::IllegalState {
                    status: "completed".into()
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ManagerError::QueueFull { capacity: 100 }.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ManagerError::FileNotFound.into()),
            StatusCode::NOT_FOUND
        );
    }
}
