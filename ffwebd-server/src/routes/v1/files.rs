//! Artifact downloads.
//!
//! The filename must be a pure basename; resolution against the temp
//! root happens in the manager, which is the sole authorized read path
//! for artifacts.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::Request;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::ServerError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/files/{filename}", get(get_file))
}

async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ServerError> {
    let path = state.manager.resolve_artifact(&filename).await?;

    let request = Request::builder()
        .body(Body::empty())
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(e) => Err(ServerError::Internal(e.to_string())),
    }
}
