//! Synchronous execution stub.
//!
//! Reserved route: transcoding inline with the request would bypass the
//! queue and its bounds, so the endpoint stays unimplemented.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/call", post(sync_call))
}

async fn sync_call() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "error": "Synchronous calls are not supported. Use the asynchronous /api/v1/tasks endpoint."
        })),
    )
}
