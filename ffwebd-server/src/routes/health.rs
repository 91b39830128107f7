//! Health / heartbeat endpoint.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

/// Register health-check routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Heartbeat endpoint. Load-balancers and monitoring poll this; it is
/// never behind auth.
pub async fn get_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
