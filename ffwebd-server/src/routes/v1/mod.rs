//! The authenticated `/api/v1` surface.

mod call;
mod files;
mod tasks;

use std::sync::Arc;

use axum::{middleware, Router};

use crate::middleware::auth;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(tasks::router())
        .merge(files::router())
        .merge(call::router())
        .layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
