//! Shared application state injected into every axum handler.

use std::sync::Arc;

use ffwebd_core::Manager;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Handle to the task control plane.
    pub manager: Manager,
}
