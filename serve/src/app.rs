//! Axum app: shared state and router.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use palaver::runtime::Runtime;

use crate::run::{run_handler, wakeup_handler};

/// Shared server state.
pub struct AppState {
    pub(crate) runtime: Arc<Runtime>,
    /// Thread id used by the wake-up endpoint (one conversation thread per
    /// deployment; multi-thread deployments route by thread in the run
    /// endpoint).
    pub(crate) default_thread: String,
}

impl AppState {
    pub fn new(runtime: Arc<Runtime>, default_thread: impl Into<String>) -> Self {
        Self {
            runtime,
            default_thread: default_thread.into(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/threads/:thread_id/runs", post(run_handler))
        .route("/wakeup/:channel_id", get(wakeup_handler))
        .with_state(state)
}
