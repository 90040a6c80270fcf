//! HTTP surface for the palaver runtime (axum).
//!
//! Routes:
//! * `POST /threads/:thread_id/runs` accepts the run-input document and
//!   streams the side-channel lines back as the response body.
//! * `GET /wakeup/:channel_id` triggers a pipeline run for that channel;
//!   idempotent (an already-active channel makes the wake-up a no-op).
//!
//! **Public API**: [`router`], [`run_serve_on_listener`], [`AppState`].

mod app;
mod run;

pub use app::{router, AppState};

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use palaver::runtime::Runtime;

/// Serves the runtime on an existing listener (tests bind to port 0 first).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    runtime: Arc<Runtime>,
    default_thread: impl Into<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("palaver runtime listening on http://{addr}");
    let state = Arc::new(AppState::new(runtime, default_thread));
    axum::serve(listener, router(state)).await?;
    Ok(())
}
