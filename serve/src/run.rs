//! Run and wake-up handlers.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info};

use palaver::runtime::RunInput;
use palaver::stream::StreamEvent;

use crate::app::AppState;

/// `POST /threads/:thread_id/runs`: runs the pipeline on the thread and
/// streams the side channel back, one directive or text line per line.
pub(crate) async fn run_handler(
    Path(thread_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(input): Json<RunInput>,
) -> Response {
    let (tx, rx) = mpsc::channel::<StreamEvent<palaver::PipelineState>>(128);
    let runtime = state.runtime.clone();
    tokio::spawn(async move {
        if let Err(e) = runtime.run(&thread_id, input, Some(tx)).await {
            error!(thread = %thread_id, error = %e, "run failed");
        }
    });

    let lines = ReceiverStream::new(rx).filter_map(|event| match event {
        StreamEvent::Directive(directive) => {
            let mut line = directive.encode();
            line.push('\n');
            Some(Ok::<Bytes, std::convert::Infallible>(Bytes::from(line)))
        }
        _ => None,
    });
    Body::from_stream(lines).into_response()
}

/// `GET /wakeup/:channel_id`: schedules a run for the channel; returns
/// immediately.
pub(crate) async fn wakeup_handler(
    Path(channel_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> StatusCode {
    info!(channel = %channel_id, "wake-up request");
    let runtime = state.runtime.clone();
    let thread_id = state.default_thread.clone();
    tokio::spawn(async move {
        if let Err(e) = runtime.wake_channel(&thread_id, &channel_id).await {
            error!(channel = %channel_id, error = %e, "wake-up run failed");
        }
    });
    StatusCode::ACCEPTED
}
