//! One pipeline run: load the thread's checkpoint, fold the run input,
//! invoke the graph. The serve surface and tests go through this.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use crate::error::RuntimeError;
use crate::graph::{CompiledGraph, RunContext};
use crate::history::{HistoryUpdate, WakeUp};
use crate::memory::{Checkpointer, RunConfig};
use crate::state::{Delta, PipelineReducer, PipelineState};
use crate::stream::StreamEvent;
use crate::wait::WaitTable;

/// Run input accepted over RPC: an update document plus an optional
/// wake-up trigger.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RunInput {
    /// Raw `InternalUpdates` document (current_channel, tool_updates,
    /// channel_updates).
    #[serde(default)]
    pub history: Option<serde_json::Value>,
    #[serde(default)]
    pub wakeup: Option<WakeUp>,
}

impl RunInput {
    pub fn wakeup(wakeup: WakeUp) -> Self {
        Self {
            history: None,
            wakeup: Some(wakeup),
        }
    }

    /// Channel ids receiving new messages in this input; their armed waits
    /// get canceled.
    fn channels_with_new_messages(&self) -> Vec<String> {
        let Some(history) = &self.history else {
            return Vec::new();
        };
        let Some(channels) = history.get("channel_updates").and_then(|v| v.as_object()) else {
            return Vec::new();
        };
        channels
            .iter()
            .filter(|(_, slice)| {
                slice
                    .get("new_messages")
                    .and_then(|v| v.as_array())
                    .map_or(false, |messages| !messages.is_empty())
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// The runtime: compiled pipeline + checkpoint store + per-thread run lock.
pub struct Runtime {
    graph: CompiledGraph<PipelineState, Delta>,
    checkpointer: Arc<dyn Checkpointer<PipelineState>>,
    reducer: PipelineReducer,
    waits: Arc<WaitTable>,
    run_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Runtime {
    pub fn new(
        graph: CompiledGraph<PipelineState, Delta>,
        checkpointer: Arc<dyn Checkpointer<PipelineState>>,
        reducer: PipelineReducer,
        waits: Arc<WaitTable>,
    ) -> Self {
        Self {
            graph,
            checkpointer,
            reducer,
            waits,
            run_locks: DashMap::new(),
        }
    }

    fn run_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.run_locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Executes one run for the thread; runs on the same thread id are
    /// serialized so the checkpoint has a single writer.
    pub async fn run(
        &self,
        thread_id: &str,
        input: RunInput,
        stream_tx: Option<mpsc::Sender<StreamEvent<PipelineState>>>,
    ) -> Result<PipelineState, RuntimeError> {
        let lock = self.run_lock(thread_id);
        let _guard = lock.lock().await;
        info!(thread = %thread_id, "pipeline run");

        // Fresh external messages cancel pending channel waits.
        for channel_id in input.channels_with_new_messages() {
            self.waits.cancel(&channel_id);
        }

        let config = RunConfig::for_thread(thread_id);
        let mut state = self
            .checkpointer
            .get_tuple(&config)
            .await?
            .map(|(checkpoint, _)| checkpoint.state)
            .unwrap_or_default();

        let mut delta = Delta::new();
        if let Some(document) = input.history {
            delta.history = Some(HistoryUpdate::Document(document));
        }
        if let Some(wakeup) = input.wakeup {
            delta.wakeup = Some(Some(wakeup));
        }
        crate::graph::Reducer::apply(&self.reducer, &mut state, delta)?;

        let mut ctx = RunContext::new(config);
        if let Some(tx) = stream_tx {
            ctx = ctx.with_stream(tx, []);
        }
        self.graph.invoke_with_context(state, &ctx).await
    }

    /// Triggers a run for a channel wake-up (the `/wakeup/<channel_id>`
    /// endpoint). Idempotent: an already-active channel makes it a no-op
    /// inside the wakeup stage.
    pub async fn wake_channel(
        &self,
        thread_id: &str,
        channel_id: &str,
    ) -> Result<PipelineState, RuntimeError> {
        self.run(
            thread_id,
            RunInput::wakeup(WakeUp {
                channel_id: Some(channel_id.to_string()),
                user_name: None,
                unless_active_since: chrono::Utc::now(),
            }),
            None,
        )
        .await
    }
}
