//! Per-run context: run config plus the streaming side channel.

use std::collections::HashSet;

use tokio::sync::mpsc;

use crate::memory::RunConfig;
use crate::stream::{StreamEvent, StreamMode};

/// Carried through one graph run; stages use it to emit side-channel events
/// and to learn which thread they run for.
pub struct RunContext<S> {
    pub config: RunConfig,
    pub(crate) stream_tx: Option<mpsc::Sender<StreamEvent<S>>>,
    pub(crate) stream_modes: HashSet<StreamMode>,
}

impl<S> Clone for RunContext<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            stream_tx: self.stream_tx.clone(),
            stream_modes: self.stream_modes.clone(),
        }
    }
}

impl<S> RunContext<S> {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            stream_tx: None,
            stream_modes: HashSet::new(),
        }
    }

    /// Wires a stream sender; `modes` gates the debug events, directives
    /// always pass.
    pub fn with_stream(
        mut self,
        tx: mpsc::Sender<StreamEvent<S>>,
        modes: impl IntoIterator<Item = StreamMode>,
    ) -> Self {
        self.stream_tx = Some(tx);
        self.stream_modes = modes.into_iter().collect();
        self
    }

    /// Emits one side-channel directive. FIFO per producing stage; a closed
    /// or absent channel drops the event.
    pub async fn emit_directive(&self, line: directive::Directive) {
        if let Some(tx) = &self.stream_tx {
            let _ = tx.send(StreamEvent::Directive(line)).await;
        }
    }

    pub(crate) async fn emit(&self, mode: StreamMode, event: StreamEvent<S>) {
        if let Some(tx) = &self.stream_tx {
            if self.stream_modes.contains(&mode) {
                let _ = tx.send(event).await;
            }
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.config.thread_id.as_deref()
    }
}
