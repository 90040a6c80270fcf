//! Wake-up delivery seam.
//!
//! The runtime decides *when* to wake a thread; how the trigger reaches the
//! pipeline endpoint is the adapter's business (HTTP in `serve`, direct
//! enqueue in tests).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::history::WakeUp;

/// Delivers a wake-up trigger to the pipeline.
#[async_trait]
pub trait WakeupSender: Send + Sync {
    async fn send(&self, wakeup: WakeUp);
}

/// Drops every wake-up; for contexts with no pipeline endpoint.
pub struct NullWakeupSender;

#[async_trait]
impl WakeupSender for NullWakeupSender {
    async fn send(&self, wakeup: WakeUp) {
        debug!(?wakeup, "wake-up dropped (no endpoint)");
    }
}

/// Records every wake-up; for tests.
#[derive(Default)]
pub struct RecordingWakeupSender {
    sent: Mutex<Vec<WakeUp>>,
}

impl RecordingWakeupSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<WakeUp> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WakeupSender for RecordingWakeupSender {
    async fn send(&self, wakeup: WakeUp) {
        self.sent.lock().unwrap().push(wakeup);
    }
}

/// Delivers a wake-up after a delay, unless activity happened since the
/// captured instant (the receiver checks `unless_active_since`).
pub fn wakeup_after(
    sender: Arc<dyn WakeupSender>,
    delay: Duration,
    wakeup: WakeUp,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        sender.send(wakeup).await;
    })
}
