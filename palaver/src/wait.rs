//! Channel wait table: process-scoped, writer-wins, cancellable.
//!
//! A `#wait#N` directive arms a delayed wake-up for a channel; a fresh
//! external message on that channel cancels it. Arming again replaces the
//! previous wait.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use crate::history::WakeUp;
use crate::mcp::WakeupSender;

/// Per-channel wait state, keyed by channel id.
#[derive(Default)]
pub struct WaitTable {
    waits: DashMap<String, tokio::task::JoinHandle<()>>,
}

impl WaitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a wait: after `delay` the sender receives a wake-up for the
    /// channel, unless canceled first. Replaces any armed wait (writer wins).
    pub fn arm(&self, channel_id: &str, delay: Duration, sender: Arc<dyn WakeupSender>) {
        let wakeup = WakeUp {
            channel_id: Some(channel_id.to_string()),
            user_name: None,
            unless_active_since: Utc::now(),
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sender.send(wakeup).await;
        });
        if let Some(previous) = self.waits.insert(channel_id.to_string(), handle) {
            previous.abort();
        }
    }

    /// Cancels the armed wait for a channel, if any.
    pub fn cancel(&self, channel_id: &str) {
        if let Some((_, handle)) = self.waits.remove(channel_id) {
            debug!(channel = %channel_id, "wait canceled");
            handle.abort();
        }
    }

    pub fn is_armed(&self, channel_id: &str) -> bool {
        self.waits
            .get(channel_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}
