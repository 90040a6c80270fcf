//! Per-thread asynchronous tool execution with the quick-response window.
//!
//! Scheduled calls run as cooperative tasks; the caller harvests whatever
//! finished within the window and gets `processing` placeholders for the
//! rest. Completion later wakes the pipeline through the [`WakeupSender`]
//! seam, and results translate back into history updates.

mod client;
mod thread;
mod translate;
mod wakeup;

pub use client::McpClient;
pub use thread::{McpThread, PROCESSING_PLACEHOLDER};
pub use translate::updates_from_responses;
pub use wakeup::{wakeup_after, NullWakeupSender, RecordingWakeupSender, WakeupSender};

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::history::{InternalStatus, InternalUpdates, ToolCall};
use crate::tools::ToolMessage;

/// One scheduled tool execution.
#[derive(Clone, Debug)]
pub struct McpRequest {
    pub tool_call: ToolCall,
    pub created_at: DateTime<Utc>,
    /// Webhook to call on completion instead of the default wake-up.
    pub webhook: Option<String>,
    /// Skip the webhook when the tool finished inside the quick window.
    pub ignore_webhook_on_quick_completion: bool,
}

impl McpRequest {
    pub fn new(tool_call: ToolCall) -> Self {
        Self {
            tool_call,
            created_at: Utc::now(),
            webhook: None,
            ignore_webhook_on_quick_completion: true,
        }
    }
}

/// Execution status of a scheduled call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum McpStatus {
    Processing,
    Completed,
    Failed,
}

impl McpStatus {
    /// The history-side status this maps to.
    pub fn internal(self) -> InternalStatus {
        match self {
            McpStatus::Processing => InternalStatus::Processing,
            McpStatus::Completed => InternalStatus::Completed,
            McpStatus::Failed => InternalStatus::Failed,
        }
    }
}

/// The outcome (terminal or synthesized) of one scheduled call.
#[derive(Clone, Debug)]
pub struct McpResponse {
    pub tool_message: ToolMessage,
    pub response_time: Duration,
    /// Update document an introspective tool returned through its artifact.
    pub updates: Option<InternalUpdates>,
    pub status: McpStatus,
}

impl McpResponse {
    pub fn tool_call_id(&self) -> &str {
        &self.tool_message.tool_call_id
    }
}
