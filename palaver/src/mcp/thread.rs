//! One execution thread: pending tasks, terminal responses, completion
//! wake-ups.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tracing::warn;

use super::{McpRequest, McpResponse, McpStatus, WakeupSender};
use crate::history::{ExternalStatus, InternalUpdates, WakeUp};
use crate::tools::{ToolContext, ToolKit};

/// Content of the synthesized response for a still-running call.
pub const PROCESSING_PLACEHOLDER: &str =
    "Tool is being executed, this message will be updated once done.";

struct ThreadInner {
    pending: HashMap<String, McpRequest>,
    terminal: Vec<McpResponse>,
}

/// Hosts the concurrent tool runs of one conversation thread.
pub struct McpThread {
    inner: Arc<Mutex<ThreadInner>>,
    toolkit: Arc<ToolKit>,
    wakeups: Arc<dyn WakeupSender>,
    settled: Arc<Notify>,
}

impl McpThread {
    pub fn new(toolkit: Arc<ToolKit>, wakeups: Arc<dyn WakeupSender>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ThreadInner {
                pending: HashMap::new(),
                terminal: Vec::new(),
            })),
            toolkit,
            wakeups,
            settled: Arc::new(Notify::new()),
        }
    }

    /// Registers the request and spawns its execution task.
    pub async fn add_request(&self, request: McpRequest, local_context: Option<serde_json::Value>) {
        let call_id = request.tool_call.id.clone();
        {
            let mut inner = self.inner.lock().await;
            inner.pending.insert(call_id.clone(), request.clone());
        }
        let inner = self.inner.clone();
        let toolkit = self.toolkit.clone();
        let wakeups = self.wakeups.clone();
        let settled = self.settled.clone();
        tokio::spawn(async move {
            Self::process_request(inner, toolkit, wakeups, settled, request, local_context).await;
        });
    }

    async fn process_request(
        inner: Arc<Mutex<ThreadInner>>,
        toolkit: Arc<ToolKit>,
        wakeups: Arc<dyn WakeupSender>,
        settled: Arc<Notify>,
        request: McpRequest,
        local_context: Option<serde_json::Value>,
    ) {
        let started = Instant::now();
        let ctx = ToolContext {
            extras: local_context.unwrap_or(serde_json::Value::Null),
        };
        let tool_message = toolkit.run_call(&request.tool_call, &ctx).await;

        let status = match tool_message.status {
            ExternalStatus::Success => McpStatus::Completed,
            ExternalStatus::Error => McpStatus::Failed,
        };
        // Introspective tools hand history updates back through the artifact.
        let updates = tool_message
            .artifact
            .as_ref()
            .and_then(|a| a.get("updates"))
            .cloned()
            .and_then(|document| match InternalUpdates::from_document(document) {
                Ok(updates) => Some(updates),
                Err(e) => {
                    warn!(error = %e, call_id = %tool_message.tool_call_id, "bad artifact updates");
                    None
                }
            });
        let response = McpResponse {
            tool_message,
            response_time: started.elapsed(),
            updates,
            status,
        };

        let call_id = request.tool_call.id.clone();
        {
            let mut inner = inner.lock().await;
            inner.terminal.push(response);
            inner.pending.remove(&call_id);
        }
        settled.notify_waiters();

        // Wake the channel that asked for the tool; falls back to the
        // current channel when no requestor was named.
        wakeups
            .send(WakeUp {
                channel_id: None,
                user_name: request
                    .tool_call
                    .requestor()
                    .map(str::to_string),
                unless_active_since: Utc::now(),
            })
            .await;
    }

    /// Completes once no request is pending.
    pub async fn wait_thread_completed(&self) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            // Registers interest before the check so a completion landing
            // in between is not lost.
            notified.as_mut().enable();
            if self.inner.lock().await.pending.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Drains terminal responses and synthesizes a `processing` response for
    /// every still-pending request. Idempotent on the pending side: the
    /// placeholders are re-synthesized each call.
    pub async fn current_responses(&self) -> Vec<McpResponse> {
        let mut inner = self.inner.lock().await;
        let mut responses = std::mem::take(&mut inner.terminal);
        let now = Utc::now();
        for request in inner.pending.values() {
            responses.push(McpResponse {
                tool_message: crate::tools::ToolMessage {
                    tool_call_id: request.tool_call.id.clone(),
                    status: ExternalStatus::Success,
                    content: PROCESSING_PLACEHOLDER.to_string(),
                    artifact: None,
                },
                response_time: (now - request.created_at)
                    .to_std()
                    .unwrap_or_default(),
                updates: None,
                status: McpStatus::Processing,
            });
        }
        responses
    }
}
