//! Client over per-thread execution: schedule, then harvest within a window.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::{McpRequest, McpResponse, McpThread, WakeupSender};
use crate::tools::ToolKit;

/// Long-lived service hosting one [`McpThread`] per conversation thread id.
pub struct McpClient {
    threads: DashMap<String, Arc<McpThread>>,
    toolkit: Arc<ToolKit>,
    wakeups: Arc<dyn WakeupSender>,
}

impl McpClient {
    pub fn new(toolkit: Arc<ToolKit>, wakeups: Arc<dyn WakeupSender>) -> Self {
        Self {
            threads: DashMap::new(),
            toolkit,
            wakeups,
        }
    }

    pub fn toolkit(&self) -> &Arc<ToolKit> {
        &self.toolkit
    }

    /// The execution thread for this id, created on first use.
    pub fn thread(&self, thread_id: &str) -> Arc<McpThread> {
        self.threads
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                Arc::new(McpThread::new(self.toolkit.clone(), self.wakeups.clone()))
            })
            .clone()
    }

    /// Schedules the requests on the thread's task queue.
    pub async fn add_requests(
        &self,
        thread_id: &str,
        requests: Vec<McpRequest>,
        local_context: Option<serde_json::Value>,
    ) {
        let thread = self.thread(thread_id);
        for request in requests {
            thread.add_request(request, local_context.clone()).await;
        }
    }

    /// The quick-response window: waits until either every scheduled call
    /// completed or the timeout elapsed, then harvests. A timeout is not a
    /// cancellation; pending calls keep running and wake the pipeline later.
    pub async fn get_responses(&self, thread_id: &str, timeout: Duration) -> Vec<McpResponse> {
        let thread = self.thread(thread_id);
        tokio::select! {
            _ = thread.wait_thread_completed() => {}
            _ = tokio::time::sleep(timeout) => {}
        }
        thread.current_responses().await
    }
}
