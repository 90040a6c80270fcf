//! Per-run configuration: which thread, and optionally which checkpoint.

/// Identifies the conversation thread for one pipeline run.
///
/// When a checkpointer is attached, `thread_id` keys the persisted state;
/// `checkpoint_id` loads a specific checkpoint instead of the latest.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub thread_id: Option<String>,
    pub checkpoint_id: Option<String>,
}

impl RunConfig {
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            checkpoint_id: None,
        }
    }
}
