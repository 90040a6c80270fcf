//! Checkpointer trait and its error type.

use async_trait::async_trait;

use super::checkpoint::{Checkpoint, CheckpointListItem, CheckpointMetadata};
use super::config::RunConfig;

/// Error type for checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("thread_id required")]
    ThreadIdRequired,
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
}

/// Saves and loads per-thread state snapshots.
///
/// Implementations: [`super::MemorySaver`] (in-memory, dev and tests) and
/// [`super::SqliteSaver`] (persistent). Attached to a compiled graph; the
/// runner saves at stage boundaries when the run config carries a thread id.
#[async_trait]
pub trait Checkpointer<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    /// Persists a checkpoint for the thread. Returns the checkpoint id used.
    async fn put(
        &self,
        config: &RunConfig,
        checkpoint: &Checkpoint<S>,
    ) -> Result<String, CheckpointError>;

    /// Loads the latest checkpoint for the thread (or the one addressed by
    /// `config.checkpoint_id`).
    async fn get_tuple(
        &self,
        config: &RunConfig,
    ) -> Result<Option<(Checkpoint<S>, CheckpointMetadata)>, CheckpointError>;

    /// Lists checkpoint ids for the thread, oldest first.
    async fn list(&self, config: &RunConfig) -> Result<Vec<CheckpointListItem>, CheckpointError>;
}
