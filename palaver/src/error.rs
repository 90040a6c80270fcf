//! Runtime error taxonomy.
//!
//! Structural errors are fatal to the current run and must leave History
//! untouched; everything else is degraded locally by the stage that hit it.

use thiserror::Error;

use crate::memory::CheckpointError;

/// Error returned by reducer applications, stages, and graph runs.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A stage or graph step failed (LLM call, tool scheduling, routing).
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Positional `message_updates` referenced an index past the channel tail.
    /// Structural: the reducer rejects the whole document.
    #[error("message update index {index} out of range (channel has {len} messages)")]
    IndexOutOfRange { index: usize, len: usize },

    /// A raw update document did not parse into `InternalUpdates`.
    #[error("invalid update document: {0}")]
    InvalidUpdate(String),

    /// An activity name was not found in the agent registry.
    #[error("unknown activity: {0}")]
    UnknownActivity(String),

    /// Checkpoint persistence failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
