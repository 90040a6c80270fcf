//! Graph assembly errors.

use thiserror::Error;

/// Returned by `StateGraph::compile` when the edge table is inconsistent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompilationError {
    /// An edge references a stage that was never added.
    #[error("stage not found: {0}")]
    StageNotFound(String),

    /// No edge leaves START.
    #[error("no entry edge from START")]
    MissingEntry,

    /// No edge reaches END.
    #[error("no edge reaches END")]
    MissingEnd,
}
