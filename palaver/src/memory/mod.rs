//! Checkpoint persistence: one authoritative state per thread id.

mod checkpoint;
mod checkpointer;
mod config;
mod memory_saver;
mod serializer;
mod sqlite_saver;

pub use checkpoint::{Checkpoint, CheckpointListItem, CheckpointMetadata, CheckpointSource};
pub use checkpointer::{CheckpointError, Checkpointer};
pub use config::RunConfig;
pub use memory_saver::MemorySaver;
pub use serializer::{JsonSerializer, Serializer};
pub use sqlite_saver::SqliteSaver;
