//! State serialization for persistent checkpointers.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::checkpointer::CheckpointError;

/// Serializes and deserializes state for checkpoint storage.
///
/// [`super::MemorySaver`] keeps typed state and does not use one;
/// [`super::SqliteSaver`] persists through this seam.
pub trait Serializer<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    fn serialize(&self, state: &S) -> Result<Vec<u8>, CheckpointError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<S, CheckpointError>;
}

/// JSON serializer; states persist as language-neutral tagged documents.
#[derive(Debug, Default)]
pub struct JsonSerializer;

impl<S> Serializer<S> for JsonSerializer
where
    S: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    fn serialize(&self, state: &S) -> Result<Vec<u8>, CheckpointError> {
        serde_json::to_vec(state).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<S, CheckpointError> {
        serde_json::from_slice(bytes).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }
}
