//! In-memory checkpointer. Not persistent; for dev and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::checkpoint::{Checkpoint, CheckpointListItem, CheckpointMetadata};
use super::checkpointer::{CheckpointError, Checkpointer};
use super::config::RunConfig;

/// In-memory checkpointer: each thread keeps its checkpoints newest-last.
pub struct MemorySaver<S> {
    by_thread: Arc<RwLock<HashMap<String, Vec<Checkpoint<S>>>>>,
}

impl<S> MemorySaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            by_thread: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn thread_id(config: &RunConfig) -> Result<String, CheckpointError> {
        config
            .thread_id
            .clone()
            .ok_or(CheckpointError::ThreadIdRequired)
    }
}

impl<S> Default for MemorySaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> Checkpointer<S> for MemorySaver<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn put(
        &self,
        config: &RunConfig,
        checkpoint: &Checkpoint<S>,
    ) -> Result<String, CheckpointError> {
        let thread_id = Self::thread_id(config)?;
        let mut guard = self.by_thread.write().await;
        guard.entry(thread_id).or_default().push(checkpoint.clone());
        Ok(checkpoint.id.clone())
    }

    async fn get_tuple(
        &self,
        config: &RunConfig,
    ) -> Result<Option<(Checkpoint<S>, CheckpointMetadata)>, CheckpointError> {
        let thread_id = Self::thread_id(config)?;
        let guard = self.by_thread.read().await;
        let Some(list) = guard.get(&thread_id) else {
            return Ok(None);
        };
        let found = match &config.checkpoint_id {
            Some(id) => list.iter().find(|cp| &cp.id == id),
            None => list.last(),
        };
        Ok(found.map(|cp| (cp.clone(), cp.metadata.clone())))
    }

    async fn list(&self, config: &RunConfig) -> Result<Vec<CheckpointListItem>, CheckpointError> {
        let thread_id = Self::thread_id(config)?;
        let guard = self.by_thread.read().await;
        Ok(guard
            .get(&thread_id)
            .map(|list| {
                list.iter()
                    .map(|cp| CheckpointListItem {
                        checkpoint_id: cp.id.clone(),
                        metadata: cp.metadata.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
