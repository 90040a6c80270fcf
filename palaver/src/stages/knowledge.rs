//! Knowledge: surface a digest of the long-term memory spaces to the agent.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use super::Services;
use crate::error::RuntimeError;
use crate::graph::{Command, RunContext, Stage};
use crate::history::{InternalUpdates, Message};
use crate::state::{Delta, PipelineState};

pub struct KnowledgeStage {
    services: Arc<Services>,
}

impl KnowledgeStage {
    pub const ID: &'static str = "knowledge";

    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for KnowledgeStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        _ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        let Some(channel) = state.history.get_current_channel() else {
            return Ok(Command::cont());
        };
        // Store trouble degrades to an empty update.
        let digest = match self.services.knowledge.digest().await {
            Ok(digest) => digest,
            Err(e) => {
                warn!(error = %e, "knowledge store unreadable");
                None
            }
        };
        let Some(digest) = digest else {
            return Ok(Command::cont());
        };

        let mut updates = InternalUpdates::default();
        updates
            .channel(&channel.id)
            .new_messages
            .push(Message::system_with_lifespan(digest, Utc::now(), 1));
        Ok(Command::update(Delta::accumulate(updates)))
    }
}
