//! Afterthought: when the agent chose silence over a fresh human message,
//! arm a delayed wake-up so the decision gets revisited.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::Services;
use crate::error::RuntimeError;
use crate::graph::{Command, RunContext, Stage};
use crate::history::Message;
use crate::state::{Delta, PipelineState};

/// How long to sit on a skipped turn before looking again.
const RECONSIDER_DELAY: Duration = Duration::from_secs(600);

pub struct AfterthoughtStage {
    services: Arc<Services>,
}

impl AfterthoughtStage {
    pub const ID: &'static str = "afterthought";

    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for AfterthoughtStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        _ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        if !state.is_waiting() {
            return Ok(Command::cont());
        }
        let Some(channel) = state.history.get_current_channel() else {
            return Ok(Command::cont());
        };
        // Only a turn that ended on an unanswered human message deserves a
        // second look; the wait table keeps this writer-wins per channel.
        if matches!(channel.messages.last(), Some(Message::Human { .. })) {
            debug!(channel = %channel.id, "arming reconsider wake-up");
            self.services.waits.arm(
                &channel.id,
                RECONSIDER_DELAY,
                self.services.wakeups.clone(),
            );
        }
        Ok(Command::cont())
    }
}
