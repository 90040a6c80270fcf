//! Chat-subgraph entry: pick the fan-out mode for this run.
//!
//! * vision-first: the trailing human messages carry raw URLs; enrich them
//!   before anything else reads the conversation.
//! * idle: no fresh human input (wake-up or tool-driven run); only the
//!   activity selector runs, the rest follows if it decides to speak.
//! * regular: everything in parallel.

use async_trait::async_trait;

use super::{ActivityStage, KnowledgeStage, ToolsStage, VisionStage};
use crate::error::RuntimeError;
use crate::graph::{Command, RunContext, Stage};
use crate::history::{Channel, Message};
use crate::state::{Delta, PipelineState, IDLE_MODE, REGULAR_MODE, VISION_MODE};
use crate::vision::extract_urls;

pub struct EntrypointStage;

impl EntrypointStage {
    pub const ID: &'static str = "entrypoint";

    /// URLs anywhere in the trailing contiguous run of human messages.
    fn trailing_humans_have_urls(channel: &Channel) -> bool {
        channel
            .messages
            .iter()
            .rev()
            .take_while(|message| message.is_human())
            .any(|message| !extract_urls(message.content()).is_empty())
    }

    fn pick_mode(state: &PipelineState) -> &'static str {
        let Some(channel) = state.history.get_current_channel() else {
            return IDLE_MODE;
        };
        let fresh_human = matches!(channel.messages.last(), Some(Message::Human { .. }));
        if !fresh_human {
            return IDLE_MODE;
        }
        if Self::trailing_humans_have_urls(channel) {
            return VISION_MODE;
        }
        REGULAR_MODE
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for EntrypointStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        _ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        let mode = Self::pick_mode(&state);
        let command = match mode {
            VISION_MODE => Command::fanout([VisionStage::ID]),
            IDLE_MODE => Command::fanout([ActivityStage::ID]),
            _ => Command::fanout([
                ToolsStage::ID,
                ActivityStage::ID,
                VisionStage::ID,
                KnowledgeStage::ID,
            ]),
        };
        Ok(command.with_update(Delta::new().with_internal_activity(mode)))
    }
}
