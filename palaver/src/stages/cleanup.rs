//! Cleanup: decay temporary messages, apply the accumulated updates, reset
//! the accumulator.

use async_trait::async_trait;
use tracing::debug;

use crate::error::RuntimeError;
use crate::graph::{Command, RunContext, Stage};
use crate::history::{HistoryUpdate, InternalUpdates, Message};
use crate::state::{Delta, PipelineState, UpdatesDelta};

pub struct CleanupStage;

impl CleanupStage {
    pub const ID: &'static str = "cleanup";

    /// Lifespan decay for every channel that saw activity since the last
    /// pass: decrement each temporary System message, delete the ones that
    /// would reach zero, then move the channel's watermark.
    fn decay_updates(state: &PipelineState) -> InternalUpdates {
        let mut updates = InternalUpdates::default();
        for channel in state.history.channels.values() {
            let Some(last_activity) = channel.last_activity else {
                continue;
            };
            if channel
                .no_temporary_message_before
                .is_some_and(|mark| last_activity <= mark)
            {
                continue;
            }
            for (index, message) in channel.messages.iter().enumerate() {
                let Message::System {
                    lifespan: Some(lifespan),
                    ..
                } = message
                else {
                    continue;
                };
                if *lifespan <= 1 {
                    updates.channel(&channel.id).message_deletes.push(index);
                } else {
                    let mut decremented = message.clone();
                    if let Message::System { lifespan, .. } = &mut decremented {
                        *lifespan = Some(lifespan.unwrap() - 1);
                    }
                    updates
                        .channel(&channel.id)
                        .message_updates
                        .insert(index, decremented);
                }
            }
            updates.channel(&channel.id).no_temporary_message_before = Some(last_activity);
        }
        updates
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for CleanupStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        _ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        let mut combined = state.internal_updates.clone();
        combined.merge(Self::decay_updates(&state));
        debug!(empty = combined.is_empty(), "cleanup applying run updates");

        let mut delta = Delta::reset_updates();
        if !combined.is_empty() {
            delta.history = Some(HistoryUpdate::Updates(combined));
        }
        // Belt out the accumulator even when nothing was gathered.
        if delta.internal_updates.is_none() {
            delta.internal_updates = Some(UpdatesDelta::Reset);
        }
        Ok(Command::update(delta))
    }
}
