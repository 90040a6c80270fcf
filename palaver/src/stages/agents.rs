//! Agent dispatch: stream the model's answer, resolve `¤…¤` references,
//! emit the send/tool directives, and write the new Agent message.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use directive::{Directive, ToolDescriptor};
use tokio::sync::mpsc;
use tracing::debug;

use super::Services;
use crate::error::RuntimeError;
use crate::format::{render, RenderOptions, TranscriptMessage};
use crate::graph::{Command, RunContext, Stage};
use crate::history::{Channel, ChannelType, HistoryUpdate, InternalUpdates, Message};
use crate::llm::ChatChunk;
use crate::state::{Delta, PipelineState};

/// Splits streamed text on `¤` markers: text outside markers flows through,
/// text between a pair becomes a reference lookup. Marker pairs may span
/// chunk boundaries.
#[derive(Debug, Default)]
struct ReferenceSplitter {
    in_reference: bool,
    reference_buffer: String,
}

#[derive(Debug, PartialEq)]
enum SplitEvent {
    Text(String),
    Reference(String),
}

impl ReferenceSplitter {
    fn feed(&mut self, chunk: &str) -> Vec<SplitEvent> {
        let mut events = Vec::new();
        for (index, part) in chunk.split('¤').enumerate() {
            if index > 0 {
                if self.in_reference {
                    events.push(SplitEvent::Reference(std::mem::take(
                        &mut self.reference_buffer,
                    )));
                    self.in_reference = false;
                } else {
                    self.in_reference = true;
                }
            }
            if part.is_empty() {
                continue;
            }
            if self.in_reference {
                self.reference_buffer.push_str(part);
            } else {
                events.push(SplitEvent::Text(part.to_string()));
            }
        }
        events
    }
}

/// The earliest human message whose content starts with the reference text
/// (case-insensitive).
fn find_reference(channel: &Channel, reference: &str) -> Option<String> {
    let needle = reference.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    for message in &channel.messages {
        if let Message::Human {
            message_id: Some(message_id),
            content,
            ..
        } = message
        {
            if content.trim().to_lowercase().starts_with(&needle) {
                return Some(message_id.clone());
            }
        }
    }
    None
}

pub struct AgentsStage {
    services: Arc<Services>,
}

impl AgentsStage {
    pub const ID: &'static str = "agents";

    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn system_prompt(&self, channel: &Channel, activity: &str) -> String {
        let mut prompt = format!(
            "You are Palaver.\nYou are chatting in the channel {}.\nYou can \
             see links and images through the annotations between [].",
            if channel.name.is_empty() {
                &channel.id
            } else {
                &channel.name
            }
        );
        if channel.channel_type == ChannelType::Public {
            prompt.push_str(
                "\nYou can reply-link to a user's message by rewriting the \
                 beginning of it wrapped in ¤ at the start of your answer, \
                 for example \"¤the code is 12¤you gave the code here\".",
            );
        }
        if let Some(extra) = &self.services.registry.resolve(activity).prompt {
            prompt.push('\n');
            prompt.push_str(extra);
        }
        prompt
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for AgentsStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        if state.is_waiting() {
            return Ok(Command::cont());
        }
        let Some(channel) = state.history.get_current_channel() else {
            return Ok(Command::cont());
        };

        let mut messages = vec![TranscriptMessage::System {
            content: self.system_prompt(channel, &state.activity),
        }];
        messages.extend(render(
            &state.history,
            None,
            Utc::now(),
            &RenderOptions {
                max_size: self.services.knobs.max_conversation_size,
                ..Default::default()
            },
        ));

        ctx.emit_directive(Directive::Typing).await;

        let model = self.services.registry.resolve(&state.activity).model.clone();
        let (tx, mut rx) = mpsc::channel::<ChatChunk>(64);
        let stream_out = async {
            let mut splitter = ReferenceSplitter::default();
            while let Some(chunk) = rx.recv().await {
                for event in splitter.feed(&chunk.content) {
                    match event {
                        SplitEvent::Text(text) => {
                            ctx.emit_directive(Directive::Text(text)).await;
                        }
                        SplitEvent::Reference(reference) => {
                            if let Some(message_id) = find_reference(channel, &reference) {
                                ctx.emit_directive(Directive::Reference(message_id)).await;
                            }
                        }
                    }
                }
            }
        };
        let (response, ()) = tokio::join!(model.invoke_stream(&messages, tx), stream_out);
        let response = response?;

        if response.content.is_empty() && response.tool_calls.is_empty() {
            return Ok(Command::cont());
        }
        debug!(
            tool_calls = response.tool_calls.len(),
            "agent turn complete"
        );

        ctx.emit_directive(Directive::Send).await;
        for call in &response.tool_calls {
            ctx.emit_directive(Directive::Tool(ToolDescriptor {
                id: call.id.clone(),
                name: call.name.clone(),
                args: call.args.clone(),
            }))
            .await;
        }

        let mut updates = InternalUpdates::default();
        updates.channel(&channel.id).new_messages = vec![Message::agent(
            response.content,
            Utc::now(),
            state.activity.clone(),
            response.tool_calls,
        )];
        Ok(Command::update(Delta::history(HistoryUpdate::Updates(
            updates,
        ))))
    }
}
