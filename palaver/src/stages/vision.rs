//! Vision: enrich raw URLs in the fresh human messages of the current
//! channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{ActivityStage, KnowledgeStage, Services, ToolsStage};
use crate::error::RuntimeError;
use crate::graph::{Command, Goto, RunContext, Stage};
use crate::history::{HistoryUpdate, InternalUpdates};
use crate::state::{Delta, PipelineState, VISION_MODE};
use crate::vision::extract_urls;

pub struct VisionStage {
    services: Arc<Services>,
}

impl VisionStage {
    pub const ID: &'static str = "vision";

    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// In vision-first mode the rest of the subgraph waits for us.
    fn route(&self, state: &PipelineState) -> Goto {
        if state.internal_activity == VISION_MODE {
            Goto::Fanout(vec![
                ActivityStage::ID.to_string(),
                KnowledgeStage::ID.to_string(),
                ToolsStage::ID.to_string(),
            ])
        } else {
            Goto::Continue
        }
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for VisionStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        _ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        let goto = self.route(&state);
        let Some(channel) = state.history.get_current_channel() else {
            return Ok(Command {
                goto,
                update: None,
            });
        };

        // The last contiguous run of human messages, newest first.
        let mut extracted: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (index, message) in channel.messages.iter().enumerate().rev() {
            if !message.is_human() {
                break;
            }
            let urls = extract_urls(message.content());
            if !urls.is_empty() {
                extracted.insert(index, urls);
            }
        }
        if extracted.is_empty() {
            return Ok(Command {
                goto,
                update: None,
            });
        }

        let all_urls: Vec<String> = {
            let mut urls: Vec<String> = extracted.values().flatten().cloned().collect();
            urls.dedup();
            urls
        };
        // Storage trouble degrades to an empty update; the raw links stay.
        let replacements = match self.services.vision.enrich_all(&all_urls).await {
            Ok(replacements) => replacements,
            Err(e) => {
                warn!(error = %e, "url enrichment failed");
                return Ok(Command {
                    goto,
                    update: None,
                });
            }
        };

        let mut updates = InternalUpdates::default();
        for (index, _) in &extracted {
            let mut message = channel.messages[*index].clone();
            let mut content = message.content().to_string();
            for (url, replacement) in &replacements {
                if content.contains(url.as_str()) {
                    content = content.replace(url.as_str(), replacement);
                }
            }
            message.set_content(content);
            updates
                .channel(&channel.id)
                .message_updates
                .insert(*index, message);
        }

        Ok(Command {
            goto,
            update: Some(Delta::history(HistoryUpdate::Updates(updates))),
        })
    }
}
