//! Activity selector: should the agent speak this turn, and as whom.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{KnowledgeStage, Services, ToolsStage, VisionStage};
use crate::error::RuntimeError;
use crate::format::{render, RenderOptions, TranscriptMessage};
use crate::graph::{Command, Goto, RunContext, Stage};
use crate::state::{Delta, PipelineState, IDLE_MODE, WAITING};

/// Seconds the adapter idles the channel after a `check` decision.
const CHECK_WAIT_SECONDS: u64 = 5;

/// What the decision model may answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Stay quiet this turn.
    Skip,
    /// Stay quiet, but idle briefly and come back.
    Check,
    /// Speak, as the named (or default) agent.
    Take,
}

/// Structured decision parsed from the model output.
#[derive(Clone, Debug, Deserialize)]
pub struct ActivityDecision {
    pub action: DecisionAction,
    #[serde(default)]
    pub activity: Option<String>,
}

impl ActivityDecision {
    /// Extracts the first JSON object from free-form model output.
    pub fn parse(content: &str) -> Option<Self> {
        let start = content.find('{')?;
        let end = content.rfind('}')?;
        serde_json::from_str(&content[start..=end]).ok()
    }
}

pub struct ActivityStage {
    services: Arc<Services>,
}

impl ActivityStage {
    pub const ID: &'static str = "activity";

    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn decision_prompt(&self) -> String {
        format!(
            "Decide whether the assistant should answer the conversation \
             below. Reply with one JSON object: \
             {{\"action\": \"skip\"|\"check\"|\"take\", \"activity\": \"<agent name>\"}}. \
             Use \"skip\" to stay quiet, \"check\" to stay quiet but look \
             again shortly, \"take\" to answer. Available agents:\n{}",
            self.services.registry.routing_choices()
        )
    }

    /// Idle mode fans the rest of the subgraph out only when speaking.
    fn route(&self, state: &PipelineState, chosen: &str) -> Goto {
        if state.internal_activity == IDLE_MODE && chosen != WAITING {
            Goto::Fanout(vec![
                VisionStage::ID.to_string(),
                KnowledgeStage::ID.to_string(),
                ToolsStage::ID.to_string(),
            ])
        } else {
            Goto::Continue
        }
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for ActivityStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        let mut messages = vec![TranscriptMessage::System {
            content: self.decision_prompt(),
        }];
        messages.extend(render(
            &state.history,
            None,
            Utc::now(),
            &RenderOptions::default(),
        ));

        // A failing or unparsable decision falls back to the default
        // activity rather than aborting the run.
        let decision = match self.services.decision_model.invoke(&messages).await {
            Ok(response) => ActivityDecision::parse(&response.content),
            Err(e) => {
                warn!(error = %e, "decision model failed");
                None
            }
        };

        let chosen = match decision {
            None => self.services.knobs.default_activity.clone(),
            Some(ActivityDecision {
                action: DecisionAction::Skip,
                ..
            }) => WAITING.to_string(),
            Some(ActivityDecision {
                action: DecisionAction::Check,
                ..
            }) => {
                ctx.emit_directive(directive::Directive::Wait(CHECK_WAIT_SECONDS))
                    .await;
                if let Some(channel) = state.history.get_current_channel() {
                    self.services.waits.arm(
                        &channel.id,
                        std::time::Duration::from_secs(CHECK_WAIT_SECONDS),
                        self.services.wakeups.clone(),
                    );
                }
                WAITING.to_string()
            }
            Some(ActivityDecision {
                action: DecisionAction::Take,
                activity,
            }) => {
                let name = activity.unwrap_or_default();
                if self.services.registry.contains(&name) {
                    name
                } else {
                    self.services.knobs.default_activity.clone()
                }
            }
        };
        debug!(activity = %chosen, "activity selected");

        Ok(Command {
            goto: self.route(&state, &chosen),
            update: Some(Delta::activity(chosen)),
        })
    }
}
