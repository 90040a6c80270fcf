//! Run entry: route wake-ups aside, else reset run-scoped fields and fan
//! out into the chat subgraph and the summarizer.

use std::sync::Arc;

use async_trait::async_trait;

use super::Services;
use crate::error::RuntimeError;
use crate::graph::{Command, RunContext, Stage};
use crate::state::{Delta, PipelineState};

pub struct PreprocessStage {
    services: Arc<Services>,
}

impl PreprocessStage {
    pub const ID: &'static str = "preprocess";

    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for PreprocessStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        _ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        if state.wakeup.is_some() {
            return Ok(Command::goto(super::WakeupStage::ID));
        }
        let activity = if state.activity.is_empty() {
            self.services.knobs.default_activity.clone()
        } else {
            state.activity
        };
        let delta = Delta::reset_updates()
            .with_activity(activity)
            .with_internal_activity("");
        Ok(Command::update(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Goto;
    use crate::history::WakeUp;
    use crate::memory::RunConfig;
    use crate::stages::testing::test_services;
    use crate::state::UpdatesDelta;
    use chrono::Utc;

    /// **Scenario**: With a pending wake-up the stage routes to the wakeup
    /// branch and touches nothing.
    #[tokio::test]
    async fn wakeup_branch() {
        let stage = PreprocessStage::new(test_services().0);
        let state = PipelineState {
            wakeup: Some(WakeUp {
                channel_id: None,
                user_name: None,
                unless_active_since: Utc::now(),
            }),
            ..Default::default()
        };
        let ctx = RunContext::new(RunConfig::default());
        let command = stage.run(state, &ctx).await.unwrap();
        assert_eq!(command.goto, Goto::Stage("wakeup".into()));
        assert!(command.update.is_none());
    }

    /// **Scenario**: Without a wake-up the stage resets the accumulator and
    /// the subgraph mode, defaulting the activity.
    #[tokio::test]
    async fn resets_run_fields() {
        let stage = PreprocessStage::new(test_services().0);
        let ctx = RunContext::new(RunConfig::default());
        let command = stage.run(PipelineState::default(), &ctx).await.unwrap();
        assert_eq!(command.goto, Goto::Continue);
        let delta = command.update.unwrap();
        assert_eq!(delta.activity.as_deref(), Some("conversing"));
        assert_eq!(delta.internal_activity.as_deref(), Some(""));
        assert!(matches!(delta.internal_updates, Some(UpdatesDelta::Reset)));
    }
}
