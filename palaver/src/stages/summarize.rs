//! Summarizer: compress aged message regions into per-channel summaries.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::Services;
use crate::error::RuntimeError;
use crate::format::{group, GapSchedule, Item, SizeSchedule, TranscriptMessage};
use crate::graph::{Command, RunContext, Stage};
use crate::history::{Channel, InternalUpdates, Message, Summary};
use crate::state::{Delta, PipelineState};

/// Summaries older than this are pruned alongside their messages.
const RETENTION_DAYS: i64 = 5;
/// A region needs at least this many items to be worth a summary.
const MINIMUM_GROUP_LEN: usize = 5;

pub struct SummarizeStage {
    services: Arc<Services>,
}

impl SummarizeStage {
    pub const ID: &'static str = "summarize";

    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Candidate regions of one channel: grouped aged messages, minus the
    /// most recent group, short groups, thin groups, and regions that
    /// already have an exact summary.
    fn candidate_regions(
        &self,
        channel: &Channel,
        now: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>, Vec<Item>)> {
        let age_cutoff = now - Duration::days(self.services.knobs.summarize_days_ago_threshold);
        let items: Vec<Item> = channel
            .messages
            .iter()
            .cloned()
            .map(Item::Message)
            .collect();
        if items.is_empty() {
            return Vec::new();
        }
        let mut groups = group(
            items,
            now,
            &GapSchedule::summarize_default(),
            Some(&SizeSchedule::summarize_default(
                self.services.knobs.summarize_size_threshold,
            )),
        );
        // The most recent group may still be growing.
        groups.pop();

        groups
            .into_iter()
            .filter(|g| g.len() >= MINIMUM_GROUP_LEN)
            .filter(|g| g.last().map_or(false, |item| item.upper() <= age_cutoff))
            .filter(|g| {
                g.iter().map(|i| i.size(true)).sum::<usize>()
                    >= self.services.knobs.minimum_content_size_per_summary
            })
            .filter_map(|g| {
                let min_date = g.first()?.lower();
                let max_date = g.last()?.upper();
                let exists = channel
                    .summaries
                    .get(&max_date)
                    .map_or(false, |list| list.iter().any(|s| s.min_date == min_date));
                if exists {
                    None
                } else {
                    Some((min_date, max_date, g))
                }
            })
            .collect()
    }

    async fn summarize_region(&self, items: &[Item]) -> Result<String, RuntimeError> {
        let mut lines = Vec::new();
        for item in items {
            match item {
                Item::Summary(summary) => lines.push(format!("*{}*", summary.text)),
                Item::Message(Message::Human {
                    author, content, ..
                }) => lines.push(format!(
                    "{}: {content}",
                    author.as_deref().unwrap_or("user")
                )),
                Item::Message(Message::System {
                    author, content, ..
                }) => lines.push(format!(
                    "[{}] {content}",
                    author.as_deref().unwrap_or("system")
                )),
                Item::Message(Message::Agent { content, .. }) => {
                    lines.push(format!("you: {content}"))
                }
            }
        }
        let response = self
            .services
            .summarize_model
            .invoke(&[
                TranscriptMessage::System {
                    content: "Summarize the whole conversation in the second person \
                              (\"... talked about ... and you ...\"), folding in any \
                              earlier summaries, but leave out lines starting with \
                              \"From channel\", which only carry context from other \
                              channels."
                        .to_string(),
                },
                TranscriptMessage::Human {
                    content: lines.join("\n"),
                },
            ])
            .await?;
        Ok(response.content)
    }
}

#[async_trait]
impl Stage<PipelineState, Delta> for SummarizeStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        _ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        let now = Utc::now();
        let mut updates = InternalUpdates::default();

        for channel in state.history.channels.values() {
            // Untouched since the last pass: nothing new to compress.
            if let (Some(checked), Some(last)) = (state.last_summary_check, channel.last_activity)
            {
                if last <= checked {
                    continue;
                }
            }
            let mut produced = false;
            for (min_date, max_date, items) in self.candidate_regions(channel, now) {
                // A failing summarization model skips the region, not the run.
                match self.summarize_region(&items).await {
                    Ok(text) => {
                        updates
                            .channel(&channel.id)
                            .new_summaries
                            .push(Summary::new(min_date, max_date, text));
                        produced = true;
                    }
                    Err(e) => warn!(channel = %channel.id, error = %e, "summarize failed"),
                }
            }
            if produced {
                debug!(channel = %channel.id, "summaries produced, arming retention cutoff");
                updates.channel(&channel.id).delete_before =
                    Some(now - Duration::days(RETENTION_DAYS));
            }
        }

        let mut delta = Delta::new().with_last_summary_check(now);
        if !updates.is_empty() {
            delta.internal_updates = Some(crate::state::UpdatesDelta::Add(updates));
        }
        Ok(Command::update(delta))
    }
}
