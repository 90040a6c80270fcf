//! Channels: ordered messages plus the summary ladder.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::message::Message;
use crate::error::RuntimeError;

/// A textual abstraction covering the span `[min_date, max_date]`, used in
/// place of its messages when the budget is tight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub min_date: DateTime<Utc>,
    pub max_date: DateTime<Utc>,
    pub text: String,
}

impl Summary {
    pub fn new(min_date: DateTime<Utc>, max_date: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            min_date,
            max_date,
            text: text.into(),
        }
    }
}

/// Kind of conversation surface behind a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    #[default]
    Basic,
    Public,
    Dm,
}

/// A logical conversation surface with its own ordered message history.
///
/// Invariants kept by the mutators below:
/// * `messages` dates are non-decreasing;
/// * `last_activity` equals the maximum message date whenever non-empty;
/// * summaries at one `max_date` key stay sorted by `min_date` ascending
///   (longest span first).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub channel_type: ChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wakeup_url: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Keyed by each summary's `max_date`.
    #[serde(default)]
    pub summaries: BTreeMap<DateTime<Utc>, Vec<Summary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_summary_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_reactive_tool_call_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_temporary_message_before: Option<DateTime<Utc>>,
}

impl Channel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Overwrites the message at `index`, preserving the stored date so the
    /// ordering invariant cannot break through positional updates.
    pub fn update_message(&mut self, index: usize, mut message: Message) -> Result<(), RuntimeError> {
        let len = self.messages.len();
        let Some(slot) = self.messages.get_mut(index) else {
            return Err(RuntimeError::IndexOutOfRange { index, len });
        };
        message.set_date(slot.date());
        message.ensure_tool_states();
        *slot = message;
        Ok(())
    }

    /// Deletes the given indices (deduplicated, applied descending).
    pub fn delete_messages(&mut self, indices: &[usize]) {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();
        for index in sorted {
            if index < self.messages.len() {
                self.messages.remove(index);
            }
        }
    }

    /// Prunes messages and summaries strictly older than `cutoff`.
    ///
    /// After pruning, `max_summary_date` is recomputed as the minimum
    /// `min_date` among surviving summaries, or "now" when none remain.
    pub fn delete_before(&mut self, cutoff: DateTime<Utc>) {
        self.messages.retain(|m| m.date() >= cutoff);
        self.summaries.retain(|max_date, _| *max_date >= cutoff);
        self.max_summary_date = self
            .summaries
            .values()
            .flatten()
            .map(|s| s.min_date)
            .min()
            .or_else(|| Some(Utc::now()));
    }

    /// Prepends a message; its date is clamped to the current head so the
    /// sequence stays sorted.
    pub fn append_left(&mut self, mut message: Message) {
        if let Some(head) = self.messages.first() {
            if message.date() > head.date() {
                message.set_date(head.date());
            }
        }
        message.ensure_tool_states();
        self.messages.insert(0, message);
    }

    /// Appends messages at the tail; when any of them breaks monotonicity the
    /// whole sequence is re-sorted by date before it becomes visible.
    pub fn append(&mut self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        let mut needs_sort = false;
        for mut message in messages {
            message.ensure_tool_states();
            if let Some(last) = self.messages.last() {
                if message.date() < last.date() {
                    needs_sort = true;
                }
            }
            self.messages.push(message);
        }
        if needs_sort {
            debug!(channel = %self.id, "out-of-order insert, re-sorting");
            self.messages.sort_by_key(Message::date);
        }
    }

    /// Refreshes `last_activity` to cover the given date.
    pub fn touch(&mut self, date: DateTime<Utc>) {
        if self.last_activity.map_or(true, |current| date > current) {
            self.last_activity = Some(date);
        }
    }

    /// Inserts a summary at its `max_date` key, keeping the list there sorted
    /// by `min_date` ascending, and advances `max_summary_date` when the new
    /// key is greater than the current value.
    pub fn insert_summary(&mut self, summary: Summary) {
        if self
            .max_summary_date
            .map_or(true, |current| summary.max_date > current)
        {
            self.max_summary_date = Some(summary.max_date);
        }
        let list = self.summaries.entry(summary.max_date).or_default();
        let position = list
            .iter()
            .position(|s| s.min_date > summary.min_date)
            .unwrap_or(list.len());
        list.insert(position, summary);
    }

    /// All summaries in the channel, any order.
    pub fn all_summaries(&self) -> impl Iterator<Item = &Summary> {
        self.summaries.values().flatten()
    }

    /// Total character size of message contents, counting tool outputs.
    pub fn content_size(&self) -> usize {
        self.messages
            .iter()
            .map(|m| crate::format::message_size(m, false))
            .sum()
    }
}
