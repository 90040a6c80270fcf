//! Formatting: budgeted selection, time-gap grouping, and the conversation
//! projection handed to the language model.

mod assemble;
mod group;
mod render;

pub use assemble::{assemble, AssembleOptions};
pub use group::{group, GapSchedule, SizeSchedule};
pub use render::{render, RenderOptions, TranscriptMessage};

use chrono::{DateTime, Duration, Utc};

use crate::history::{Message, Summary};

/// One entry of an assembled conversation: a message or a summary standing
/// in for its span.
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Message(Message),
    Summary(Summary),
}

impl Item {
    /// Lower time boundary (a message is a point in time).
    pub fn lower(&self) -> DateTime<Utc> {
        match self {
            Item::Message(m) => m.date(),
            Item::Summary(s) => s.min_date,
        }
    }

    /// Upper time boundary.
    pub fn upper(&self) -> DateTime<Utc> {
        match self {
            Item::Message(m) => m.date(),
            Item::Summary(s) => s.max_date,
        }
    }

    /// Character size used against the assembly budget.
    pub fn size(&self, use_message_summaries: bool) -> usize {
        match self {
            Item::Message(m) => message_size(m, use_message_summaries),
            Item::Summary(s) => s.text.len(),
        }
    }
}

/// Character count of one message: its summary when present and allowed,
/// else its content, plus all tool-state contents for Agent messages.
pub fn message_size(message: &Message, use_summary: bool) -> usize {
    let mut count = match message.summary() {
        Some(summary) if use_summary => summary.len(),
        _ => message.content().len(),
    };
    if let Message::Agent { tool_states, .. } = message {
        count += tool_states
            .values()
            .map(|s| s.content.as_deref().unwrap_or("").len())
            .sum::<usize>();
    }
    count
}

/// Human-readable relative time ("3h ago").
pub fn time_ago(now: DateTime<Utc>, date: DateTime<Utc>) -> String {
    let delta = now - date;
    let seconds = delta.num_seconds();
    if seconds < 0 {
        return format!("{seconds}s");
    }
    if seconds < 60 {
        format!("{seconds}s ago")
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86_400)
    }
}

/// Header for a span of items: one relative time when both ends land on the
/// same label, otherwise "from 2d to 1d ago".
pub fn span_header(now: DateTime<Utc>, oldest: DateTime<Utc>, newest: DateTime<Utc>) -> String {
    let newest_label = time_ago(now, newest);
    let oldest_label = time_ago(now, oldest);
    if newest_label == oldest_label {
        newest_label
    } else {
        let oldest_short = oldest_label.trim_end_matches(" ago").to_string();
        format!("from {oldest_short} to {newest_label}")
    }
}

/// Convenience duration constructors used by the schedules.
pub(crate) fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}

pub(crate) fn hours(n: i64) -> Duration {
    Duration::hours(n)
}

pub(crate) fn days(n: i64) -> Duration {
    Duration::days(n)
}
