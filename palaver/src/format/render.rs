//! Conversation projection for the language model.

use chrono::{DateTime, Duration, Utc};

use super::{assemble, group, span_header, AssembleOptions, GapSchedule, Item};
use crate::history::{ExternalStatus, History, Message, ToolCall};

/// One entry of the projected conversation.
#[derive(Clone, Debug, PartialEq)]
pub enum TranscriptMessage {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Agent {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        status: ExternalStatus,
        content: String,
    },
}

/// Options for [`render`].
#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Visible window: only items newer than `now - from_time_ago` are shown
    /// (the minimum-message quota can still pull in older ones).
    pub from_time_ago: Duration,
    /// Minimum number of items from the current channel.
    pub min_message: usize,
    /// Character budget for the current channel.
    pub max_size: usize,
    /// Use message summaries in place of contents when present.
    pub use_message_summaries: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            from_time_ago: Duration::days(1),
            min_message: 3,
            max_size: 50_000,
            use_message_summaries: true,
        }
    }
}

/// Projects the history into the model-facing conversation.
///
/// The current channel is assembled and clustered into grouped human-facing
/// messages with relative-time headers; Agent messages are emitted verbatim
/// followed by their unpacked tool messages. Groups from other recently
/// active channels are interleaved by date, prefixed `From channel <name>`.
pub fn render(
    history: &History,
    current_channel_id: Option<&str>,
    now: DateTime<Utc>,
    options: &RenderOptions,
) -> Vec<TranscriptMessage> {
    let current_id = current_channel_id
        .map(str::to_string)
        .or_else(|| history.current_channel.clone());
    let Some(current_id) = current_id else {
        return Vec::new();
    };
    let Some(current) = history.channels.get(&current_id) else {
        return Vec::new();
    };

    let window_floor = now - options.from_time_ago;
    let assemble_options = AssembleOptions {
        use_message_summaries: options.use_message_summaries,
        max_size: options.max_size,
        min_message: options.min_message,
        min_date: Some(window_floor),
        ..Default::default()
    };
    let items = assemble(&current.messages, &current.summaries, &assemble_options);
    let gaps = GapSchedule::render_default();
    let main_groups = group(items, now, &gaps, None);

    // (group, source channel name when external)
    let mut entries: Vec<(Vec<Item>, Option<String>)> = main_groups
        .into_iter()
        .map(|g| (g, None))
        .collect();

    for channel in history.channels.values() {
        if channel.id == current_id {
            continue;
        }
        if channel.last_activity.map_or(true, |la| la < window_floor) {
            continue;
        }
        let external_options = AssembleOptions {
            min_message: 0,
            ..assemble_options.clone()
        };
        let items = assemble(&channel.messages, &channel.summaries, &external_options);
        for sub_group in group(items, now, &gaps, None) {
            entries.push((sub_group, Some(channel.name.clone())));
        }
    }
    // External sub-groups slot in before the first entry strictly newer than
    // them; the stable sort keeps main entries first on equal dates.
    entries.sort_by_key(|(g, _)| g.last().map(Item::upper));

    let mut out = Vec::new();
    for (items, external_name) in &entries {
        render_group(
            now,
            items,
            external_name.as_deref(),
            options.use_message_summaries,
            &mut out,
        );
    }
    out
}

fn render_group(
    now: DateTime<Utc>,
    items: &[Item],
    external_name: Option<&str>,
    use_summaries: bool,
    out: &mut Vec<TranscriptMessage>,
) {
    let (Some(first), Some(last)) = (items.first(), items.last()) else {
        return;
    };
    let header = span_header(now, first.lower(), last.upper());
    let mut prefixed = false;
    let mut lines: Vec<String> = Vec::new();

    let mut flush = |lines: &mut Vec<String>, prefixed: &mut bool, out: &mut Vec<TranscriptMessage>| {
        if lines.is_empty() {
            return;
        }
        let mut content = String::new();
        if let (Some(name), false) = (external_name, *prefixed) {
            content.push_str(&format!("From channel {name}\n"));
        }
        *prefixed = true;
        content.push_str(&header);
        content.push('\n');
        content.push_str(&lines.join("\n"));
        lines.clear();
        out.push(TranscriptMessage::Human { content });
    };

    for item in items {
        match item {
            Item::Summary(summary) => lines.push(format!("*{}*", summary.text)),
            Item::Message(Message::System {
                author, content, ..
            }) => lines.push(format!(
                "[{}] {content}",
                author.as_deref().unwrap_or("system")
            )),
            Item::Message(Message::Human {
                author,
                content,
                summary,
                ..
            }) => {
                let shown = match summary {
                    Some(summary) if use_summaries => summary,
                    _ => content,
                };
                lines.push(format!("{}: {shown}", author.as_deref().unwrap_or("user")));
            }
            Item::Message(Message::Agent {
                content,
                tool_calls,
                tool_states,
                ..
            }) => {
                // Agent messages are never grouped: flush, then verbatim.
                flush(&mut lines, &mut prefixed, out);
                out.push(TranscriptMessage::Agent {
                    content: content.clone(),
                    tool_calls: tool_calls.clone(),
                });
                for call in tool_calls {
                    if let Some(state) = tool_states.get(&call.id) {
                        out.push(TranscriptMessage::Tool {
                            tool_call_id: call.id.clone(),
                            status: state.external_status(),
                            content: state.content.clone().unwrap_or_default(),
                        });
                    }
                }
            }
        }
    }
    flush(&mut lines, &mut prefixed, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryUpdate, InternalStatus, InternalUpdates, ToolUpdate};
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn base_time() -> i64 {
        1_000_000
    }

    fn seeded() -> History {
        let t = base_time();
        let mut updates = InternalUpdates::default();
        updates.current_channel = Some("main".into());
        {
            let main = updates.channel("main");
            main.name = Some("general".into());
            main.new_messages = vec![
                Message::human("ro", "hello", at(t - 600)),
                Message::human("mi", "hi both", at(t - 550)),
                Message::agent(
                    "checking",
                    at(t - 500),
                    "conversing",
                    vec![ToolCall::new("t1", "probe", json!({}))],
                ),
                Message::human("ro", "thanks", at(t - 100)),
            ];
        }
        {
            let side = updates.channel("side");
            side.name = Some("lab".into());
            side.new_messages = vec![Message::human("zu", "ping from lab", at(t - 300))];
        }
        let mut updates_with_tool = updates;
        updates_with_tool.tool_updates.push(ToolUpdate {
            tool_call_id: "t1".into(),
            internal_status: InternalStatus::Completed,
            content: Some("42".into()),
        });
        History::default()
            .reduce(HistoryUpdate::Updates(updates_with_tool))
            .unwrap()
    }

    /// **Scenario**: Agent messages come out verbatim followed by their tool
    /// messages; surrounding human lines are grouped with a header.
    #[test]
    fn agent_verbatim_with_tools() {
        let history = seeded();
        let now = at(base_time());
        let transcript = render(&history, None, now, &RenderOptions::default());

        let agent_index = transcript
            .iter()
            .position(|m| matches!(m, TranscriptMessage::Agent { .. }))
            .expect("agent present");
        match &transcript[agent_index] {
            TranscriptMessage::Agent { content, tool_calls } => {
                assert_eq!(content, "checking");
                assert_eq!(tool_calls.len(), 1);
            }
            _ => unreachable!(),
        }
        match &transcript[agent_index + 1] {
            TranscriptMessage::Tool {
                tool_call_id,
                status,
                content,
            } => {
                assert_eq!(tool_call_id, "t1");
                assert_eq!(*status, ExternalStatus::Success);
                assert_eq!(content, "42");
            }
            other => panic!("expected tool message, got {other:?}"),
        }
        // The grouped human block precedes the agent and carries the header.
        match &transcript[agent_index - 1] {
            TranscriptMessage::Human { content } => {
                assert!(content.contains("ro: hello"));
                assert!(content.contains("mi: hi both"));
                assert!(content.contains("ago"));
            }
            other => panic!("expected grouped human block, got {other:?}"),
        }
    }

    /// **Scenario**: Recently active other channels are interleaved with a
    /// `From channel <name>` prefix, before the first strictly newer entry.
    #[test]
    fn external_channels_interleaved() {
        let history = seeded();
        let now = at(base_time());
        let transcript = render(&history, None, now, &RenderOptions::default());

        let external_index = transcript
            .iter()
            .position(|m| {
                matches!(m, TranscriptMessage::Human { content } if content.starts_with("From channel lab"))
            })
            .expect("external group present");
        let trailing_index = transcript
            .iter()
            .position(|m| {
                matches!(m, TranscriptMessage::Human { content } if content.contains("ro: thanks"))
            })
            .expect("trailing human present");
        assert!(
            external_index < trailing_index,
            "lab ping (t-300) should come before the newer 'thanks' (t-100)"
        );
        match &transcript[external_index] {
            TranscriptMessage::Human { content } => {
                assert!(content.contains("zu: ping from lab"));
            }
            _ => unreachable!(),
        }
    }

    /// **Scenario**: A channel outside the visible window is not interleaved.
    #[test]
    fn stale_channels_hidden() {
        let mut history = seeded();
        {
            let side = history.channels.get_mut("side").unwrap();
            side.last_activity = Some(at(base_time() - 10 * 86_400));
        }
        let now = at(base_time());
        let transcript = render(&history, None, now, &RenderOptions::default());
        assert!(!transcript.iter().any(|m| {
            matches!(m, TranscriptMessage::Human { content } if content.contains("From channel"))
        }));
    }

    /// **Scenario**: Without a current channel the projection is empty.
    #[test]
    fn no_current_channel_empty() {
        let history = History::default();
        let transcript = render(&history, None, at(0), &RenderOptions::default());
        assert!(transcript.is_empty());
    }
}
