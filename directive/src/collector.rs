//! Adapter-side accumulation: literal text gathers until a flush directive.

use crate::line::{Directive, ToolDescriptor};

/// One flushed unit on the adapter side.
#[derive(Clone, Debug, PartialEq)]
pub enum Flush {
    /// A complete user-visible message, with the reference id (if any)
    /// the message should reply-link to.
    Message {
        text: String,
        reference: Option<String>,
    },
    /// An edit of the current message.
    Edit { text: String },
    /// A tool call to confirm (or auto-run when opted out).
    Tool(ToolDescriptor),
}

/// Accumulates directives per the §external-interface rules: literal lines
/// gather in a buffer; `#send#`/`#update#` flush it; `#reference#` tags the
/// next `#send#`; `#typing#`/`#activity#`/`#wait#` pass through untracked.
#[derive(Debug, Default)]
pub struct Collector {
    buffer: String,
    reference: Option<String>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one directive; returns a flush when one is produced.
    pub fn push(&mut self, directive: Directive) -> Option<Flush> {
        match directive {
            Directive::Text(text) => {
                self.buffer.push_str(&text);
                None
            }
            Directive::Send => Some(Flush::Message {
                text: std::mem::take(&mut self.buffer),
                reference: self.reference.take(),
            }),
            Directive::Update => Some(Flush::Edit {
                text: std::mem::take(&mut self.buffer),
            }),
            Directive::Reference(id) => {
                self.reference = Some(id);
                None
            }
            Directive::Tool(descriptor) => Some(Flush::Tool(descriptor)),
            Directive::Activity(_) | Directive::Wait(_) | Directive::Rerun | Directive::Typing => {
                None
            }
        }
    }

    /// Text accumulated since the last flush.
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: Text accumulates across pushes and flushes on Send with
    /// the pending reference attached.
    #[test]
    fn send_flushes_accumulated_text_with_reference() {
        let mut collector = Collector::new();
        assert!(collector.push(Directive::Reference("77".into())).is_none());
        assert!(collector.push(Directive::Text("hel".into())).is_none());
        assert!(collector.push(Directive::Text("lo".into())).is_none());
        let flush = collector.push(Directive::Send).unwrap();
        assert_eq!(
            flush,
            Flush::Message {
                text: "hello".into(),
                reference: Some("77".into()),
            }
        );
        assert!(collector.pending().is_empty());
    }

    /// **Scenario**: The reference is consumed by the first Send only.
    #[test]
    fn reference_applies_to_one_send() {
        let mut collector = Collector::new();
        collector.push(Directive::Reference("77".into()));
        collector.push(Directive::Text("a".into()));
        collector.push(Directive::Send);
        collector.push(Directive::Text("b".into()));
        let second = collector.push(Directive::Send).unwrap();
        assert_eq!(
            second,
            Flush::Message {
                text: "b".into(),
                reference: None,
            }
        );
    }

    /// **Scenario**: Tool directives flush immediately without touching the buffer.
    #[test]
    fn tool_flushes_without_draining_buffer() {
        let mut collector = Collector::new();
        collector.push(Directive::Text("keep me".into()));
        let flush = collector.push(Directive::Tool(ToolDescriptor {
            id: "t1".into(),
            name: "x".into(),
            args: json!({}),
        }));
        assert!(matches!(flush, Some(Flush::Tool(_))));
        assert_eq!(collector.pending(), "keep me");
    }
}
