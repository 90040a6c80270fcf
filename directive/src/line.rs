//! Directive lines: every prefixed token is a control directive, anything
//! else is literal model output for the adapter to accumulate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool-call descriptor carried by `#tool#<json>`.
///
/// The adapter presents a confirmation UI for it unless
/// `args.skip_confirmation == true`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolDescriptor {
    /// True when the call opted out of user confirmation
    /// (`args.skip_confirmation == true`).
    pub fn skips_confirmation(&self) -> bool {
        self.args
            .get("skip_confirmation")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// One side-channel line.
///
/// Control directives use the `#name#` prefix; [`Directive::Text`] is literal
/// model output that the adapter accumulates until the next flush
/// (`Send` or `Update`).
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    /// Flush accumulated tokens as one user-visible message.
    Send,
    /// Flush accumulated tokens into the current message (edit).
    Update,
    /// A tool-call descriptor; adapter shows confirmation UI.
    Tool(ToolDescriptor),
    /// Subsequent `Send` should reply-link to this message id.
    Reference(String),
    /// Informational activity transition.
    Activity(String),
    /// Adapter should idle the channel for this many seconds.
    Wait(u64),
    /// Schedule another pipeline run immediately after the current flush.
    Rerun,
    /// Show a typing indicator until the next non-typing directive.
    Typing,
    /// Literal model output to accumulate.
    Text(String),
}

impl Directive {
    /// Encodes this directive as one wire line.
    pub fn encode(&self) -> String {
        match self {
            Directive::Send => "#send#".to_string(),
            Directive::Update => "#update#".to_string(),
            Directive::Tool(descriptor) => {
                // ToolDescriptor serialization cannot fail: all fields are
                // strings or already-parsed JSON values.
                let json = serde_json::to_string(descriptor).unwrap_or_default();
                format!("#tool#{json}")
            }
            Directive::Reference(id) => format!("#reference#{id}"),
            Directive::Activity(name) => format!("#activity#{name}"),
            Directive::Wait(seconds) => format!("#wait#{seconds}"),
            Directive::Rerun => "#rerun#".to_string(),
            Directive::Typing => "#typing#".to_string(),
            Directive::Text(text) => text.clone(),
        }
    }

    /// Parses one wire line.
    ///
    /// Unknown `#…#` prefixes and malformed payloads degrade to
    /// [`Directive::Text`]; the adapter reports them but the stream keeps
    /// flowing (a model mis-parse must not stall the pipeline).
    pub fn parse(line: &str) -> Directive {
        if line == "#send#" {
            return Directive::Send;
        }
        if line == "#update#" {
            return Directive::Update;
        }
        if line == "#rerun#" {
            return Directive::Rerun;
        }
        if line == "#typing#" {
            return Directive::Typing;
        }
        if let Some(payload) = line.strip_prefix("#tool#") {
            return match serde_json::from_str::<ToolDescriptor>(payload) {
                Ok(descriptor) => Directive::Tool(descriptor),
                Err(_) => Directive::Text(line.to_string()),
            };
        }
        if let Some(id) = line.strip_prefix("#reference#") {
            return Directive::Reference(id.to_string());
        }
        if let Some(name) = line.strip_prefix("#activity#") {
            return Directive::Activity(name.to_string());
        }
        if let Some(seconds) = line.strip_prefix("#wait#") {
            return match seconds.parse::<u64>() {
                Ok(seconds) => Directive::Wait(seconds),
                Err(_) => Directive::Text(line.to_string()),
            };
        }
        Directive::Text(line.to_string())
    }

    /// True for directives that terminate an accumulation span.
    pub fn is_flush(&self) -> bool {
        matches!(self, Directive::Send | Directive::Update)
    }
}
