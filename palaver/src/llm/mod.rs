//! The language-model seam the runtime consumes.
//!
//! Concrete providers are external collaborators; the runtime only depends
//! on [`ChatModel`]. [`MockModel`] drives the tests.

mod mock;

pub use mock::MockModel;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::format::TranscriptMessage;
use crate::history::ToolCall;

/// A complete model turn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// One streamed fragment of a model turn.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatChunk {
    pub content: String,
}

/// Chat-completion client seam.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One full completion over the projected conversation.
    async fn invoke(&self, messages: &[TranscriptMessage]) -> Result<ChatResponse, RuntimeError>;

    /// Streaming completion: fragments go through `tx` as they arrive and
    /// the assembled response is returned. The default forwards the full
    /// completion as a single fragment.
    async fn invoke_stream(
        &self,
        messages: &[TranscriptMessage],
        tx: mpsc::Sender<ChatChunk>,
    ) -> Result<ChatResponse, RuntimeError> {
        let response = self.invoke(messages).await?;
        if !response.content.is_empty() {
            let _ = tx
                .send(ChatChunk {
                    content: response.content.clone(),
                })
                .await;
        }
        Ok(response)
    }
}
