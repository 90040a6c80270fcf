//! Mock model for tests: scripted responses, optional char-by-char stream.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChatChunk, ChatModel, ChatResponse};
use crate::error::RuntimeError;
use crate::format::TranscriptMessage;
use crate::history::ToolCall;

/// Scripted model: responses are served in order, the last one repeating.
/// Every request's projected conversation is recorded for assertions.
pub struct MockModel {
    responses: Mutex<VecDeque<ChatResponse>>,
    last: Mutex<Option<ChatResponse>>,
    requests: Mutex<Vec<Vec<TranscriptMessage>>>,
    stream_by_char: bool,
}

impl MockModel {
    pub fn new(response: ChatResponse) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            last: Mutex::new(Some(response)),
            requests: Mutex::new(Vec::new()),
            stream_by_char: false,
        }
    }

    /// A model that answers with plain text.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(ChatResponse::text(content))
    }

    /// A model that answers with text plus tool calls.
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::new(ChatResponse {
            content: content.into(),
            tool_calls,
        })
    }

    /// Queue a response to serve before the terminal one.
    pub fn then(self, response: ChatResponse) -> Self {
        {
            let mut last = self.last.lock().unwrap();
            if let Some(previous) = last.take() {
                self.responses.lock().unwrap().push_back(previous);
            }
            *last = Some(response);
        }
        self
    }

    /// Stream each character as its own fragment.
    pub fn streaming_by_char(mut self) -> Self {
        self.stream_by_char = true;
        self
    }

    /// Conversations this model has been invoked with.
    pub fn requests(&self) -> Vec<Vec<TranscriptMessage>> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self) -> ChatResponse {
        if let Some(queued) = self.responses.lock().unwrap().pop_front() {
            return queued;
        }
        self.last.lock().unwrap().clone().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn invoke(&self, messages: &[TranscriptMessage]) -> Result<ChatResponse, RuntimeError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        Ok(self.next_response())
    }

    async fn invoke_stream(
        &self,
        messages: &[TranscriptMessage],
        tx: mpsc::Sender<ChatChunk>,
    ) -> Result<ChatResponse, RuntimeError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let response = self.next_response();
        if self.stream_by_char {
            for ch in response.content.chars() {
                let _ = tx
                    .send(ChatChunk {
                        content: ch.to_string(),
                    })
                    .await;
            }
        } else if !response.content.is_empty() {
            let _ = tx
                .send(ChatChunk {
                    content: response.content.clone(),
                })
                .await;
        }
        Ok(response)
    }
}
