//! Built-in page adapter: fetch the page, summarize it with a model.

use std::sync::Arc;

use async_trait::async_trait;

use super::LinkAdapter;
use crate::error::RuntimeError;
use crate::format::TranscriptMessage;
use crate::llm::ChatModel;

/// Characters of page body handed to the summarization model.
const PAGE_SIZE_LIMIT: usize = 10_000;

/// GET the page and summarize its (truncated) body.
pub struct PageSummaryAdapter {
    http: reqwest::Client,
    model: Arc<dyn ChatModel>,
}

impl PageSummaryAdapter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            http: reqwest::Client::new(),
            model,
        }
    }
}

#[async_trait]
impl LinkAdapter for PageSummaryAdapter {
    async fn enrich(&self, url: &str) -> Result<String, RuntimeError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RuntimeError::ExecutionFailed(e.to_string()))?;
        let mut body = response
            .text()
            .await
            .map_err(|e| RuntimeError::ExecutionFailed(e.to_string()))?;
        if body.len() > PAGE_SIZE_LIMIT {
            let mut cut = PAGE_SIZE_LIMIT;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push_str("...");
        }
        let summary = self
            .model
            .invoke(&[TranscriptMessage::System {
                content: format!("Summarize this page : {url} {body}"),
            }])
            .await?;
        Ok(summary.content)
    }
}
