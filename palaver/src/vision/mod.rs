//! Link and media enrichment with a persistent URL cache.
//!
//! URLs found in fresh human messages are replaced by bracketed enrichments
//! (`[<url> <description>]`); the bracket also marks them as processed so
//! they are not extracted again. Cache misses go through the adapters.

mod adapters;

pub use adapters::PageSummaryAdapter;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::cache::{JsonDb, StoreError};
use crate::error::RuntimeError;

/// Persisted cache document: `{url -> enriched_text}`.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct UrlCacheDoc {
    pub urls: BTreeMap<String, String>,
}

/// Enriches one URL into descriptive text (image description, media
/// metadata, page summary). External collaborators implement this.
#[async_trait]
pub trait LinkAdapter: Send + Sync {
    async fn enrich(&self, url: &str) -> Result<String, RuntimeError>;
}

/// The three enrichment routes.
#[derive(Clone)]
pub struct VisionAdapters {
    pub image: Arc<dyn LinkAdapter>,
    pub media: Arc<dyn LinkAdapter>,
    pub page: Arc<dyn LinkAdapter>,
}

impl VisionAdapters {
    /// One adapter for every route.
    pub fn uniform(adapter: Arc<dyn LinkAdapter>) -> Self {
        Self {
            image: adapter.clone(),
            media: adapter.clone(),
            page: adapter,
        }
    }
}

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("static pattern"));

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "gif", "jpg", "jpeg"];
const MEDIA_HOSTS: [&str; 1] = ["soundcloud.com"];

/// URLs in `text` that are not already enriched (not preceded by `[`).
///
/// The regex crate has no lookbehind, so the preceding byte is checked by
/// hand.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_PATTERN
        .find_iter(text)
        .filter(|m| {
            let start = m.start();
            start == 0 || text.as_bytes()[start - 1] != b'['
        })
        .map(|m| m.as_str().to_string())
        .collect()
}

fn looks_like_image(url: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|ext| url.ends_with(ext))
        || (url.contains("cdn.discordapp.com/attachments/")
            && IMAGE_EXTENSIONS.iter().any(|ext| url.contains(ext)))
}

fn looks_like_media(url: &str) -> bool {
    MEDIA_HOSTS.iter().any(|host| url.contains(host))
}

/// Enrichment service: cache plus adapter dispatch.
pub struct VisionService {
    cache: JsonDb<UrlCacheDoc>,
    adapters: VisionAdapters,
}

impl VisionService {
    pub fn new(cache_path: impl AsRef<Path>, adapters: VisionAdapters) -> Self {
        Self {
            cache: JsonDb::new(cache_path),
            adapters,
        }
    }

    /// Routes one URL to its adapter and brackets the result. Adapter
    /// failures degrade into an inline error note, never an error.
    pub async fn process_url(&self, url: &str) -> String {
        let result = if looks_like_image(url) {
            self.adapters
                .image
                .enrich(url)
                .await
                .unwrap_or_else(|e| format!("Describe image failed. Error={e}"))
        } else if looks_like_media(url) {
            self.adapters
                .media
                .enrich(url)
                .await
                .unwrap_or_else(|e| format!("Error extracting info: {e}"))
        } else {
            self.adapters
                .page
                .enrich(url)
                .await
                .unwrap_or_else(|e| format!("Failed to inspect link. Error={e}"))
        };
        format!("[{url} {result}]")
    }

    /// Resolves each URL to its replacement, serving hits from the cache and
    /// writing fresh enrichments back.
    pub async fn enrich_all(
        &self,
        urls: &[String],
    ) -> Result<BTreeMap<String, String>, StoreError> {
        let mut replacements = BTreeMap::new();
        let cached = self.cache.read().await?;
        let mut misses: Vec<&String> = Vec::new();
        for url in urls {
            match cached.urls.get(url) {
                Some(hit) => {
                    replacements.insert(url.clone(), hit.clone());
                }
                None => misses.push(url),
            }
        }
        if misses.is_empty() {
            return Ok(replacements);
        }
        debug!(count = misses.len(), "processing uncached urls");

        let processed =
            futures::future::join_all(misses.iter().map(|url| self.process_url(url))).await;
        let fresh: Vec<(String, String)> = misses
            .into_iter()
            .cloned()
            .zip(processed)
            .collect();
        self.cache
            .update(|doc| {
                for (url, replacement) in &fresh {
                    doc.urls.insert(url.clone(), replacement.clone());
                }
            })
            .await?;
        replacements.extend(fresh);
        Ok(replacements)
    }
}
