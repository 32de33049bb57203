//! URL extractor: fetches a page, converts HTML to text, and streams
//! sentence-grained fragments. Bypasses the suffix registry.

use super::ExtractedStream;
use crate::error::{Error, Result};
use std::collections::HashMap;

const USER_AGENT: &str = concat!("omnivec/", env!("CARGO_PKG_VERSION"));

/// Pull the `<title>` content out of raw HTML, if any.
fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let start = lower.find("<title>")?;
    let end = lower[start..].find("</title>")?;
    let title = html[start + 7..start + end].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

pub struct UrlExtractor {
    client: reqwest::Client,
}

impl UrlExtractor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Fetch a page and return its fragment stream. The body is downloaded
    /// up front; fragmentation follows sentence boundaries so the chunker
    /// sees the same units a file extractor would produce.
    pub async fn fetch(&self, url: &str) -> Result<ExtractedStream> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Extraction(format!("{url} returned {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::Extraction(format!("failed to read {url}: {e}")))?;

        let title = extract_title(&html).unwrap_or_default();
        let text = html2md::rewrite_html(&html, false);

        let fragments: Vec<String> = text
            .split(". ")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), url.to_string());
        metadata.insert("type".to_string(), "url".to_string());
        metadata.insert("title".to_string(), title);

        Ok(ExtractedStream {
            fragments: Box::new(fragments.into_iter().map(Ok)),
            metadata,
        })
    }
}

impl Default for UrlExtractor {
    fn default() -> Self {
        Self::new()
    }
}
