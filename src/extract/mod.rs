//! Format-specific extractors and the suffix registry.
//!
//! An extractor turns a source into a lazy stream of non-empty text
//! fragments plus document metadata. The fragment sequence is consumed
//! exactly once, in order; decode errors surface as `Err` items rather
//! than silent truncation. Registration is keyed by lowercase dotted
//! suffix and the last registration for a suffix wins. URL ingestion
//! bypasses the registry via [`UrlExtractor`].

mod json;
mod pdf;
mod tabular;
mod text;
mod url;

pub use json::JsonExtractor;
pub use pdf::PdfExtractor;
pub use tabular::TabularExtractor;
pub use text::TextExtractor;
pub use url::UrlExtractor;

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A fragment stream plus the document metadata that travels with it.
/// Metadata always includes `source` and `type`.
pub struct ExtractedStream {
    pub fragments: Box<dyn Iterator<Item = Result<String>> + Send>,
    pub metadata: HashMap<String, String>,
}

impl std::fmt::Debug for ExtractedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractedStream")
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl ExtractedStream {
    pub(crate) fn metadata_for(source: &Path, kind: &str) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source.display().to_string());
        metadata.insert("type".to_string(), kind.to_string());
        metadata
    }
}

/// Produces a fragment stream for one source file. Implementations own any
/// I/O handles they open and release them when the stream is dropped.
pub trait Extractor: Send + Sync + std::fmt::Debug {
    fn stream(&self, source: &Path) -> Result<ExtractedStream>;

    /// Lowercase dotted suffixes this extractor handles.
    fn suffixes(&self) -> &[&str];
}

/// Maps a source's suffix to an extractor.
pub struct ExtractorRegistry {
    handlers: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Registry with all built-in extractors.
    pub fn new(stream_read_bytes: usize) -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(Arc::new(TextExtractor::new(stream_read_bytes)));
        registry.register(Arc::new(TabularExtractor::new()));
        registry.register(Arc::new(JsonExtractor::new()));
        registry.register(Arc::new(PdfExtractor::new()));
        registry
    }

    /// Register under every suffix the extractor claims. Later
    /// registrations replace earlier ones.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        for suffix in extractor.suffixes() {
            self.handlers
                .insert(suffix.to_lowercase(), Arc::clone(&extractor));
        }
    }

    /// Look up the extractor for a path's suffix.
    pub fn resolve(&self, path: &Path) -> Result<Arc<dyn Extractor>> {
        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        self.handlers
            .get(&suffix)
            .cloned()
            .ok_or(Error::UnsupportedSource(suffix))
    }
}
