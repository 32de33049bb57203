//! PDF extractor: one fragment per page, extracted via pdf_oxide.

use super::{ExtractedStream, Extractor};
use crate::error::{Error, Result};
use pdf_oxide::converters::ConversionOptions;
use std::path::Path;

#[derive(Debug)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for PdfExtractor {
    fn stream(&self, source: &Path) -> Result<ExtractedStream> {
        let mut doc = pdf_oxide::PdfDocument::open(source)
            .map_err(|e| Error::Extraction(format!("failed to open PDF {}: {}", source.display(), e)))?;
        let page_count = doc
            .page_count()
            .map_err(|e| Error::Extraction(format!("failed to read PDF page count: {e}")))?;

        // pdf_oxide documents are not Send, so pages are extracted up
        // front; page count bounds the memory, not file size.
        let options = ConversionOptions::default();
        let mut pages = Vec::with_capacity(page_count);
        for page_idx in 0..page_count {
            match doc.to_markdown(page_idx, &options) {
                Ok(markdown) => {
                    if !markdown.trim().is_empty() {
                        pages.push(markdown);
                    }
                }
                Err(e) => {
                    eprintln!(
                        "Warning: failed to extract page {} of {}: {}",
                        page_idx + 1,
                        source.display(),
                        e
                    );
                }
            }
        }

        Ok(ExtractedStream {
            fragments: Box::new(pages.into_iter().map(Ok)),
            metadata: ExtractedStream::metadata_for(source, "pdf"),
        })
    }

    fn suffixes(&self) -> &[&str] {
        &[".pdf"]
    }
}
