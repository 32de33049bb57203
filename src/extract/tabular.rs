//! Tabular extractor: one fragment per row.

use super::{ExtractedStream, Extractor};
use crate::error::Result;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug)]
pub struct TabularExtractor;

impl TabularExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TabularExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for TabularExtractor {
    fn stream(&self, source: &Path) -> Result<ExtractedStream> {
        let file = File::open(source)?;
        let lines = BufReader::new(file)
            .lines()
            .map(|line| line.map_err(Into::into));
        Ok(ExtractedStream {
            fragments: Box::new(lines),
            metadata: ExtractedStream::metadata_for(source, "tabular"),
        })
    }

    fn suffixes(&self) -> &[&str] {
        &[".csv", ".tsv"]
    }
}
