//! Plain-text extractor: bounded reads, never the whole file at once.

use super::{ExtractedStream, Extractor};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

#[derive(Debug)]
pub struct TextExtractor {
    read_size: usize,
}

impl TextExtractor {
    pub fn new(read_size: usize) -> Self {
        Self {
            read_size: read_size.max(1),
        }
    }
}

impl Extractor for TextExtractor {
    fn stream(&self, source: &Path) -> Result<ExtractedStream> {
        let file = File::open(source)?;
        Ok(ExtractedStream {
            fragments: Box::new(TextFragments {
                reader: BufReader::new(file),
                read_size: self.read_size,
                carry: Vec::new(),
                done: false,
            }),
            metadata: ExtractedStream::metadata_for(source, "text"),
        })
    }

    fn suffixes(&self) -> &[&str] {
        &[".txt", ".md", ".html", ".log"]
    }
}

/// Yields fixed-size text fragments. A multi-byte character split across a
/// read boundary is carried into the next fragment; genuinely invalid
/// UTF-8 is an extraction error, not a silent drop.
struct TextFragments {
    reader: BufReader<File>,
    read_size: usize,
    carry: Vec<u8>,
    done: bool,
}

impl Iterator for TextFragments {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let mut buf = vec![0u8; self.read_size];
            let n = match self.reader.read(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            if n == 0 {
                self.done = true;
                if self.carry.is_empty() {
                    return None;
                }
                return Some(Err(Error::Extraction(
                    "file ends mid-way through a UTF-8 character".to_string(),
                )));
            }

            self.carry.extend_from_slice(&buf[..n]);
            match std::str::from_utf8(&self.carry) {
                Ok(text) => {
                    let fragment = text.to_string();
                    self.carry.clear();
                    return Some(Ok(fragment));
                }
                Err(e) if e.error_len().is_some() => {
                    self.done = true;
                    return Some(Err(Error::Extraction(format!(
                        "invalid UTF-8 at byte {}",
                        e.valid_up_to()
                    ))));
                }
                Err(e) => {
                    // Incomplete trailing character: emit the valid prefix
                    // and carry the tail into the next read.
                    let valid = e.valid_up_to();
                    if valid == 0 {
                        continue;
                    }
                    let fragment = String::from_utf8_lossy(&self.carry[..valid]).into_owned();
                    self.carry.drain(..valid);
                    return Some(Ok(fragment));
                }
            }
        }
    }
}
