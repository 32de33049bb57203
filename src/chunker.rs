//! Streaming hybrid chunker (semantic pre-aggregation + fixed windows).
//!
//! Converts an unbounded sequence of text fragments into fixed-size
//! overlapping chunks without ever buffering a whole document. Each incoming
//! fragment is split into semantic units (paragraphs, then sentences); units
//! accumulate in a buffer that is drained window-by-window as soon as it
//! holds `chunk_size` characters. Peak buffer size is bounded by
//! `chunk_size` plus the longest single unit.

use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};

/// A bounded window of document text, overlapping its predecessor.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

/// Fixed-window chunker with character-level geometry.
#[derive(Debug, Clone)]
pub struct HybridChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl HybridChunker {
    /// Geometry must satisfy `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Config(
                "chunk_overlap must be smaller than chunk_size".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Lazily chunk a fragment stream. The stream is consumed exactly once;
    /// chunk ids are `{source}-chunk-{index}` with `source` taken from the
    /// document metadata. An upstream error is yielded once and ends the
    /// stream.
    pub fn iter_chunks<I>(&self, fragments: I, metadata: HashMap<String, String>) -> ChunkStream<I>
    where
        I: Iterator<Item = Result<String>>,
    {
        let source = metadata
            .get("source")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        ChunkStream {
            fragments,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            metadata,
            source,
            buf: String::new(),
            buf_chars: 0,
            units: VecDeque::new(),
            next_index: 0,
            input_done: false,
            finished: false,
        }
    }
}

/// Split a fragment into semantic units: paragraphs on a blank line, then
/// sentences on `". "` with inner newlines flattened. Units come back
/// trimmed and non-empty.
fn semantic_units(text: &str) -> Vec<String> {
    let mut units = Vec::new();
    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let flattened = paragraph.replace('\n', " ");
        for sentence in flattened.split(". ") {
            let sentence = sentence.trim();
            if !sentence.is_empty() {
                units.push(sentence.to_string());
            }
        }
    }
    units
}

/// Byte offset of the nth character, clamped to the string length.
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Pull-based chunk producer. Never rereads an input fragment and never
/// emits a chunk before enough input has accumulated to fill it (except the
/// trailing partial).
pub struct ChunkStream<I> {
    fragments: I,
    chunk_size: usize,
    chunk_overlap: usize,
    metadata: HashMap<String, String>,
    source: String,
    buf: String,
    buf_chars: usize,
    units: VecDeque<String>,
    next_index: usize,
    input_done: bool,
    finished: bool,
}

impl<I> ChunkStream<I> {
    fn absorb(&mut self, unit: String) {
        if self.buf.is_empty() {
            self.buf_chars = unit.chars().count();
            self.buf = unit;
        } else {
            self.buf_chars += 1 + unit.chars().count();
            self.buf.push(' ');
            self.buf.push_str(&unit);
        }
    }

    /// Emit one full window and slide the buffer forward by
    /// `chunk_size - chunk_overlap` characters.
    fn emit_window(&mut self) -> Chunk {
        let cut = char_offset(&self.buf, self.chunk_size);
        let text = self.buf[..cut].to_string();
        let step = self.chunk_size - self.chunk_overlap;
        let keep_from = char_offset(&self.buf, step);
        self.buf = self.buf.split_off(keep_from);
        self.buf_chars -= step;
        self.build_chunk(text)
    }

    fn build_chunk(&mut self, text: String) -> Chunk {
        let index = self.next_index;
        self.next_index += 1;
        let mut metadata = self.metadata.clone();
        metadata.insert("chunk_index".to_string(), index.to_string());
        Chunk {
            id: format!("{}-chunk-{}", self.source, index),
            text,
            metadata,
        }
    }
}

impl<I> Iterator for ChunkStream<I>
where
    I: Iterator<Item = Result<String>>,
{
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self.buf_chars >= self.chunk_size {
                return Some(Ok(self.emit_window()));
            }
            if let Some(unit) = self.units.pop_front() {
                self.absorb(unit);
                continue;
            }
            if self.input_done {
                self.finished = true;
                if self.buf.is_empty() {
                    return None;
                }
                let text = std::mem::take(&mut self.buf);
                self.buf_chars = 0;
                return Some(Ok(self.build_chunk(text)));
            }
            match self.fragments.next() {
                Some(Ok(block)) => self.units.extend(semantic_units(&block)),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => self.input_done = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(source: &str) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("source".to_string(), source.to_string());
        m
    }

    fn chunk_texts(
        size: usize,
        overlap: usize,
        fragments: &[&str],
        metadata: HashMap<String, String>,
    ) -> Vec<Chunk> {
        let chunker = HybridChunker::new(size, overlap).unwrap();
        chunker
            .iter_chunks(
                fragments.iter().map(|f| Ok(f.to_string())),
                metadata,
            )
            .map(|c| c.unwrap())
            .collect()
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert!(HybridChunker::new(10, 10).is_err());
        assert!(HybridChunker::new(10, 11).is_err());
        assert!(HybridChunker::new(0, 0).is_err());
        assert!(HybridChunker::new(10, 0).is_ok());
        assert!(HybridChunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_deterministic_windows_with_overlap() {
        // Units join with a single space, so the virtual document is
        // "abcdefghij klmnop" and windows slide by size - overlap = 7.
        let chunks = chunk_texts(10, 3, &["abcdefghij", "klmnop"], meta("doc"));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefghij", "hij klmnop", "nop"]);

        assert_eq!(chunks[0].id, "doc-chunk-0");
        assert_eq!(chunks[1].id, "doc-chunk-1");
        assert_eq!(chunks[2].id, "doc-chunk-2");
        assert_eq!(chunks[1].metadata.get("chunk_index").unwrap(), "1");
    }

    #[test]
    fn test_all_but_last_chunk_are_full_sized() {
        let body = "x".repeat(95);
        let chunks = chunk_texts(20, 5, &[body.as_str()], meta("doc"));
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.text.chars().count(), 20);
        }
        let last = chunks.last().unwrap();
        let n = last.text.chars().count();
        assert!(n >= 1 && n <= 20);
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let body: String = ('a'..='z').cycle().take(200).collect();
        let size = 30;
        let overlap = 7;
        let chunks = chunk_texts(size, overlap, &[body.as_str()], meta("doc"));
        for pair in chunks.windows(2) {
            if pair[1].text.chars().count() < overlap {
                continue;
            }
            let tail: String = pair[0].text.chars().skip(size - overlap).collect();
            let head: String = pair[1].text.chars().take(overlap).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_zero_overlap_reconstructs_document() {
        let body: String = ('a'..='z').cycle().take(100).collect();
        let chunks = chunk_texts(16, 0, &[body.as_str()], meta("doc"));
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, body);
    }

    #[test]
    fn test_empty_stream_yields_no_chunks() {
        let chunks = chunk_texts(10, 2, &[], meta("doc"));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_input_yields_single_chunk() {
        let chunks = chunk_texts(100, 10, &["tiny input"], meta("doc"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "tiny input");
        assert_eq!(chunks[0].id, "doc-chunk-0");
    }

    #[test]
    fn test_missing_source_falls_back_to_unknown() {
        let chunks = chunk_texts(100, 10, &["hello"], HashMap::new());
        assert_eq!(chunks[0].id, "unknown-chunk-0");
    }

    #[test]
    fn test_semantic_units_split_paragraphs_and_sentences() {
        let units = semantic_units("First sentence. Second one.\n\nNew\nparagraph here");
        assert_eq!(
            units,
            vec!["First sentence", "Second one.", "New paragraph here"]
        );
    }

    #[test]
    fn test_semantic_units_drop_blank_paragraphs() {
        let units = semantic_units("\n\n  \n\nonly one");
        assert_eq!(units, vec!["only one"]);
    }

    #[test]
    fn test_multibyte_input_slices_on_char_boundaries() {
        let body = "é".repeat(25);
        let chunks = chunk_texts(10, 4, &[body.as_str()], meta("doc"));
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.text.chars().count(), 10);
        }
        let total: usize = chunks
            .iter()
            .map(|c| c.text.chars().count())
            .sum::<usize>();
        assert!(total >= 25);
    }

    #[test]
    fn test_upstream_error_ends_stream() {
        let chunker = HybridChunker::new(10, 2).unwrap();
        let fragments: Vec<crate::error::Result<String>> = vec![
            Ok("short".to_string()),
            Err(Error::Extraction("decode failure".to_string())),
            Ok("never pulled".to_string()),
        ];
        let mut stream = chunker.iter_chunks(fragments.into_iter(), meta("doc"));
        let first = stream.next().unwrap();
        assert!(first.is_err());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_chunk_metadata_carries_document_metadata() {
        let mut m = meta("report.txt");
        m.insert("type".to_string(), "text".to_string());
        let chunks = chunk_texts(100, 10, &["some content"], m);
        assert_eq!(chunks[0].metadata.get("type").unwrap(), "text");
        assert_eq!(chunks[0].metadata.get("source").unwrap(), "report.txt");
        assert_eq!(chunks[0].metadata.get("chunk_index").unwrap(), "0");
    }

    #[test]
    fn test_same_input_same_chunks() {
        let fragments = ["The quick brown fox. Jumps over\nthe lazy dog.\n\nAgain and again"];
        let a = chunk_texts(24, 6, &fragments, meta("doc"));
        let b = chunk_texts(24, 6, &fragments, meta("doc"));
        assert_eq!(a, b);
    }
}
