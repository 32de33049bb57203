//! Whitespace normalization applied to every streamed fragment.

use crate::error::Result;

/// Normalizes fragments before chunking: collapses whitespace runs to a
/// single space, optionally lowercases, trims. Idempotent.
#[derive(Debug, Clone, Default)]
pub struct TextCleaner {
    lowercase: bool,
}

impl TextCleaner {
    pub fn new() -> Self {
        Self { lowercase: false }
    }

    pub fn with_lowercase(lowercase: bool) -> Self {
        Self { lowercase }
    }

    /// Clean a single fragment. Returns an empty string when nothing
    /// survives normalization.
    pub fn clean(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if self.lowercase {
            collapsed.to_lowercase()
        } else {
            collapsed
        }
    }

    /// Clean a fragment stream. Order-preserving; fragments that clean to
    /// empty are dropped, errors pass through untouched.
    pub fn clean_stream<I>(&self, stream: I) -> impl Iterator<Item = Result<String>>
    where
        I: Iterator<Item = Result<String>>,
    {
        let cleaner = self.clone();
        stream.filter_map(move |item| match item {
            Ok(text) => {
                let cleaned = cleaner.clean(&text);
                if cleaned.is_empty() {
                    None
                } else {
                    Some(Ok(cleaned))
                }
            }
            Err(e) => Some(Err(e)),
        })
    }
}
