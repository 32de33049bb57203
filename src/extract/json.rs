//! JSON extractor: flattens nested documents into `path: value` fragments.

use super::{ExtractedStream, Extractor};
use crate::error::{Error, Result};
use serde_json::Value;
use std::path::Path;

#[derive(Debug)]
pub struct JsonExtractor;

impl JsonExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively flattens arbitrarily nested objects and arrays. Array
/// elements are indexed and appended to the parent key.
fn flatten_json(value: &Value, parent_key: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let new_key = if parent_key.is_empty() {
                    key.clone()
                } else {
                    format!("{parent_key}.{key}")
                };
                flatten_json(child, &new_key, out);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                let new_key = format!("{parent_key}[{idx}]");
                flatten_json(child, &new_key, out);
            }
        }
        leaf => {
            let key = if parent_key.is_empty() {
                "value".to_string()
            } else {
                parent_key.to_string()
            };
            let rendered = match leaf {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push((key, rendered));
        }
    }
}

impl Extractor for JsonExtractor {
    fn stream(&self, source: &Path) -> Result<ExtractedStream> {
        let content = std::fs::read_to_string(source)?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| Error::Extraction(format!("invalid JSON in {}: {}", source.display(), e)))?;

        let mut leaves = Vec::new();
        flatten_json(&value, "", &mut leaves);

        Ok(ExtractedStream {
            fragments: Box::new(
                leaves
                    .into_iter()
                    .map(|(key, value)| Ok(format!("{key}: {value}"))),
            ),
            metadata: ExtractedStream::metadata_for(source, "json"),
        })
    }

    fn suffixes(&self) -> &[&str] {
        &[".json"]
    }
}
