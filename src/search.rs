//! Query path: clean, embed, query the store, slice.

use crate::clean::TextCleaner;
use crate::embeddings::EmbeddingBackend;
use crate::error::{Error, Result};
use crate::store::{QueryMatch, VectorStore};
use std::collections::HashMap;
use std::sync::Arc;

pub struct SearchService {
    cleaner: TextCleaner,
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn VectorStore>,
}

impl SearchService {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            cleaner: TextCleaner::new(),
            embedder,
            store,
        }
    }

    /// Embed the query and return the `top_k` nearest matches after
    /// `offset`. The offset is applied client-side over an enlarged fetch,
    /// so large offsets are legal but increasingly expensive.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        offset: usize,
        filters: Option<&HashMap<String, String>>,
    ) -> Result<Vec<QueryMatch>> {
        let text = self.cleaner.clean(query);
        let embedded = self.embedder.embed(&[text]).await?;
        let embedding = embedded
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("backend returned no vector for query".to_string()))?;

        let fetch = (top_k + offset).max(top_k);
        let matches = self.store.query(&embedding.vector, fetch, filters).await?;
        Ok(matches.into_iter().skip(offset).take(top_k).collect())
    }
}
