//! Pluggable vector stores.
//!
//! Three implementations: embedded LanceDB (default), Qdrant over HTTP,
//! and Chroma over HTTP. All of them provision their collection lazily on
//! the first upsert, inferring vector dimensionality from the first
//! record; later dimensionality mismatches are fatal. `score` is the
//! backend's native ranking value and is passed through uninterpreted.

mod chroma;
mod lance;
mod qdrant;

pub use chroma::ChromaStore;
pub use lance::LanceStore;
pub use qdrant::QdrantStore;

use crate::config::{Settings, StoreProvider};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One persisted chunk: id, vector, and open-ended metadata. The chunk
/// text rides in `metadata["text"]`, the model tag in
/// `metadata["embedding_model"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// One search hit. Smaller `score` means closer for the default backend,
/// but callers should treat it as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace any prior record with the same id. No-op on an empty slice.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Nearest neighbors by the backend's native distance. `filters` is a
    /// flat key -> value equality conjunction over metadata.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: Option<&HashMap<String, String>>,
    ) -> Result<Vec<QueryMatch>>;

    /// Remove records by id. Unknown ids are silently ignored; no-op on an
    /// empty slice.
    async fn delete(&self, ids: &[String]) -> Result<()>;
}

/// Build the store selected in settings.
pub async fn create_store(settings: &Settings) -> Result<Arc<dyn VectorStore>> {
    match settings.store_provider {
        StoreProvider::Lance => Ok(Arc::new(
            LanceStore::new(&settings.lance_dir(), &settings.collection).await?,
        )),
        StoreProvider::Qdrant => {
            let api_key = Settings::secret_from_env(&settings.qdrant_api_key_env);
            Ok(Arc::new(QdrantStore::new(
                &settings.qdrant_url,
                &settings.collection,
                api_key,
            )))
        }
        StoreProvider::Chroma => Ok(Arc::new(ChromaStore::new(
            &settings.chroma_url,
            &settings.collection,
        ))),
    }
}

/// Flat equality check used by backends without native metadata filters.
pub(crate) fn matches_filters(
    metadata: &Map<String, Value>,
    filters: Option<&HashMap<String, String>>,
) -> bool {
    let Some(filters) = filters else {
        return true;
    };
    filters.iter().all(|(key, expected)| {
        metadata
            .get(key)
            .map(|v| match v {
                Value::String(s) => s == expected,
                other => other.to_string() == *expected,
            })
            .unwrap_or(false)
    })
}
