//! Chroma vector store over its HTTP API.
//!
//! Collections are addressed by server-assigned id, resolved once via
//! `get_or_create` and cached. Scores are distances (smaller is closer).

use super::{QueryMatch, VectorRecord, VectorStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    collection_id: Mutex<Option<String>>,
}

impl ChromaStore {
    pub fn new(base_url: &str, collection: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            collection_id: Mutex::new(None),
        }
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::VectorStore(format!(
            "chroma {action} returned {status}: {body}"
        )))
    }

    /// Resolve (and lazily create) the collection, caching its id.
    async fn collection_id(&self) -> Result<String> {
        let mut cached = self.collection_id.lock().await;
        if let Some(ref id) = *cached {
            return Ok(id.clone());
        }

        let response = self
            .client
            .post(format!("{}/api/v1/collections", self.base_url))
            .json(&json!({ "name": self.collection, "get_or_create": true }))
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("chroma unreachable: {e}")))?;
        let response = Self::check(response, "get_or_create collection").await?;

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| Error::VectorStore(format!("invalid chroma response: {e}")))?;
        let id = parsed["id"]
            .as_str()
            .ok_or_else(|| Error::VectorStore("chroma collection response missing id".to_string()))?
            .to_string();

        *cached = Some(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let collection_id = self.collection_id().await?;

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let embeddings: Vec<&[f32]> = records.iter().map(|r| r.embedding.as_slice()).collect();
        let metadatas: Vec<&Map<String, Value>> = records.iter().map(|r| &r.metadata).collect();
        let documents: Vec<&str> = records
            .iter()
            .map(|r| {
                r.metadata
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
            })
            .collect();

        let response = self
            .client
            .post(format!(
                "{}/api/v1/collections/{}/upsert",
                self.base_url, collection_id
            ))
            .json(&json!({
                "ids": ids,
                "embeddings": embeddings,
                "metadatas": metadatas,
                "documents": documents,
            }))
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("chroma unreachable: {e}")))?;
        Self::check(response, "upsert").await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: Option<&HashMap<String, String>>,
    ) -> Result<Vec<QueryMatch>> {
        let collection_id = self.collection_id().await?;

        let mut body = json!({
            "query_embeddings": [vector],
            "n_results": top_k,
            "include": ["metadatas", "documents", "distances"],
        });
        if let Some(filters) = filters {
            if !filters.is_empty() {
                body["where"] = json!(filters);
            }
        }

        let response = self
            .client
            .post(format!(
                "{}/api/v1/collections/{}/query",
                self.base_url, collection_id
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("chroma unreachable: {e}")))?;
        let response = Self::check(response, "query").await?;

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| Error::VectorStore(format!("invalid chroma response: {e}")))?;

        // Chroma nests results one level per query embedding.
        let empty = Vec::new();
        let ids = parsed["ids"][0].as_array().unwrap_or(&empty);
        let distances = parsed["distances"][0].as_array().unwrap_or(&empty);
        let metadatas = parsed["metadatas"][0].as_array().unwrap_or(&empty);
        let documents = parsed["documents"][0].as_array().unwrap_or(&empty);

        let matches = (0..ids.len())
            .map(|i| QueryMatch {
                id: ids[i].as_str().unwrap_or_default().to_string(),
                score: distances
                    .get(i)
                    .and_then(Value::as_f64)
                    .unwrap_or_default() as f32,
                text: documents
                    .get(i)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                metadata: metadatas
                    .get(i)
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();
        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let collection_id = self.collection_id().await?;

        let response = self
            .client
            .post(format!(
                "{}/api/v1/collections/{}/delete",
                self.base_url, collection_id
            ))
            .json(&json!({ "ids": ids }))
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("chroma unreachable: {e}")))?;
        Self::check(response, "delete").await?;
        Ok(())
    }
}
