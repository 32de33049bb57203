//! Qdrant vector store over its HTTP API.
//!
//! Qdrant point ids must be integers or UUIDs, so the record id is hashed
//! into a deterministic UUID and the original string id rides in the
//! payload under a reserved key. Scores are Qdrant similarities (larger is
//! closer); they are passed through uninterpreted.

use super::{QueryMatch, VectorRecord, VectorStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Payload key carrying the original record id
const ID_KEY: &str = "_omnivec_id";

/// Deterministic UUID for a record id, so re-upserting the same chunk
/// replaces the same point.
fn point_id(record_id: &str) -> String {
    let digest = md5::compute(record_id.as_bytes());
    uuid::Uuid::from_bytes(digest.0).to_string()
}

fn build_filter(filters: Option<&HashMap<String, String>>) -> Option<Value> {
    let filters = filters?;
    if filters.is_empty() {
        return None;
    }
    let must: Vec<Value> = filters
        .iter()
        .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
        .collect();
    Some(json!({ "must": must }))
}

pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    provisioned: Mutex<bool>,
}

impl QdrantStore {
    pub fn new(base_url: &str, collection: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            api_key,
            provisioned: Mutex::new(false),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::VectorStore(format!(
            "qdrant {action} returned {status}: {body}"
        )))
    }

    /// Create the collection on first upsert, sized from the first record.
    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        let mut provisioned = self.provisioned.lock().await;
        if *provisioned {
            return Ok(());
        }

        let existing = self
            .request(
                reqwest::Method::GET,
                &format!("/collections/{}", self.collection),
            )
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("qdrant unreachable: {e}")))?;

        if existing.status() == reqwest::StatusCode::NOT_FOUND {
            let response = self
                .request(
                    reqwest::Method::PUT,
                    &format!("/collections/{}", self.collection),
                )
                .json(&json!({
                    "vectors": { "size": dimensions, "distance": "Cosine" }
                }))
                .send()
                .await
                .map_err(|e| Error::VectorStore(format!("qdrant unreachable: {e}")))?;
            Self::check(response, "create collection").await?;
        } else {
            Self::check(existing, "get collection").await?;
        }

        *provisioned = true;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.ensure_collection(records[0].embedding.len()).await?;

        let points: Vec<Value> = records
            .iter()
            .map(|record| {
                let mut payload = record.metadata.clone();
                payload.insert(ID_KEY.to_string(), Value::String(record.id.clone()));
                json!({
                    "id": point_id(&record.id),
                    "vector": record.embedding,
                    "payload": payload,
                })
            })
            .collect();

        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{}/points?wait=true", self.collection),
            )
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("qdrant unreachable: {e}")))?;
        Self::check(response, "upsert").await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: Option<&HashMap<String, String>>,
    ) -> Result<Vec<QueryMatch>> {
        let mut body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(filter) = build_filter(filters) {
            body["filter"] = filter;
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", self.collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("qdrant unreachable: {e}")))?;
        let response = Self::check(response, "search").await?;

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| Error::VectorStore(format!("invalid qdrant response: {e}")))?;

        let hits = parsed["result"].as_array().cloned().unwrap_or_default();
        let matches = hits
            .into_iter()
            .map(|hit| {
                let mut metadata: Map<String, Value> = hit["payload"]
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                let id = metadata
                    .remove(ID_KEY)
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| hit["id"].to_string());
                let text = metadata
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                QueryMatch {
                    id,
                    score: hit["score"].as_f64().unwrap_or_default() as f32,
                    text,
                    metadata,
                }
            })
            .collect();
        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let points: Vec<String> = ids.iter().map(|id| point_id(id)).collect();
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/delete?wait=true", self.collection),
            )
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("qdrant unreachable: {e}")))?;
        Self::check(response, "delete").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn record(id: &str, text: &str) -> VectorRecord {
        let mut metadata = Map::new();
        metadata.insert("text".to_string(), Value::String(text.to_string()));
        VectorRecord {
            id: id.to_string(),
            embedding: vec![0.1, 0.2, 0.3],
            metadata,
        }
    }

    #[test]
    fn test_point_id_is_deterministic() {
        assert_eq!(point_id("doc-chunk-0"), point_id("doc-chunk-0"));
        assert_ne!(point_id("doc-chunk-0"), point_id("doc-chunk-1"));
        assert!(uuid::Uuid::parse_str(&point_id("doc-chunk-0")).is_ok());
    }

    #[test]
    fn test_build_filter() {
        assert!(build_filter(None).is_none());

        let mut filters = HashMap::new();
        filters.insert("type".to_string(), "text".to_string());
        let filter = build_filter(Some(&filters)).unwrap();
        assert_eq!(filter["must"][0]["key"], "type");
        assert_eq!(filter["must"][0]["match"]["value"], "text");
    }

    #[tokio::test]
    async fn test_first_upsert_provisions_collection() {
        let server = MockServer::start();
        let get_mock = server.mock(|when, then| {
            when.method(GET).path("/collections/test");
            then.status(404);
        });
        let create_mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/collections/test")
                .json_body_partial(r#"{"vectors": {"size": 3, "distance": "Cosine"}}"#);
            then.status(200).json_body(json!({"result": true}));
        });
        let upsert_mock = server.mock(|when, then| {
            when.method(PUT).path("/collections/test/points");
            then.status(200).json_body(json!({"result": {"status": "completed"}}));
        });

        let store = QdrantStore::new(&server.base_url(), "test", None);
        store.upsert(&[record("a", "hello")]).await.unwrap();
        // Second upsert must not re-provision.
        store.upsert(&[record("b", "world")]).await.unwrap();

        get_mock.assert_hits(1);
        create_mock.assert_hits(1);
        upsert_mock.assert_hits(2);
    }

    #[tokio::test]
    async fn test_query_strips_reserved_id_key() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/collections/test/points/search");
            then.status(200).json_body(json!({
                "result": [{
                    "id": "9c56cc51-b374-8a4f-58cb-cc6e26ea2bea",
                    "score": 0.87,
                    "payload": {
                        "_omnivec_id": "doc-chunk-0",
                        "text": "hello world",
                        "type": "text"
                    }
                }]
            }));
        });

        let store = QdrantStore::new(&server.base_url(), "test", None);
        let matches = store.query(&[0.1, 0.2, 0.3], 5, None).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "doc-chunk-0");
        assert_eq!(matches[0].text, "hello world");
        assert!((matches[0].score - 0.87).abs() < 1e-6);
        assert!(!matches[0].metadata.contains_key(ID_KEY));
        assert_eq!(matches[0].metadata.get("type").unwrap(), "text");
    }

    #[tokio::test]
    async fn test_delete_sends_derived_point_ids() {
        let server = MockServer::start();
        let delete_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/collections/test/points/delete")
                .json_body(json!({ "points": [point_id("doc-chunk-0")] }));
            then.status(200).json_body(json!({"result": {"status": "completed"}}));
        });

        let store = QdrantStore::new(&server.base_url(), "test", None);
        store.delete(&["doc-chunk-0".to_string()]).await.unwrap();
        delete_mock.assert();
    }

    #[tokio::test]
    async fn test_empty_slices_are_noops() {
        // No mocks registered: any request would fail the test.
        let store = QdrantStore::new("http://127.0.0.1:1", "test", None);
        store.upsert(&[]).await.unwrap();
        store.delete(&[]).await.unwrap();
    }
}
