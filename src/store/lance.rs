//! Embedded LanceDB vector store (the default backend).
//!
//! One table per collection: id, text, metadata (JSON string), vector.
//! Upsert is delete-by-id followed by an append, giving replace semantics
//! per id without a separate merge path. Scores are raw cosine distances,
//! so smaller is closer.

use super::{matches_filters, QueryMatch, VectorRecord, VectorStore};
use crate::error::{Error, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Escape single quotes in strings to keep filter expressions well-formed
fn escape_sql(s: &str) -> String {
    s.replace('\'', "''")
}

fn id_list_predicate(ids: &[String]) -> String {
    let quoted: Vec<String> = ids.iter().map(|id| format!("'{}'", escape_sql(id))).collect();
    format!("id IN ({})", quoted.join(", "))
}

pub struct LanceStore {
    conn: Connection,
    collection: String,
    table: Mutex<Option<Table>>,
}

impl LanceStore {
    pub async fn new(data_dir: &Path, collection: &str) -> Result<Self> {
        let conn = connect(&data_dir.to_string_lossy())
            .execute()
            .await
            .map_err(|e| Error::VectorStore(format!("failed to connect to LanceDB: {e}")))?;

        // Reopen the collection if a previous run created it
        let table = conn.open_table(collection).execute().await.ok();

        Ok(Self {
            conn,
            collection: collection.to_string(),
            table: Mutex::new(table),
        })
    }

    fn schema(dimensions: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimensions as i32,
                ),
                false,
            ),
        ]))
    }

    /// Create the table on first use, sized to the first record's vector.
    async fn get_or_create_table(&self, dimensions: usize) -> Result<Table> {
        let mut guard = self.table.lock().await;
        if let Some(ref table) = *guard {
            return Ok(table.clone());
        }

        let table = self
            .conn
            .create_empty_table(self.collection.as_str(), Self::schema(dimensions))
            .execute()
            .await
            .map_err(|e| Error::VectorStore(format!("failed to create collection: {e}")))?;

        *guard = Some(table.clone());
        Ok(table)
    }

    fn build_batch(records: &[VectorRecord], dimensions: usize) -> Result<RecordBatch> {
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let texts: Vec<String> = records
            .iter()
            .map(|r| {
                r.metadata
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            })
            .collect();
        let text_refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let metadatas: Vec<String> = records
            .iter()
            .map(|r| Value::Object(r.metadata.clone()).to_string())
            .collect();
        let metadata_refs: Vec<&str> = metadatas.iter().map(|s| s.as_str()).collect();

        for record in records {
            if record.embedding.len() != dimensions {
                return Err(Error::VectorStore(format!(
                    "vector dimensionality mismatch: expected {}, record {} has {}",
                    dimensions,
                    record.id,
                    record.embedding.len()
                )));
            }
        }
        let flat: Vec<f32> = records.iter().flat_map(|r| r.embedding.iter().copied()).collect();

        RecordBatch::try_new(
            Self::schema(dimensions),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(text_refs)),
                Arc::new(StringArray::from(metadata_refs)),
                Arc::new(FixedSizeListArray::new(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimensions as i32,
                    Arc::new(Float32Array::from(flat)),
                    None,
                )),
            ],
        )
        .map_err(|e| Error::VectorStore(format!("failed to build record batch: {e}")))
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let dimensions = records[0].embedding.len();
        let table = self.get_or_create_table(dimensions).await?;

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        table
            .delete(&id_list_predicate(&ids))
            .await
            .map_err(|e| Error::VectorStore(format!("failed to replace records: {e}")))?;

        let schema = Self::schema(dimensions);
        let batch = Self::build_batch(records, dimensions)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(batches)
            .execute()
            .await
            .map_err(|e| Error::VectorStore(format!("failed to write records: {e}")))?;

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: Option<&HashMap<String, String>>,
    ) -> Result<Vec<QueryMatch>> {
        let table = {
            let guard = self.table.lock().await;
            match *guard {
                Some(ref t) => t.clone(),
                None => return Ok(Vec::new()),
            }
        };

        // Lance has no native filter over the JSON metadata column, so
        // over-fetch and filter client-side.
        let fetch = if filters.is_some() { top_k * 4 } else { top_k };

        let results = table
            .vector_search(vector.to_vec())
            .map_err(|e| Error::VectorStore(format!("failed to build vector search: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(fetch.max(1))
            .execute()
            .await
            .map_err(|e| Error::VectorStore(format!("search failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| Error::VectorStore(format!("failed to collect search results: {e}")))?;

        let mut matches = Vec::new();
        for batch in batches {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let texts = batch
                .column_by_name("text")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let metadatas = batch
                .column_by_name("metadata")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            if let (Some(ids), Some(texts), Some(metadatas), Some(distances)) =
                (ids, texts, metadatas, distances)
            {
                for i in 0..batch.num_rows() {
                    let metadata: Map<String, Value> =
                        serde_json::from_str(metadatas.value(i)).unwrap_or_default();
                    if !matches_filters(&metadata, filters) {
                        continue;
                    }
                    matches.push(QueryMatch {
                        id: ids.value(i).to_string(),
                        score: distances.value(i),
                        text: texts.value(i).to_string(),
                        metadata,
                    });
                }
            }
        }

        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let table = {
            let guard = self.table.lock().await;
            match *guard {
                Some(ref t) => t.clone(),
                None => return Ok(()),
            }
        };
        table
            .delete(&id_list_predicate(ids))
            .await
            .map_err(|e| Error::VectorStore(format!("delete failed: {e}")))?;
        Ok(())
    }
}
