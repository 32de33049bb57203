//! End-to-end streaming ingestion with checkpoints + batched embeddings.
//!
//! One pipeline run drives a single job from start to terminal state:
//! extract, clean, chunk, batch, embed (with retry and failover), upsert,
//! checkpoint. Stages form a pull chain, so the extractor is only read as
//! fast as the store accepts writes. A batch is either fully upserted and
//! counted or not counted at all.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::chunker::{Chunk, HybridChunker};
use crate::clean::TextCleaner;
use crate::config::Settings;
use crate::embeddings::{EmbeddingBackend, EmbeddingResult};
use crate::error::{Error, Result};
use crate::extract::{ExtractedStream, ExtractorRegistry, UrlExtractor};
use crate::jobs::JobManager;
use crate::store::{VectorRecord, VectorStore};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Build one vector record per chunk: the chunk metadata plus the chunk
/// text and the model tag that embedded it.
fn to_vector_records(chunks: &[Chunk], embeddings: &[EmbeddingResult]) -> Vec<VectorRecord> {
    chunks
        .iter()
        .zip(embeddings.iter())
        .map(|(chunk, embedding)| {
            let mut metadata = serde_json::Map::new();
            for (key, value) in &chunk.metadata {
                metadata.insert(key.clone(), Value::String(value.clone()));
            }
            metadata.insert("text".to_string(), Value::String(chunk.text.clone()));
            metadata.insert(
                "embedding_model".to_string(),
                Value::String(embedding.model.clone()),
            );
            VectorRecord {
                id: chunk.id.clone(),
                embedding: embedding.vector.clone(),
                metadata,
            }
        })
        .collect()
}

pub struct IngestionPipeline {
    chunker: HybridChunker,
    cleaner: TextCleaner,
    embedder: Arc<dyn EmbeddingBackend>,
    fallback: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn VectorStore>,
    jobs: Arc<JobManager>,
    registry: ExtractorRegistry,
    url_extractor: UrlExtractor,
    checkpoint_dir: PathBuf,
    batch_size: usize,
    max_retries: u32,
    retry_delay_secs: f64,
    retry_backoff: f64,
}

impl IngestionPipeline {
    pub fn new(
        settings: &Settings,
        embedder: Arc<dyn EmbeddingBackend>,
        fallback: Arc<dyn EmbeddingBackend>,
        store: Arc<dyn VectorStore>,
        jobs: Arc<JobManager>,
    ) -> Result<Self> {
        Ok(Self {
            chunker: HybridChunker::new(settings.chunk_size, settings.chunk_overlap)?,
            cleaner: TextCleaner::new(),
            embedder,
            fallback,
            store,
            jobs,
            registry: ExtractorRegistry::new(settings.stream_read_bytes),
            url_extractor: UrlExtractor::new(),
            checkpoint_dir: settings.checkpoint_dir(),
            batch_size: settings.chunk_batch_size,
            max_retries: settings.embedding_max_retries,
            retry_delay_secs: settings.embedding_retry_delay_secs,
            retry_backoff: settings.embedding_retry_backoff,
        })
    }

    pub async fn ingest_file(
        &self,
        job_id: &str,
        path: &Path,
        extra_metadata: &HashMap<String, String>,
    ) -> Result<()> {
        let extractor = self.registry.resolve(path)?;
        let streamed = extractor.stream(path)?;
        self.process_stream(job_id, streamed, extra_metadata).await
    }

    pub async fn ingest_url(
        &self,
        job_id: &str,
        url: &str,
        extra_metadata: &HashMap<String, String>,
    ) -> Result<()> {
        let streamed = self.url_extractor.fetch(url).await?;
        self.process_stream(job_id, streamed, extra_metadata).await
    }

    /// The batch loop. Skips chunks already covered by the checkpoint
    /// (verifying their digest), flushes full batches, and deletes the
    /// checkpoint once the whole stream has been persisted.
    async fn process_stream(
        &self,
        job_id: &str,
        streamed: ExtractedStream,
        extra_metadata: &HashMap<String, String>,
    ) -> Result<()> {
        // Caller-supplied keys override extractor keys on collision.
        let mut metadata = streamed.metadata;
        metadata.extend(extra_metadata.clone());

        let checkpoint = CheckpointStore::new(&self.checkpoint_dir, job_id);
        let snapshot = checkpoint.load()?;
        let already_processed = snapshot.as_ref().map(|c| c.chunks_processed).unwrap_or(0);
        let expected_digest = snapshot.and_then(|c| c.prefix_digest);

        let cleaned = self.cleaner.clean_stream(streamed.fragments);
        let mut chunks = self.chunker.iter_chunks(cleaned, metadata);

        let mut batch: Vec<Chunk> = Vec::new();
        let mut chunk_idx: u64 = 0;
        let mut digest = md5::Context::new();

        while let Some(next) = chunks.next() {
            let chunk = next?;
            digest.consume(chunk.text.as_bytes());

            // Skip the prefix a previous run already embedded. The chunker
            // is deterministic for identical input and configuration, so
            // the skipped chunks match what was persisted; the digest
            // check catches an extractor that fragments differently.
            if chunk_idx < already_processed {
                chunk_idx += 1;
                if chunk_idx == already_processed {
                    if let Some(ref expected) = expected_digest {
                        let actual = format!("{:x}", digest.clone().compute());
                        if actual != *expected {
                            return Err(Error::Checkpoint(format!(
                                "resume drift for job {job_id}: the first {already_processed} \
                                 chunks differ from the checkpointed run"
                            )));
                        }
                    }
                }
                continue;
            }

            batch.push(chunk);
            chunk_idx += 1;

            if batch.len() >= self.batch_size {
                self.flush_batch(job_id, &batch).await?;
                self.jobs.increment_chunks(job_id, batch.len() as u64);
                checkpoint.write(&Checkpoint {
                    chunks_processed: chunk_idx,
                    prefix_digest: Some(format!("{:x}", digest.clone().compute())),
                })?;
                batch.clear();
            }
        }

        if !batch.is_empty() {
            self.flush_batch(job_id, &batch).await?;
            self.jobs.increment_chunks(job_id, batch.len() as u64);
            checkpoint.write(&Checkpoint {
                chunks_processed: chunk_idx,
                prefix_digest: Some(format!("{:x}", digest.clone().compute())),
            })?;
        }

        checkpoint.delete()?;
        eprintln!("Job {} completed. Total chunks {}", job_id, chunk_idx);
        Ok(())
    }

    /// Embed and upsert one batch. The batch is the retry unit.
    async fn flush_batch(&self, job_id: &str, chunks: &[Chunk]) -> Result<()> {
        let embeddings = self.embed_with_retry(job_id, chunks).await?;
        let records = to_vector_records(chunks, &embeddings);
        self.store.upsert(&records).await
    }

    /// Try the primary backend up to `max_retries` times with exponential
    /// backoff, then the fallback once. The last error propagates and
    /// fails the job.
    async fn embed_with_retry(
        &self,
        job_id: &str,
        chunks: &[Chunk],
    ) -> Result<Vec<EmbeddingResult>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut delay = self.retry_delay_secs;
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            match self.embedder.embed(&texts).await {
                Ok(results) => return Ok(results),
                Err(e) => {
                    eprintln!(
                        "Embedding attempt {} failed for job {}: {}",
                        attempt + 1,
                        job_id,
                        e
                    );
                    last_error = e.to_string();
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                    delay *= self.retry_backoff;
                }
            }
        }

        eprintln!(
            "Falling back to secondary embedder for job {} after error {}",
            job_id, last_error
        );
        self.fallback.embed(&texts).await
    }
}
