//! Integration tests for omnivec
//!
//! Exercise the pipeline, service, and search path end-to-end against
//! in-memory mock backends: resume after a partial run, retry + failover,
//! unsupported sources, idempotent re-ingest, and subscriber fan-out.

use async_trait::async_trait;
use omnivec::{
    Checkpoint, CheckpointStore, EmbeddingBackend, EmbeddingResult, Error, IngestionPipeline,
    IngestionService, JobManager, JobState, QueryMatch, SearchService, Settings, VectorRecord,
    VectorStore,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

// ============================================================
// Mock backends
// ============================================================

/// Embedding backend returning fixed-size vectors; can be told to fail
/// every call.
struct MockBackend {
    model: String,
    dimensions: usize,
    always_fail: bool,
    calls: AtomicUsize,
}

impl MockBackend {
    fn new(model: &str) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
            dimensions: 4,
            always_fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(model: &str) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
            dimensions: 4,
            always_fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for MockBackend {
    async fn embed(&self, texts: &[String]) -> omnivec::Result<Vec<EmbeddingResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            return Err(Error::Embedding("mock backend down".to_string()));
        }
        Ok(texts
            .iter()
            .map(|text| EmbeddingResult {
                vector: vec![text.len() as f32; self.dimensions],
                model: self.model.clone(),
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// In-memory vector store tracking per-id upsert counts; can be told to
/// fail the nth upsert call to simulate a crash mid-job.
#[derive(Default)]
struct MemoryStore {
    records: Mutex<HashMap<String, VectorRecord>>,
    upsert_counts: Mutex<HashMap<String, usize>>,
    upsert_calls: AtomicUsize,
    fail_on_call: Mutex<Option<usize>>,
}

impl MemoryStore {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn fail_on_upsert_call(&self, n: usize) {
        *self.fail_on_call.lock().unwrap() = Some(n);
    }

    fn heal(&self) {
        *self.fail_on_call.lock().unwrap() = None;
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn upsert_count(&self, id: &str) -> usize {
        *self.upsert_counts.lock().unwrap().get(id).unwrap_or(&0)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, records: &[VectorRecord]) -> omnivec::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_on_call.lock().unwrap() == Some(call) {
            return Err(Error::VectorStore("mock store write failed".to_string()));
        }
        let mut stored = self.records.lock().unwrap();
        let mut counts = self.upsert_counts.lock().unwrap();
        for record in records {
            stored.insert(record.id.clone(), record.clone());
            *counts.entry(record.id.clone()).or_insert(0) += 1;
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filters: Option<&HashMap<String, String>>,
    ) -> omnivec::Result<Vec<QueryMatch>> {
        let stored = self.records.lock().unwrap();
        let mut matches: Vec<QueryMatch> = stored
            .values()
            .filter(|record| match filters {
                None => true,
                Some(filters) => filters.iter().all(|(key, expected)| {
                    record
                        .metadata
                        .get(key)
                        .and_then(|v| v.as_str())
                        .map(|v| v == expected)
                        .unwrap_or(false)
                }),
            })
            .map(|record| {
                let score: f32 = record
                    .embedding
                    .iter()
                    .zip(vector.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                QueryMatch {
                    id: record.id.clone(),
                    score,
                    text: record
                        .metadata
                        .get("text")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    metadata: record.metadata.clone(),
                }
            })
            .collect();
        matches.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> omnivec::Result<()> {
        let mut stored = self.records.lock().unwrap();
        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }
}

// ============================================================
// Harness
// ============================================================

struct Harness {
    settings: Settings,
    jobs: Arc<JobManager>,
    pipeline: Arc<IngestionPipeline>,
    service: IngestionService,
    store: Arc<MemoryStore>,
    primary: Arc<MockBackend>,
    fallback: Arc<MockBackend>,
}

fn test_settings(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.storage_dir = root.join("storage");
    settings.chunk_size = 10;
    settings.chunk_overlap = 0;
    settings.chunk_batch_size = 2;
    settings.embedding_max_retries = 5;
    settings.embedding_retry_delay_secs = 0.0;
    settings.subscriber_queue_capacity = 64;
    settings
}

fn build_harness(
    settings: Settings,
    primary: Arc<MockBackend>,
    fallback: Arc<MockBackend>,
) -> Harness {
    let store = MemoryStore::new();
    let jobs = Arc::new(JobManager::new(settings.subscriber_queue_capacity));
    let pipeline = Arc::new(
        IngestionPipeline::new(
            &settings,
            primary.clone() as Arc<dyn EmbeddingBackend>,
            fallback.clone() as Arc<dyn EmbeddingBackend>,
            store.clone() as Arc<dyn VectorStore>,
            jobs.clone(),
        )
        .unwrap(),
    );
    let service = IngestionService::new(
        settings.ingestion_concurrency,
        pipeline.clone(),
        jobs.clone(),
    );
    Harness {
        settings,
        jobs,
        pipeline,
        service,
        store,
        primary,
        fallback,
    }
}

/// Five chunks at chunk_size=10, overlap=0: four full windows plus a
/// three-character tail.
const FIVE_CHUNK_BODY: &str = "aaaaaaaaaabbbbbbbbbbccccccccccddddddddddeee";

fn write_doc(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

async fn wait_terminal(jobs: &JobManager, job_id: &str) -> omnivec::JobStatus {
    for _ in 0..500 {
        if let Some(status) = jobs.get(job_id) {
            if status.state.is_terminal() {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}

// ============================================================
// End-to-end scenarios
// ============================================================

#[tokio::test]
async fn test_file_ingest_completes_and_clears_checkpoint() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::new("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.txt", FIVE_CHUNK_BODY);

    let job_id = harness.service.ingest_file(path.clone(), HashMap::new());
    let status = wait_terminal(&harness.jobs, &job_id).await;

    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.processed_chunks, 5);
    assert_eq!(status.last_message.as_deref(), Some("Ingestion complete"));

    // One record per chunk, ids derived from the source path.
    let ids = harness.store.ids();
    assert_eq!(ids.len(), 5);
    for i in 0..5 {
        let expected = format!("{}-chunk-{}", path.display(), i);
        assert!(ids.contains(&expected), "missing {expected}");
    }

    // Records carry text, model tag, and document metadata.
    let records = harness.store.records.lock().unwrap();
    let first = records.get(&format!("{}-chunk-0", path.display())).unwrap();
    assert_eq!(first.metadata.get("text").unwrap(), "aaaaaaaaaa");
    assert_eq!(first.metadata.get("embedding_model").unwrap(), "primary-model");
    assert_eq!(first.metadata.get("type").unwrap(), "text");
    drop(records);

    // Invariant: success removes the checkpoint file.
    let checkpoint = CheckpointStore::new(&harness.settings.checkpoint_dir(), &job_id);
    assert!(!checkpoint.exists());
}

#[tokio::test]
async fn test_empty_input_succeeds_with_zero_chunks() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::new("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "empty.txt", "");

    let job_id = harness.service.ingest_file(path, HashMap::new());
    let status = wait_terminal(&harness.jobs, &job_id).await;

    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.processed_chunks, 0);
    assert!(harness.store.ids().is_empty());
    assert_eq!(harness.primary.call_count(), 0);
}

#[tokio::test]
async fn test_caller_metadata_overrides_extractor_keys() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::new("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.txt", "short doc");

    let mut metadata = HashMap::new();
    metadata.insert("type".to_string(), "override".to_string());
    metadata.insert("team".to_string(), "ml".to_string());

    let job_id = harness.service.ingest_file(path, metadata);
    let status = wait_terminal(&harness.jobs, &job_id).await;
    assert_eq!(status.state, JobState::Completed);

    let records = harness.store.records.lock().unwrap();
    let record = records.values().next().unwrap();
    assert_eq!(record.metadata.get("type").unwrap(), "override");
    assert_eq!(record.metadata.get("team").unwrap(), "ml");
}

#[tokio::test]
async fn test_resume_after_partial_run_skips_flushed_prefix() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::new("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.txt", FIVE_CHUNK_BODY);

    // First run: the second store write (chunks 2,3) fails after chunks
    // 0,1 flushed, leaving a checkpoint at 2.
    harness.store.fail_on_upsert_call(2);
    let metadata = HashMap::new();
    let err = harness
        .pipeline
        .ingest_file("job-resume", &path, &metadata)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VectorStore(_)));

    let checkpoint = CheckpointStore::new(&harness.settings.checkpoint_dir(), "job-resume");
    assert_eq!(checkpoint.load().unwrap().unwrap().chunks_processed, 2);
    assert_eq!(harness.store.ids().len(), 2);

    // Second run with the same job id resumes at chunk 2.
    harness.store.heal();
    harness
        .pipeline
        .ingest_file("job-resume", &path, &metadata)
        .await
        .unwrap();

    let ids = harness.store.ids();
    assert_eq!(ids.len(), 5);
    for i in 0..5 {
        let id = format!("{}-chunk-{}", path.display(), i);
        let count = harness.store.upsert_count(&id);
        assert!(
            count >= 1 && count <= 2,
            "chunk {i} upserted {count} times"
        );
    }
    // The already-flushed prefix is skipped, not re-embedded.
    assert_eq!(harness.store.upsert_count(&format!("{}-chunk-0", path.display())), 1);
    assert_eq!(harness.store.upsert_count(&format!("{}-chunk-4", path.display())), 1);
    assert!(!checkpoint.exists());
}

#[tokio::test]
async fn test_resume_drift_is_a_checkpoint_error() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::new("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.txt", FIVE_CHUNK_BODY);

    let checkpoint = CheckpointStore::new(&harness.settings.checkpoint_dir(), "job-drift");
    checkpoint
        .write(&Checkpoint {
            chunks_processed: 2,
            prefix_digest: Some("0000000000000000".to_string()),
        })
        .unwrap();

    let err = harness
        .pipeline
        .ingest_file("job-drift", &path, &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Checkpoint(_)));
    // Progress is retained for inspection, not discarded.
    assert!(checkpoint.exists());
}

#[tokio::test]
async fn test_primary_retries_then_fallback_embeds() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::failing("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.txt", FIVE_CHUNK_BODY);

    let job_id = harness.service.ingest_file(path.clone(), HashMap::new());
    let status = wait_terminal(&harness.jobs, &job_id).await;

    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.processed_chunks, 5);

    // 5 chunks at batch size 2 means 3 flushes: each tries the primary
    // max_retries times and the fallback once.
    assert_eq!(harness.primary.call_count(), 15);
    assert_eq!(harness.fallback.call_count(), 3);

    let records = harness.store.records.lock().unwrap();
    for record in records.values() {
        assert_eq!(record.metadata.get("embedding_model").unwrap(), "fallback-model");
    }
}

#[tokio::test]
async fn test_both_backends_down_fails_job_and_keeps_checkpoint_absent() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::failing("primary-model"),
        MockBackend::failing("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.txt", FIVE_CHUNK_BODY);

    let job_id = harness.service.ingest_file(path, HashMap::new());
    let status = wait_terminal(&harness.jobs, &job_id).await;

    assert_eq!(status.state, JobState::Failed);
    assert!(!status.errors.is_empty());
    assert!(harness.store.ids().is_empty());

    // No batch ever flushed, so no checkpoint was written.
    let checkpoint = CheckpointStore::new(&harness.settings.checkpoint_dir(), &job_id);
    assert!(!checkpoint.exists());
}

#[tokio::test]
async fn test_unsupported_suffix_fails_without_checkpoint() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::new("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.xyz", "whatever");

    let job_id = harness.service.ingest_file(path, HashMap::new());
    let status = wait_terminal(&harness.jobs, &job_id).await;

    assert_eq!(status.state, JobState::Failed);
    assert!(
        status.errors.iter().any(|e| e.contains(".xyz")),
        "error should mention the suffix: {:?}",
        status.errors
    );

    let checkpoint = CheckpointStore::new(&harness.settings.checkpoint_dir(), &job_id);
    assert!(!checkpoint.exists());
    assert!(harness.store.ids().is_empty());
}

#[tokio::test]
async fn test_reingest_same_file_keeps_one_record_per_chunk() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::new("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.txt", FIVE_CHUNK_BODY);

    let first = harness.service.ingest_file(path.clone(), HashMap::new());
    wait_terminal(&harness.jobs, &first).await;
    let second = harness.service.ingest_file(path.clone(), HashMap::new());
    wait_terminal(&harness.jobs, &second).await;

    // Upsert semantics: same ids, written twice, stored once.
    let ids = harness.store.ids();
    assert_eq!(ids.len(), 5);
    for id in &ids {
        assert_eq!(harness.store.upsert_count(id), 2);
    }
}

#[tokio::test]
async fn test_progress_updates_are_monotonic() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::new("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.txt", FIVE_CHUNK_BODY);

    let job_id = harness.service.ingest_file(path, HashMap::new());
    let mut subscription = harness.service.subscribe(&job_id);
    wait_terminal(&harness.jobs, &job_id).await;

    let mut snapshots = Vec::new();
    while let Ok(status) = subscription.rx.try_recv() {
        snapshots.push(status);
    }
    harness.service.unsubscribe(&subscription);

    assert!(!snapshots.is_empty());
    for pair in snapshots.windows(2) {
        assert!(pair[1].processed_chunks >= pair[0].processed_chunks);
    }
}

#[tokio::test]
async fn test_jobs_listing_includes_submitted_jobs() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::new("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.txt", "hello world");

    let a = harness.service.ingest_file(path.clone(), HashMap::new());
    let b = harness.service.ingest_file(path, HashMap::new());
    wait_terminal(&harness.jobs, &a).await;
    wait_terminal(&harness.jobs, &b).await;

    let listed = harness.service.list_jobs();
    assert_eq!(listed.len(), 2);
    let ids: Vec<&str> = listed.iter().map(|j| j.job_id.as_str()).collect();
    assert!(ids.contains(&a.as_str()));
    assert!(ids.contains(&b.as_str()));
}

// ============================================================
// Search path
// ============================================================

#[tokio::test]
async fn test_search_applies_offset_and_filters() {
    let dir = tempdir().unwrap();
    let harness = build_harness(
        test_settings(dir.path()),
        MockBackend::new("primary-model"),
        MockBackend::new("fallback-model"),
    );
    let path = write_doc(dir.path(), "doc.txt", FIVE_CHUNK_BODY);

    let job_id = harness.service.ingest_file(path, HashMap::new());
    wait_terminal(&harness.jobs, &job_id).await;

    let search = SearchService::new(
        harness.primary.clone() as Arc<dyn EmbeddingBackend>,
        harness.store.clone() as Arc<dyn VectorStore>,
    );

    let all = search.search("query text", 10, 0, None).await.unwrap();
    assert_eq!(all.len(), 5);

    let offset = search.search("query text", 2, 1, None).await.unwrap();
    assert_eq!(offset.len(), 2);
    assert_eq!(offset[0].id, all[1].id);

    let mut filters = HashMap::new();
    filters.insert("type".to_string(), "text".to_string());
    let filtered = search.search("query text", 10, 0, Some(&filters)).await.unwrap();
    assert_eq!(filtered.len(), 5);

    filters.insert("type".to_string(), "pdf".to_string());
    let none = search.search("query text", 10, 0, Some(&filters)).await.unwrap();
    assert!(none.is_empty());
}
