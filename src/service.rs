//! Ingestion service: job admission, concurrency cap, task spawning.
//!
//! The only layer that catches errors. Each submission returns a job id
//! immediately; the pipeline runs in a detached task gated by a global
//! semaphore, and the task wrapper records the outcome on the job.

use crate::jobs::{JobKind, JobManager, JobStatus, Subscription};
use crate::pipeline::IngestionPipeline;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

enum JobInput {
    File(PathBuf),
    Url(String),
}

pub struct IngestionService {
    jobs: Arc<JobManager>,
    pipeline: Arc<IngestionPipeline>,
    semaphore: Arc<Semaphore>,
}

impl IngestionService {
    pub fn new(
        concurrency: usize,
        pipeline: Arc<IngestionPipeline>,
        jobs: Arc<JobManager>,
    ) -> Self {
        Self {
            jobs,
            pipeline,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Queue a file ingest; returns the new job id immediately.
    pub fn ingest_file(&self, path: PathBuf, metadata: HashMap<String, String>) -> String {
        let source = path.display().to_string();
        self.spawn_job(JobKind::File, &source, JobInput::File(path), metadata)
    }

    /// Queue a URL ingest; returns the new job id immediately.
    pub fn ingest_url(&self, url: &str, metadata: HashMap<String, String>) -> String {
        self.spawn_job(JobKind::Url, url, JobInput::Url(url.to_string()), metadata)
    }

    pub fn list_jobs(&self) -> Vec<JobStatus> {
        self.jobs.list_jobs()
    }

    pub fn get_job(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.get(job_id)
    }

    pub fn subscribe(&self, job_id: &str) -> Subscription {
        self.jobs.subscribe(job_id)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.jobs.unsubscribe(subscription)
    }

    fn spawn_job(
        &self,
        kind: JobKind,
        source: &str,
        input: JobInput,
        metadata: HashMap<String, String>,
    ) -> String {
        let job_id = uuid::Uuid::new_v4().simple().to_string();
        self.jobs.create_job(&job_id, kind, source);

        let jobs = Arc::clone(&self.jobs);
        let pipeline = Arc::clone(&self.pipeline);
        let semaphore = Arc::clone(&self.semaphore);
        let id = job_id.clone();

        tokio::spawn(async move {
            // The semaphore is never closed; jobs queue here until a
            // running pipeline finishes.
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            jobs.set_processing(&id, "Starting ingestion");

            let result = match input {
                JobInput::File(path) => pipeline.ingest_file(&id, &path, &metadata).await,
                JobInput::Url(url) => pipeline.ingest_url(&id, &url, &metadata).await,
            };

            match result {
                Ok(()) => {
                    jobs.succeed(&id, "Ingestion complete");
                }
                Err(e) => {
                    eprintln!("Job {} failed: {}", id, e);
                    jobs.fail(&id, &e.to_string());
                }
            }
        });

        job_id
    }
}
