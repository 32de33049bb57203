//! Job lifecycle tracking, progress counters, and subscriber fan-out.
//!
//! State is in-memory only and lives for the process lifetime; checkpoints
//! are the only persistent job artifact. Every mutation bumps `updated_at`
//! and fans a snapshot out to subscribers. Delivery is lossy: each
//! subscriber is a bounded queue and a full queue drops the notification,
//! so producers never block. The latest state is always recoverable by
//! polling `get`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// RFC 3339 UTC timestamp with microsecond precision
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// What kind of source a job ingests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    File,
    Url,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::File => write!(f, "file"),
            JobKind::Url => write!(f, "url"),
        }
    }
}

/// Job lifecycle state. Transitions only ever move forward:
/// pending -> processing -> completed | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Processing => write!(f, "processing"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            _ => Err(format!("Unknown state: {}", s)),
        }
    }
}

/// Snapshot of one ingestion job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub kind: JobKind,
    pub source: String,
    pub state: JobState,
    pub created_at: String,
    pub updated_at: String,
    pub processed_chunks: u64,
    pub total_chunks: Option<u64>,
    pub last_message: Option<String>,
    pub errors: Vec<String>,
}

impl JobStatus {
    fn new(job_id: String, kind: JobKind, source: String) -> Self {
        let now = now_iso();
        Self {
            job_id,
            kind,
            source,
            state: JobState::Pending,
            created_at: now.clone(),
            updated_at: now,
            processed_chunks: 0,
            total_chunks: None,
            last_message: None,
            errors: Vec::new(),
        }
    }
}

struct Watcher {
    id: u64,
    tx: mpsc::Sender<JobStatus>,
}

/// A subscriber's end of the update queue. Hold the receiver and pass the
/// whole subscription back to `unsubscribe` when done.
pub struct Subscription {
    pub job_id: String,
    id: u64,
    pub rx: mpsc::Receiver<JobStatus>,
}

#[derive(Default)]
struct ManagerState {
    jobs: HashMap<String, JobStatus>,
    watchers: HashMap<String, Vec<Watcher>>,
    next_watcher_id: u64,
}

/// Tracks ingestion jobs and multiplexes live updates to subscribers.
pub struct JobManager {
    queue_capacity: usize,
    state: Mutex<ManagerState>,
}

impl JobManager {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn create_job(&self, job_id: &str, kind: JobKind, source: &str) -> JobStatus {
        let mut state = self.state.lock().unwrap();
        let status = JobStatus::new(job_id.to_string(), kind, source.to_string());
        state.jobs.insert(job_id.to_string(), status.clone());
        Self::notify(&mut state, job_id);
        status
    }

    pub fn set_processing(&self, job_id: &str, message: &str) -> Option<JobStatus> {
        self.mutate(job_id, |status| {
            status.state = JobState::Processing;
            status.last_message = Some(message.to_string());
        })
    }

    pub fn increment_chunks(&self, job_id: &str, count: u64) -> Option<JobStatus> {
        self.mutate(job_id, |status| {
            status.processed_chunks += count;
        })
    }

    pub fn succeed(&self, job_id: &str, message: &str) -> Option<JobStatus> {
        self.mutate(job_id, |status| {
            status.state = JobState::Completed;
            status.last_message = Some(message.to_string());
        })
    }

    pub fn fail(&self, job_id: &str, error: &str) -> Option<JobStatus> {
        self.mutate(job_id, |status| {
            status.state = JobState::Failed;
            status.errors.push(error.to_string());
            status.last_message = Some(error.to_string());
        })
    }

    pub fn get(&self, job_id: &str) -> Option<JobStatus> {
        self.state.lock().unwrap().jobs.get(job_id).cloned()
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> Vec<JobStatus> {
        let state = self.state.lock().unwrap();
        let mut jobs: Vec<JobStatus> = state.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Open a bounded update queue for a job. The current snapshot is
    /// delivered immediately when the job exists.
    pub fn subscribe(&self, job_id: &str) -> Subscription {
        let mut state = self.state.lock().unwrap();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        if let Some(status) = state.jobs.get(job_id) {
            let _ = tx.try_send(status.clone());
        }
        let id = state.next_watcher_id;
        state.next_watcher_id += 1;
        state
            .watchers
            .entry(job_id.to_string())
            .or_default()
            .push(Watcher { id, tx });
        Subscription {
            job_id: job_id.to_string(),
            id,
            rx,
        }
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut state = self.state.lock().unwrap();
        if let Some(watchers) = state.watchers.get_mut(&subscription.job_id) {
            watchers.retain(|w| w.id != subscription.id);
            if watchers.is_empty() {
                state.watchers.remove(&subscription.job_id);
            }
        }
    }

    fn mutate<F>(&self, job_id: &str, apply: F) -> Option<JobStatus>
    where
        F: FnOnce(&mut JobStatus),
    {
        let mut state = self.state.lock().unwrap();
        let status = state.jobs.get_mut(job_id)?;
        apply(status);
        status.updated_at = now_iso();
        let snapshot = status.clone();
        Self::notify(&mut state, job_id);
        Some(snapshot)
    }

    /// Fan the current snapshot out to every watcher; a full queue drops
    /// the notification for that watcher only.
    fn notify(state: &mut ManagerState, job_id: &str) {
        let Some(status) = state.jobs.get(job_id) else {
            return;
        };
        if let Some(watchers) = state.watchers.get(job_id) {
            for watcher in watchers {
                let _ = watcher.tx.try_send(status.clone());
            }
        }
    }
}
