use crate::jobs::JobStatus;
use crate::store::QueryMatch;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// API ingest request: either a previously stored file path or a URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    /// Caller-supplied metadata; overrides extractor keys on collision
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// API ingest response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub job_id: String,
}

/// API search request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub offset: usize,
    /// Flat key -> value equality conjunction
    #[serde(default)]
    pub filters: Option<HashMap<String, String>>,
}

fn default_top_k() -> usize {
    5
}

/// API search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub matches: Vec<QueryMatch>,
}

/// API job listing response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobStatus>,
}
