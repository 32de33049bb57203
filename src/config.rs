//! Configuration management for omnivec
//!
//! Settings are loaded from a TOML file with serde defaults, so a missing or
//! partial file is fine. Secrets (API keys) are never stored in the file;
//! settings name the environment variable to read instead.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which embedding backend drives a pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible HTTP embeddings API
    #[default]
    Remote,
    /// Local candle BERT encoder
    Local,
}

impl EmbeddingProvider {
    /// The backend used when this one exhausts its retries.
    pub fn fallback(self) -> Self {
        match self {
            Self::Remote => Self::Local,
            Self::Local => Self::Remote,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

/// Which vector store backs persistence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreProvider {
    /// Embedded LanceDB (no external service)
    #[default]
    Lance,
    /// Qdrant over HTTP
    Qdrant,
    /// Chroma over HTTP
    Chroma,
}

impl StoreProvider {
    pub fn name(self) -> &'static str {
        match self {
            Self::Lance => "lance",
            Self::Qdrant => "qdrant",
            Self::Chroma => "chroma",
        }
    }
}

/// omnivec configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root for all on-disk state (checkpoints, lance data)
    pub storage_dir: PathBuf,

    // Chunking geometry
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks embedded and upserted per flush; also the retry unit
    pub chunk_batch_size: usize,

    // Embedding
    pub embedding_provider: EmbeddingProvider,
    pub embedding_max_retries: u32,
    /// Initial retry delay in seconds; multiplied by the backoff factor
    /// after each failed attempt
    pub embedding_retry_delay_secs: f64,
    pub embedding_retry_backoff: f64,

    /// Base URL of the OpenAI-compatible embeddings API
    pub remote_api_base: String,
    pub remote_model: String,
    /// Environment variable holding the remote API key
    pub remote_api_key_env: String,

    /// HuggingFace repository for the local encoder
    pub local_model_repo: String,
    pub local_model_dimensions: usize,

    // Vector store
    pub store_provider: StoreProvider,
    pub collection: String,
    pub qdrant_url: String,
    /// Environment variable holding the Qdrant API key (optional; empty
    /// value means unauthenticated)
    pub qdrant_api_key_env: String,
    pub chroma_url: String,

    // Job control
    pub ingestion_concurrency: usize,
    /// Capacity of each subscriber's update queue; overflow is dropped
    pub subscriber_queue_capacity: usize,

    /// Read size for streaming text extraction
    pub stream_read_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("storage"),
            chunk_size: 800,
            chunk_overlap: 200,
            chunk_batch_size: 32,
            embedding_provider: EmbeddingProvider::Remote,
            embedding_max_retries: 5,
            embedding_retry_delay_secs: 1.0,
            embedding_retry_backoff: 1.8,
            remote_api_base: "https://api.openai.com/v1".to_string(),
            remote_model: "text-embedding-3-large".to_string(),
            remote_api_key_env: "OPENAI_API_KEY".to_string(),
            local_model_repo: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            local_model_dimensions: 384,
            store_provider: StoreProvider::Lance,
            collection: "omnivec".to_string(),
            qdrant_url: "http://127.0.0.1:6333".to_string(),
            qdrant_api_key_env: "QDRANT_API_KEY".to_string(),
            chroma_url: "http://127.0.0.1:8000".to_string(),
            ingestion_concurrency: 2,
            subscriber_queue_capacity: 8,
            stream_read_bytes: 64 * 1024,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults when no
    /// path is given. Validates geometry and creates state dirs.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let settings = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p)?;
                toml::from_str::<Settings>(&content)
                    .map_err(|e| Error::Config(format!("failed to parse {}: {}", p.display(), e)))?
            }
            Some(p) => {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    p.display()
                )))
            }
            None => Settings::default(),
        };
        settings.validate()?;
        settings.ensure_dirs()?;
        Ok(settings)
    }

    /// Reject geometry the chunker cannot satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(
                "chunk_overlap must be smaller than chunk_size".to_string(),
            ));
        }
        if self.chunk_batch_size == 0 {
            return Err(Error::Config("chunk_batch_size must be positive".to_string()));
        }
        if self.ingestion_concurrency == 0 {
            return Err(Error::Config(
                "ingestion_concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.storage_dir)?;
        std::fs::create_dir_all(self.checkpoint_dir())?;
        if self.store_provider == StoreProvider::Lance {
            std::fs::create_dir_all(self.lance_dir())?;
        }
        Ok(())
    }

    /// Directory holding per-job checkpoint files
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.storage_dir.join("checkpoints")
    }

    /// Directory holding LanceDB data
    pub fn lance_dir(&self) -> PathBuf {
        self.storage_dir.join("lance")
    }

    /// Read a secret named by an `*_env` setting. Empty name or unset
    /// variable yields None.
    pub fn secret_from_env(var: &str) -> Option<String> {
        if var.is_empty() {
            return None;
        }
        std::env::var(var).ok().filter(|v| !v.is_empty())
    }
}
