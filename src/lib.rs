//! omnivec - Universal document vectorizer
//!
//! Streaming ingestion pipeline that turns heterogeneous sources (text,
//! PDFs, tabular files, JSON, URLs) into overlapping chunks, embeds them
//! via a pluggable backend, and persists `(id, vector, metadata)` records
//! in a pluggable vector store. A symmetric query path embeds a query and
//! retrieves nearest neighbors.
//!
//! Architecture:
//! - extract: suffix-keyed extractors producing lazy fragment streams
//! - clean + chunker: whitespace normalization, fixed overlapping windows
//! - embeddings: remote HTTP API or local candle encoder, with failover
//! - store: LanceDB (embedded), Qdrant, or Chroma
//! - checkpoint + jobs + service: chunk-granular resume, job tracking with
//!   lossy subscriber fan-out, global concurrency cap

pub mod app;
pub mod checkpoint;
pub mod chunker;
pub mod clean;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod pipeline;
pub mod search;
pub mod server;
pub mod service;
pub mod store;
pub mod types;

pub use app::App;
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use chunker::{Chunk, ChunkStream, HybridChunker};
pub use clean::TextCleaner;
pub use config::{EmbeddingProvider, Settings, StoreProvider};
pub use embeddings::{EmbeddingBackend, EmbeddingResult, LocalBackend, RemoteBackend};
pub use error::{Error, Result};
pub use extract::{ExtractedStream, Extractor, ExtractorRegistry, UrlExtractor};
pub use jobs::{JobKind, JobManager, JobState, JobStatus, Subscription};
pub use pipeline::IngestionPipeline;
pub use search::SearchService;
pub use server::run_server;
pub use service::IngestionService;
pub use store::{ChromaStore, LanceStore, QdrantStore, QueryMatch, VectorRecord, VectorStore};
pub use types::*;
