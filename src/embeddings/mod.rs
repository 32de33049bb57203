//! Pluggable embedding backends.
//!
//! Two implementations: an OpenAI-compatible HTTP API and a local candle
//! BERT encoder. The pipeline drives retry and failover; backends are
//! stateless with respect to retry and every failure maps to a single
//! error kind so all of them are treated as retryable.

mod local;
mod remote;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

use crate::config::{EmbeddingProvider, Settings};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// One embedded text: the vector plus the model tag that produced it.
/// All results from a single call share identical dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub vector: Vec<f32>,
    pub model: String,
}

/// Vectorize a batch of strings. Output length equals input length, in
/// input order.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>>;

    /// Opaque model tag stored in each record's metadata.
    fn model_name(&self) -> &str;
}

/// Build the backend selected by `provider`. The composition root calls
/// this twice: once for the configured primary and once for its fallback.
pub fn create_backend(
    settings: &Settings,
    provider: EmbeddingProvider,
) -> Result<Arc<dyn EmbeddingBackend>> {
    match provider {
        EmbeddingProvider::Remote => Ok(Arc::new(RemoteBackend::from_settings(settings)?)),
        EmbeddingProvider::Local => Ok(Arc::new(LocalBackend::from_settings(settings)?)),
    }
}
