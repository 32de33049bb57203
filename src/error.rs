//! Crate-wide error type.
//!
//! Every layer below the ingestion service propagates; the service's task
//! wrapper is the only place errors are caught and recorded on a job.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration: bad chunk geometry, missing credential,
    /// unknown provider. Fatal at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// No extractor registered for the source's suffix.
    #[error("no extractor registered for suffix: {0}")]
    UnsupportedSource(String),

    /// An extractor failed while producing fragments.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// An embedding backend failed. Retried by the pipeline.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// A vector store call failed. Not retried; fails the job.
    #[error("vector store error: {0}")]
    VectorStore(String),

    /// Corrupt or unreadable checkpoint. Fails the job rather than
    /// silently discarding progress.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = Error::UnsupportedSource(".xyz".to_string());
        assert!(err.to_string().contains(".xyz"));

        let err = Error::Config("chunk_overlap must be smaller than chunk_size".to_string());
        assert!(err.to_string().starts_with("configuration error"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
