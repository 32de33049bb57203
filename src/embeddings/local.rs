//! Local embeddings using Candle (pure Rust)
//!
//! Runs a BERT sentence encoder downloaded from HuggingFace. The encoder is
//! CPU/GPU-bound and synchronous, so the async trait impl offloads every
//! call to a blocking worker thread; the scheduler never blocks on it.
//!
//! GPU acceleration is available via feature flags:
//! - `metal` - Apple Silicon GPU (macOS)
//! - `cuda` - NVIDIA GPU

use super::{EmbeddingBackend, EmbeddingResult};
use crate::config::Settings;
use crate::error::{Error, Result};
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use std::sync::Arc;
use tokenizers::Tokenizer;

// BERT models have max 512 position embeddings - must truncate
const MAX_SEQ_LEN: usize = 512;

/// Pick the best available device: GPU when a feature is compiled in and
/// initializes, otherwise CPU.
fn resolve_device() -> Device {
    #[cfg(feature = "metal")]
    if let Ok(device) = Device::new_metal(0) {
        return device;
    }

    #[cfg(feature = "cuda")]
    if let Ok(device) = Device::new_cuda(0) {
        return device;
    }

    Device::Cpu
}

/// Synchronous candle encoder. Wrapped by [`LocalBackend`] for async use.
struct Encoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl Encoder {
    fn load(repo_id: &str) -> Result<Self> {
        let device = resolve_device();

        let api = ApiBuilder::new()
            .with_progress(false)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HuggingFace API: {e}")))?;
        let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| Error::Config(format!("failed to fetch config.json for {repo_id}: {e}")))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| Error::Config(format!("failed to fetch tokenizer.json for {repo_id}: {e}")))?;
        let weights_path = repo.get("model.safetensors").map_err(|e| {
            Error::Config(format!("failed to fetch model.safetensors for {repo_id}: {e}"))
        })?;

        let config_str = std::fs::read_to_string(&config_path)?;
        let bert_config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| Error::Config(format!("invalid model config for {repo_id}: {e}")))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Config(format!("failed to load tokenizer: {e}")))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .map_err(|e| Error::Config(format!("failed to map model weights: {e}")))?
        };
        let model = BertModel::load(vb, &bert_config)
            .map_err(|e| Error::Config(format!("failed to load model: {e}")))?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Encode a batch: tokenize, truncate, pad, forward, mean-pool over the
    /// attention mask, L2-normalize.
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let tokens = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| Error::Embedding(format!("tokenization failed: {e}")))?;

        let max_len = tokens
            .iter()
            .map(|t| t.get_ids().len().min(MAX_SEQ_LEN))
            .max()
            .unwrap_or(0);

        let mut input_ids_vec = Vec::new();
        let mut attention_mask_vec = Vec::new();
        let mut token_type_ids_vec = Vec::new();

        for encoding in &tokens {
            let ids: Vec<u32> = encoding.get_ids().iter().take(MAX_SEQ_LEN).copied().collect();
            let mask: Vec<u32> = encoding
                .get_attention_mask()
                .iter()
                .take(MAX_SEQ_LEN)
                .copied()
                .collect();

            let mut padded_ids = ids.clone();
            let mut padded_mask = mask;
            let mut padded_types = vec![0u32; ids.len()];

            padded_ids.resize(max_len, 0);
            padded_mask.resize(max_len, 0);
            padded_types.resize(max_len, 0);

            input_ids_vec.extend(padded_ids);
            attention_mask_vec.extend(padded_mask);
            token_type_ids_vec.extend(padded_types);
        }

        let batch_size = texts.len();
        let run = || -> candle_core::Result<Vec<Vec<f32>>> {
            let input_ids = Tensor::from_vec(input_ids_vec, (batch_size, max_len), &self.device)?;
            let attention_mask =
                Tensor::from_vec(attention_mask_vec, (batch_size, max_len), &self.device)?;
            let token_type_ids =
                Tensor::from_vec(token_type_ids_vec, (batch_size, max_len), &self.device)?;

            let embeddings =
                self.model
                    .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

            // Mean pooling over the sequence dimension
            let attention_mask_f = attention_mask.to_dtype(DTYPE)?;
            let mask_expanded = attention_mask_f.unsqueeze(2)?.broadcast_as(embeddings.shape())?;

            let sum_embeddings = (embeddings * mask_expanded)?.sum(1)?;
            let sum_mask = attention_mask_f.sum(1)?.unsqueeze(1)?;
            // recip + mul instead of broadcast_div (more stable on Metal GPU)
            let mean_embeddings = sum_embeddings.broadcast_mul(&sum_mask.recip()?)?;

            // Normalize
            let norms = mean_embeddings.sqr()?.sum(1)?.sqrt()?.unsqueeze(1)?;
            let normalized = mean_embeddings.broadcast_mul(&norms.recip()?)?;

            normalized.to_vec2()
        };

        run().map_err(|e| Error::Embedding(format!("encoder forward pass failed: {e}")))
    }
}

/// Local embedding backend. The encoder is shared behind an `Arc` so each
/// call can move a handle onto a blocking worker thread.
pub struct LocalBackend {
    encoder: Arc<Encoder>,
    model: String,
}

impl LocalBackend {
    pub fn new(repo_id: &str) -> Result<Self> {
        Ok(Self {
            encoder: Arc::new(Encoder::load(repo_id)?),
            model: repo_id.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.local_model_repo)
    }
}

#[async_trait]
impl EmbeddingBackend for LocalBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        let encoder = Arc::clone(&self.encoder);
        let owned = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || encoder.encode_batch(&owned))
            .await
            .map_err(|e| Error::Embedding(format!("encoder task panicked: {e}")))??;

        Ok(vectors
            .into_iter()
            .map(|vector| EmbeddingResult {
                vector,
                model: self.model.clone(),
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
