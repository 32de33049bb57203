//! OpenAI-compatible HTTP embedding backend.

use super::{EmbeddingBackend, EmbeddingResult};
use crate::config::Settings;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    data: Vec<ApiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

/// Sends the whole batch in a single `POST {api_base}/embeddings` request.
pub struct RemoteBackend {
    client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl RemoteBackend {
    pub fn new(api_base: &str, model: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = Settings::secret_from_env(&settings.remote_api_key_env).ok_or_else(|| {
            Error::Config(format!(
                "remote embedding API key missing: set {}",
                settings.remote_api_key_env
            ))
        })?;
        Ok(Self::new(
            &settings.remote_api_base,
            &settings.remote_model,
            &api_key,
        ))
    }
}

#[async_trait]
impl EmbeddingBackend for RemoteBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({ "input": texts, "model": self.model }))
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("embeddings request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "embeddings API returned {status}: {body}"
            )));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("invalid embeddings response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "embeddings API returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        // The API reports an index per item; restore input order.
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data
            .into_iter()
            .map(|d| EmbeddingResult {
                vector: d.embedding,
                model: self.model.clone(),
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
