//! Embedding client abstraction, HTTP adapters, and the batching article embedder.

mod batch;

pub use batch::{ArticleEmbedder, EmbedOutcome, EmbedderSettings, EmbeddingError, embedding_input};

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached or is misconfigured.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
///
/// Implementations must return exactly one vector per input text, in input order.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build an embedding client for the configured provider.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    let client: Arc<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
        )?),
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient::new(
            config.openai_base_url.clone(),
            config.embedding_model.clone(),
            config.openai_api_key.clone(),
        )?),
    };
    Ok(client)
}

fn http_client() -> Result<Client, EmbeddingClientError> {
    Client::builder()
        .user_agent("topic-digest/embedding")
        .build()
        .map_err(|error| {
            EmbeddingClientError::ProviderUnavailable(format!(
                "failed to construct HTTP client: {error}"
            ))
        })
}

async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, EmbeddingClientError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(EmbeddingClientError::ProviderUnavailable(format!(
            "endpoint {} returned 404",
            response.url()
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingClientError::GenerationFailed(format!(
            "provider returned {status}: {body}"
        )));
    }
    Ok(response)
}

/// Embedding client backed by the Ollama `/api/embed` endpoint.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Create a client targeting the given Ollama base URL and model.
    pub fn new(base_url: String, model: String) -> Result<Self, EmbeddingClientError> {
        Ok(Self {
            http: http_client()?,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        tracing::debug!(model = %self.model, inputs = texts.len(), "Requesting Ollama embeddings");
        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        let body: OllamaEmbedResponse =
            check_status(response).await?.json().await.map_err(|error| {
                EmbeddingClientError::InvalidResponse(format!(
                    "failed to decode Ollama response: {error}"
                ))
            })?;

        Ok(body.embeddings)
    }
}

/// Embedding client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiEmbeddingClient {
    /// Create a client targeting the given API base URL and model.
    pub fn new(
        base_url: String,
        model: String,
        api_key: Option<String>,
    ) -> Result<Self, EmbeddingClientError> {
        Ok(Self {
            http: http_client()?,
            base_url,
            model,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        tracing::debug!(model = %self.model, inputs = texts.len(), "Requesting OpenAI embeddings");
        let mut request = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|error| {
            EmbeddingClientError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        let mut body: OpenAiEmbedResponse =
            check_status(response).await?.json().await.map_err(|error| {
                EmbeddingClientError::InvalidResponse(format!(
                    "failed to decode embeddings response: {error}"
                ))
            })?;

        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }
}
