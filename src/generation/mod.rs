//! Abstractions for stateless text generation.
//!
//! Every call is self-contained: no conversation state is kept between prompts, which is what
//! lets each cluster's synthesis see only that cluster's articles. The Ollama adapter mirrors
//! the embedding adapter by issuing HTTP requests directly to the runtime; the OpenAI adapter
//! targets any chat-completions compatible endpoint.

use crate::config::{Config, GenerationProvider};
use crate::metrics::PipelineMetrics;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while attempting text generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider was unreachable or misconfigured.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate text: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by text-generation providers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a single, fully self-contained prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Build a text generator for the configured provider.
pub fn build_text_generator(config: &Config) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    let generator: Arc<dyn TextGenerator> = match config.generation_provider {
        GenerationProvider::Ollama => Arc::new(OllamaGenerator::new(
            config.ollama_url.clone(),
            config.generation_model.clone(),
        )?),
        GenerationProvider::OpenAI => Arc::new(OpenAiGenerator::new(
            config.openai_base_url.clone(),
            config.generation_model.clone(),
            config.openai_api_key.clone(),
        )?),
    };
    Ok(generator)
}

fn http_client() -> Result<Client, GenerationError> {
    Client::builder()
        .user_agent("topic-digest/generation")
        .build()
        .map_err(|error| {
            GenerationError::ProviderUnavailable(format!(
                "failed to construct HTTP client: {error}"
            ))
        })
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GenerationError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(GenerationError::ProviderUnavailable(format!(
            "endpoint {} returned 404",
            response.url()
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::GenerationFailed(format!(
            "provider returned {status}: {body}"
        )));
    }
    Ok(response)
}

/// Generator backed by the Ollama `/api/generate` endpoint.
pub struct OllamaGenerator {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    /// Create a generator targeting the given Ollama base URL and model.
    pub fn new(base_url: String, model: String) -> Result<Self, GenerationError> {
        Ok(Self {
            http: http_client()?,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": 0.3,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        let body: OllamaResponse = check_status(response).await?.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

/// Generator for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiGenerator {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiGenerator {
    /// Create a generator targeting the given API base URL and model.
    pub fn new(
        base_url: String,
        model: String,
        api_key: Option<String>,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            http: http_client()?,
            base_url,
            model,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.3,
        });

        let mut request = self.http.post(self.endpoint()).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|error| {
            GenerationError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;

        let body: ChatResponse = check_status(response).await?.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode chat response: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| GenerationError::InvalidResponse("response had no content".into()))
    }
}

/// Decorator that records every call in [`PipelineMetrics`].
pub struct MeteredGenerator {
    inner: Arc<dyn TextGenerator>,
    metrics: Arc<PipelineMetrics>,
}

impl MeteredGenerator {
    /// Wrap a generator so its calls and failures are counted.
    pub fn new(inner: Arc<dyn TextGenerator>, metrics: Arc<PipelineMetrics>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl TextGenerator for MeteredGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let result = self.inner.generate(prompt).await;
        self.metrics.record_generation_call(result.is_ok());
        result
    }
}
