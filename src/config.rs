use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::embedding::EmbedderSettings;
use crate::pipeline::PipelineSettings;
use crate::retry::RetryPolicy;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was initialized twice.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the digest pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Embedding backend used to vectorize articles.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Expected dimensionality of produced vectors, when known.
    pub embedding_dimension: Option<usize>,
    /// Text-generation backend used for curation and selection.
    pub generation_provider: GenerationProvider,
    /// Generation model identifier passed to the provider.
    pub generation_model: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Optional bearer token for the OpenAI-compatible API.
    pub openai_api_key: Option<String>,
    /// Number of clusters requested from the partitioner.
    pub cluster_count: usize,
    /// Articles per embedding request.
    pub embedding_batch_size: usize,
    /// Per-article character budget for embedding input.
    pub embedding_max_chars: usize,
    /// Pause between embedding batches, in milliseconds.
    pub embedding_batch_delay_ms: u64,
    /// Attempt cap for every upstream call.
    pub retry_max_attempts: u32,
    /// Base backoff delay in milliseconds; doubles per attempt.
    pub retry_base_delay_ms: u64,
    /// Number of articles featured in the top-N selection.
    pub top_article_count: usize,
    /// Optional directory holding prompt template overrides.
    pub prompts_dir: Option<PathBuf>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
}

/// Supported text-generation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible chat completions API.
    OpenAI,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required =
            |key: &str| optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()));

        Ok(Self {
            embedding_provider: required("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            embedding_model: required("EMBEDDING_MODEL")?,
            embedding_dimension: parse_optional(
                optional("EMBEDDING_DIMENSION"),
                "EMBEDDING_DIMENSION",
            )?,
            generation_provider: required("GENERATION_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("GENERATION_PROVIDER".to_string()))?,
            generation_model: required("GENERATION_MODEL")?,
            ollama_url: optional("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            openai_base_url: optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            openai_api_key: optional("OPENAI_API_KEY"),
            cluster_count: parse_optional(optional("CLUSTER_COUNT"), "CLUSTER_COUNT")?
                .unwrap_or(8),
            embedding_batch_size: parse_positive(
                optional("EMBEDDING_BATCH_SIZE"),
                "EMBEDDING_BATCH_SIZE",
                20,
            )?,
            embedding_max_chars: parse_positive(
                optional("EMBEDDING_MAX_CHARS"),
                "EMBEDDING_MAX_CHARS",
                8000,
            )?,
            embedding_batch_delay_ms: parse_optional(
                optional("EMBEDDING_BATCH_DELAY_MS"),
                "EMBEDDING_BATCH_DELAY_MS",
            )?
            .unwrap_or(500),
            retry_max_attempts: parse_optional(
                optional("RETRY_MAX_ATTEMPTS"),
                "RETRY_MAX_ATTEMPTS",
            )?
            .unwrap_or(3),
            retry_base_delay_ms: parse_optional(
                optional("RETRY_BASE_DELAY_MS"),
                "RETRY_BASE_DELAY_MS",
            )?
            .unwrap_or(2000),
            top_article_count: parse_positive(
                optional("TOP_ARTICLE_COUNT"),
                "TOP_ARTICLE_COUNT",
                5,
            )?,
            prompts_dir: optional("PROMPTS_DIR").map(PathBuf::from),
        })
    }

    /// Retry policy applied to embedding batches and generation calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    /// Batching and truncation settings for the article embedder.
    pub fn embedder_settings(&self) -> EmbedderSettings {
        EmbedderSettings {
            batch_size: self.embedding_batch_size,
            max_chars: self.embedding_max_chars,
            batch_delay: Duration::from_millis(self.embedding_batch_delay_ms),
            expected_dimension: self.embedding_dimension,
            retry: self.retry_policy(),
        }
    }

    /// Pipeline-level tuning derived from this configuration.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            cluster_count: self.cluster_count,
            top_article_count: self.top_article_count,
            retry: self.retry_policy(),
        }
    }
}

fn parse_optional<T: std::str::FromStr>(
    value: Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_positive(value: Option<String>, key: &str, default: usize) -> Result<usize, ConfigError> {
    match parse_optional::<usize>(value, key)? {
        Some(0) => Err(ConfigError::InvalidValue(key.to_string())),
        Some(parsed) => Ok(parsed),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from the environment (and `.env`) and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        generation_provider = ?config.generation_provider,
        generation_model = %config.generation_model,
        cluster_count = config.cluster_count,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}
