#![deny(missing_docs)]

//! Core library for the topic digest pipeline.

/// Topic clustering, labeling, and representative selection.
pub mod clustering;
/// Environment-driven configuration management.
pub mod config;
/// Size-driven curation and isolated cluster summaries.
pub mod curation;
/// Assembly of the final digest document.
pub mod digest;
/// Embedding client abstraction, adapters, and the batched article embedder.
pub mod embedding;
/// Plain-text article renderings for prompts and sections.
pub mod format;
/// Text-generation client abstraction and adapters.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline activity counters.
pub mod metrics;
/// End-to-end digest orchestration.
pub mod pipeline;
/// Prompt templates and placeholder substitution.
pub mod prompts;
/// Bounded retry with exponential backoff.
pub mod retry;
/// Featured-article selection and deep-dive synthesis.
pub mod selection;
/// Shared data types.
pub mod types;
