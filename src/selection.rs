//! Choosing a bounded set of featured articles through a text-generation call.
//!
//! Responses are parsed defensively in three tiers (JSON object, then bare integers, then a
//! deterministic word-count ordering), so selection itself never fails. Only the optional
//! deep-dive synthesis over the chosen articles can return an error.

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

use crate::format::{PROMPT_CONTENT_CHARS, format_article_block, format_article_preview};
use crate::generation::{GenerationError, TextGenerator};
use crate::prompts::{PromptError, PromptKey, PromptTemplates};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::types::{Article, Selection, SelectionMethod};

/// Size of the best-of selection.
pub const BEST_OF_COUNT: usize = 5;

static INTEGER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("integer pattern is valid"));

/// Errors from the deep-dive synthesis.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The deep-dive call exhausted its retries.
    #[error("deep-dive synthesis failed after {attempts} attempts: {source}")]
    DeepDive {
        /// Attempts made before giving up.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: GenerationError,
    },
    /// A prompt template could not be rendered.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Which tier of response parsing succeeded, with what it found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionParse {
    /// A JSON object named the selected indices.
    ParsedJson {
        /// Valid 0-based indices, deduplicated, in response order.
        indices: Vec<usize>,
        /// Rationale given alongside the indices, if any.
        reasoning: Option<String>,
    },
    /// Bare integers in the text, read as 1-based positions.
    ParsedIntegers {
        /// Valid 0-based indices, deduplicated, in response order.
        indices: Vec<usize>,
    },
    /// Nothing usable was found.
    Fallback,
}

/// Parse a selection response for a pool of `pool_size` articles, keeping at most `count`.
///
/// JSON indices may be 0- or 1-based: an index one past the 0-based range is read as 1-based
/// and shifted down. This is ambiguous near the boundary and kept for compatibility with
/// existing prompts.
pub fn parse_selection_response(response: &str, pool_size: usize, count: usize) -> SelectionParse {
    if let Some((indices, reasoning)) = parse_json_indices(response, pool_size, count) {
        return SelectionParse::ParsedJson { indices, reasoning };
    }

    let mut seen = HashSet::new();
    let indices: Vec<usize> = INTEGER_PATTERN
        .find_iter(response)
        .filter_map(|found| found.as_str().parse::<usize>().ok())
        .filter(|&position| position >= 1 && position <= pool_size)
        .map(|position| position - 1)
        .filter(|index| seen.insert(*index))
        .take(count)
        .collect();
    if !indices.is_empty() {
        return SelectionParse::ParsedIntegers { indices };
    }

    SelectionParse::Fallback
}

fn parse_json_indices(
    response: &str,
    pool_size: usize,
    count: usize,
) -> Option<(Vec<usize>, Option<String>)> {
    let candidate = extract_json_object(response)?;
    let value: Value = serde_json::from_str(candidate).ok()?;
    let raw = value
        .get("selected")
        .or_else(|| value.get("indices"))?
        .as_array()?;

    let mut seen = HashSet::new();
    let indices: Vec<usize> = raw
        .iter()
        .filter_map(|item| {
            item.as_u64()
                .or_else(|| item.as_str().and_then(|text| text.trim().parse().ok()))
        })
        .filter_map(|index| usize::try_from(index).ok())
        .map(|index| if index == pool_size && index > 0 { index - 1 } else { index })
        .filter(|&index| index < pool_size)
        .filter(|index| seen.insert(*index))
        .take(count)
        .collect();

    if indices.is_empty() {
        return None;
    }

    let reasoning = value
        .get("reasoning")
        .or_else(|| value.get("rationale"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some((indices, reasoning))
}

/// Slice from the first `{` to the last `}`, if both exist in that order.
fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

/// `count` articles ordered by descending word count; ties keep input order.
pub fn fallback_selection(articles: &[Article], count: usize) -> Vec<Article> {
    let mut ranked: Vec<&Article> = articles.iter().collect();
    ranked.sort_by(|a, b| b.word_count.cmp(&a.word_count));
    ranked.into_iter().take(count).cloned().collect()
}

/// Picks featured articles and writes the deep dive about them.
pub struct ArticleSelector {
    generator: Arc<dyn TextGenerator>,
    prompts: Arc<PromptTemplates>,
    retry: RetryPolicy,
}

impl ArticleSelector {
    /// Create a selector over the injected generator and templates.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        prompts: Arc<PromptTemplates>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            prompts,
            retry,
        }
    }

    /// Best-of selection bounded at [`BEST_OF_COUNT`].
    pub async fn select_best(&self, articles: &[Article]) -> Selection {
        self.select(PromptKey::SelectBest, articles, BEST_OF_COUNT).await
    }

    /// Top-`count` selection for in-depth treatment.
    pub async fn select_top(&self, articles: &[Article], count: usize) -> Selection {
        self.select(PromptKey::SelectTop, articles, count).await
    }

    /// Pools no larger than `count` are returned whole, and a `count` of zero selects nothing;
    /// neither case calls the generator.
    async fn select(&self, key: PromptKey, articles: &[Article], count: usize) -> Selection {
        if count == 0 {
            return Selection {
                selected: Vec::new(),
                reasoning: "No articles requested.".to_string(),
                method: SelectionMethod::Exhaustive,
            };
        }
        if articles.len() <= count {
            return Selection {
                selected: articles.to_vec(),
                reasoning: format!(
                    "All {} articles included; the pool is within the selection size.",
                    articles.len()
                ),
                method: SelectionMethod::Exhaustive,
            };
        }

        let previews = articles
            .iter()
            .enumerate()
            .map(|(index, article)| format_article_preview(index, article))
            .collect::<Vec<_>>()
            .join("\n");
        let article_count = articles.len().to_string();
        let count_text = count.to_string();

        let response = match self.prompts.render(
            key,
            &[
                ("article_count", article_count.as_str()),
                ("count", count_text.as_str()),
                ("articles", previews.as_str()),
            ],
        ) {
            Ok(prompt) => retry_with_backoff(&self.retry, key.as_str(), || {
                self.generator.generate(&prompt)
            })
            .await
            .map_err(|exhausted| exhausted.last_error.to_string()),
            Err(error) => Err(error.to_string()),
        };

        let response = response.unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Selection call failed; using deterministic fallback");
            String::new()
        });

        resolve_selection(
            parse_selection_response(&response, articles.len(), count),
            articles,
            count,
        )
    }

    /// In-depth analysis of each selected article, one `## ` section per story.
    ///
    /// An empty selection produces an empty string without a call.
    pub async fn deep_dive(&self, selection: &Selection) -> Result<String, SelectionError> {
        if selection.selected.is_empty() {
            return Ok(String::new());
        }

        let articles = format_article_block(&selection.selected, PROMPT_CONTENT_CHARS);
        let article_count = selection.selected.len().to_string();
        let prompt = self.prompts.render(
            PromptKey::DeepDive,
            &[
                ("article_count", article_count.as_str()),
                ("articles", articles.as_str()),
            ],
        )?;

        tracing::info!(articles = selection.selected.len(), "Writing deep dive");

        retry_with_backoff(&self.retry, "deep dive", || self.generator.generate(&prompt))
            .await
            .map_err(|exhausted| SelectionError::DeepDive {
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            })
    }
}

fn resolve_selection(parse: SelectionParse, articles: &[Article], count: usize) -> Selection {
    let pick = |indices: &[usize]| -> Vec<Article> {
        indices.iter().map(|&index| articles[index].clone()).collect()
    };

    match parse {
        SelectionParse::ParsedJson { indices, reasoning } => {
            tracing::debug!(selected = ?indices, "Selection parsed from JSON");
            Selection {
                selected: pick(&indices),
                reasoning: reasoning.unwrap_or_else(|| "Selected by the model.".to_string()),
                method: SelectionMethod::ParsedJson,
            }
        }
        SelectionParse::ParsedIntegers { indices } => {
            tracing::debug!(selected = ?indices, "Selection parsed from bare integers");
            Selection {
                selected: pick(&indices),
                reasoning: "Selected by the model (indices recovered from free text).".to_string(),
                method: SelectionMethod::ParsedIntegers,
            }
        }
        SelectionParse::Fallback => {
            tracing::warn!("Selection response unusable; ranking by word count");
            Selection {
                selected: fallback_selection(articles, count),
                reasoning: "Longest articles selected; the model response could not be parsed."
                    .to_string(),
                method: SelectionMethod::Fallback,
            }
        }
    }
}
