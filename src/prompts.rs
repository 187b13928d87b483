//! Prompt templates keyed by call site, with exact-token placeholder substitution.
//!
//! Built-in defaults cover every call site. A directory of `<key>.txt` files can override any
//! of them. Placeholders are written `{name}` and are substituted in a single left-to-right
//! pass, so text inserted for one placeholder is never scanned for further placeholders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or rendering templates.
#[derive(Debug, Error)]
pub enum PromptError {
    /// No template is registered for the key.
    #[error("no prompt template registered for '{0}'")]
    MissingTemplate(String),
    /// An override file could not be read.
    #[error("failed to read prompt template {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Call sites that issue a text-generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKey {
    /// Synthesis of one main cluster under a curation strategy.
    ClusterCuration,
    /// Synthesis of the merged miscellaneous cluster.
    MiscCuration,
    /// Isolated full summary of one cluster.
    ClusterSummary,
    /// Best-of selection bounded at five.
    SelectBest,
    /// Parameterized top-N selection.
    SelectTop,
    /// Deep-dive synthesis over the selected articles.
    DeepDive,
}

impl PromptKey {
    /// Every key, in a fixed order.
    pub const ALL: [PromptKey; 6] = [
        PromptKey::ClusterCuration,
        PromptKey::MiscCuration,
        PromptKey::ClusterSummary,
        PromptKey::SelectBest,
        PromptKey::SelectTop,
        PromptKey::DeepDive,
    ];

    /// File stem and lookup name for this key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClusterCuration => "cluster_curation",
            Self::MiscCuration => "misc_curation",
            Self::ClusterSummary => "cluster_summary",
            Self::SelectBest => "select_best",
            Self::SelectTop => "select_top",
            Self::DeepDive => "deep_dive",
        }
    }

    fn default_template(self) -> &'static str {
        match self {
            Self::ClusterCuration => CLUSTER_CURATION,
            Self::MiscCuration => MISC_CURATION,
            Self::ClusterSummary => CLUSTER_SUMMARY,
            Self::SelectBest => SELECT_BEST,
            Self::SelectTop => SELECT_TOP,
            Self::DeepDive => DEEP_DIVE,
        }
    }
}

const CLUSTER_CURATION: &str = "You are curating the \"{label}\" section of a newsletter digest. \
The section contains {article_count} articles.\n\
Strategy: {strategy} ({strategy_description}).\n\
Keep the {keep_count} most substantive articles intact with their key details and links. \
{synthesis_instruction}\n\
Use only the articles below. Do not mention topics that are not present in them.\n\n\
Articles:\n{articles}";

const MISC_CURATION: &str = "You are writing the \"{label}\" section of a newsletter digest from \
{article_count} unrelated articles.\n\
Synthesize them into a short set of bullet points, one per distinct story, preserving the most \
important links. Use only the articles below.\n\nArticles:\n{articles}";

const CLUSTER_SUMMARY: &str = "Summarize the \"{label}\" topic for this week's digest using the \
{article_count} articles below. Write a heading, a two to three paragraph synthesis, and a list of \
the most useful links. Use only these articles.\n\nArticles:\n{articles}";

const SELECT_BEST: &str = "From the {article_count} articles below, pick the {count} most \
important and insightful ones for a best-of-the-week feature.\n\
Respond with a JSON object: {\"selected\": [indices], \"reasoning\": \"why\"}. Indices are the \
bracketed numbers shown.\n\nArticles:\n{articles}";

const SELECT_TOP: &str = "Rank the {article_count} articles below and choose the top {count} for \
in-depth analysis.\n\
Respond with a JSON object: {\"selected\": [indices], \"reasoning\": \"why\"}. Indices are the \
bracketed numbers shown.\n\nArticles:\n{articles}";

const DEEP_DIVE: &str = "Write an in-depth analysis of each of the {article_count} articles below. \
Give every article its own section starting with a level-two markdown heading (## ) naming the \
story, followed by the key points, context, and why it matters.\n\nArticles:\n{articles}";

/// Keyed collection of prompt templates.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: HashMap<PromptKey, String>,
}

impl PromptTemplates {
    /// Templates with the built-in defaults only.
    pub fn builtin() -> Self {
        let templates = PromptKey::ALL
            .iter()
            .map(|key| (*key, key.default_template().to_string()))
            .collect();
        Self { templates }
    }

    /// Built-in defaults, overridden by any `<key>.txt` present in `dir`.
    pub fn with_overrides(dir: &Path) -> Result<Self, PromptError> {
        let mut prompts = Self::builtin();
        for key in PromptKey::ALL {
            let path = dir.join(format!("{}.txt", key.as_str()));
            if !path.is_file() {
                continue;
            }
            let template = std::fs::read_to_string(&path).map_err(|source| PromptError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::debug!(
                template = key.as_str(),
                path = %path.display(),
                "Loaded prompt override"
            );
            prompts.templates.insert(key, template);
        }
        Ok(prompts)
    }

    /// Replace the template for a key.
    pub fn set(&mut self, key: PromptKey, template: impl Into<String>) {
        self.templates.insert(key, template.into());
    }

    /// Render the template for `key`, substituting `{name}` tokens from `vars`.
    pub fn render(&self, key: PromptKey, vars: &[(&str, &str)]) -> Result<String, PromptError> {
        let template = self
            .templates
            .get(&key)
            .ok_or_else(|| PromptError::MissingTemplate(key.as_str().to_string()))?;
        Ok(fill_placeholders(template, vars))
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Substitute `{name}` tokens in a single pass; unknown tokens are left as written.
pub fn fill_placeholders(template: &str, vars: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, *value))
        });
        match substituted {
            Some((close, value)) => {
                output.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }
    output.push_str(rest);
    output
}
