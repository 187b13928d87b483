//! Assembly of the final digest document.
//!
//! Everything here is pure: the pipeline hands over already-generated text and this module only
//! orders it. Parts are joined with a horizontal rule, and empty parts are dropped before joining
//! so a skipped cluster never leaves a stray separator behind.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::types::Article;

const SEPARATOR: &str = "\n\n---\n\n";

/// Which digest document to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestLayout {
    /// Executive summary, top-N deep dive, then curated topic sections.
    #[default]
    Curated,
    /// Top-stories listing, best-of deep dive, then isolated per-topic summaries.
    Weekly,
}

impl DigestLayout {
    /// Lowercase name used on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Curated => "curated",
            Self::Weekly => "weekly",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Curated => "Topic Digest",
            Self::Weekly => "Weekly Digest",
        }
    }
}

impl fmt::Display for DigestLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestLayout {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "curated" => Ok(Self::Curated),
            "weekly" => Ok(Self::Weekly),
            other => Err(format!("unknown digest layout '{other}' (expected curated or weekly)")),
        }
    }
}

/// One topic section of the digest, in cluster order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSection {
    /// Section heading, usually the cluster label.
    pub title: String,
    /// Rendered body; `None` or blank means the section is omitted.
    pub content: Option<String>,
}

impl DigestSection {
    fn body(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|body| !body.is_empty())
    }
}

/// Inputs to [`assemble_digest`].
#[derive(Debug, Clone, Copy)]
pub struct DigestInput<'a> {
    /// Document variant.
    pub layout: DigestLayout,
    /// Every article that entered the run; drives the header and counts.
    pub articles: &'a [Article],
    /// Number of topic clusters formed.
    pub topic_count: usize,
    /// Deep-dive markdown over the selected articles; may be empty.
    pub deep_dive: &'a str,
    /// Topic sections in cluster order.
    pub sections: &'a [DigestSection],
}

/// Concatenate the digest parts in fixed order.
pub fn assemble_digest(input: &DigestInput<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format!(
        "# {}\n\n_{}_",
        input.layout.title(),
        date_range(input.articles)
    ));

    match input.layout {
        DigestLayout::Curated => parts.push(executive_summary(input.articles, input.topic_count)),
        DigestLayout::Weekly => {
            let headings = extract_headings(input.deep_dive);
            if !headings.is_empty() {
                let listing = headings
                    .iter()
                    .enumerate()
                    .map(|(index, heading)| format!("{}. {heading}", index + 1))
                    .collect::<Vec<_>>()
                    .join("\n");
                parts.push(format!("# Top Stories\n\n{listing}"));
            }
        }
    }

    let deep_dive = input.deep_dive.trim();
    if !deep_dive.is_empty() {
        parts.push(format!("# In Depth\n\n{deep_dive}"));
    }

    parts.extend(input.sections.iter().filter_map(|section| {
        section
            .body()
            .map(|body| format!("# {}\n\n{body}", section.title))
    }));

    parts.push(closing(input.articles.len()));
    let mut document = parts.join(SEPARATOR);
    document.push('\n');
    document
}

/// Text of every level-two markdown heading (`## `), in document order.
pub fn extract_headings(markdown: &str) -> Vec<String> {
    markdown
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("## "))
        .map(str::trim)
        .filter(|heading| !heading.is_empty())
        .map(str::to_string)
        .collect()
}

/// `YYYY-MM-DD – YYYY-MM-DD` over the parseable article timestamps, or `undated`.
pub fn date_range(articles: &[Article]) -> String {
    let mut timestamps = articles
        .iter()
        .filter_map(|article| OffsetDateTime::parse(article.timestamp.trim(), &Rfc3339).ok());
    let Some(first) = timestamps.next() else {
        return "undated".to_string();
    };
    let (earliest, latest) = timestamps.fold((first, first), |(low, high), timestamp| {
        (low.min(timestamp), high.max(timestamp))
    });

    let day = format_description!("[year]-[month]-[day]");
    match (earliest.format(&day), latest.format(&day)) {
        (Ok(start), Ok(end)) => format!("{start} – {end}"),
        _ => "undated".to_string(),
    }
}

fn executive_summary(articles: &[Article], topic_count: usize) -> String {
    let sources: HashSet<&str> = articles.iter().map(|article| article.source.as_str()).collect();
    format!(
        "**{} articles** from {} sources across {} topics.",
        articles.len(),
        sources.len(),
        topic_count
    )
}

fn closing(article_count: usize) -> String {
    format!("_Compiled from {article_count} articles. Thanks for reading._")
}
