//! Plain-text renderings of articles used inside prompts and digest sections.

use crate::types::Article;

/// Per-article content budget inside curation and summary prompts.
pub const PROMPT_CONTENT_CHARS: usize = 6000;

/// Content preview length used by selection prompts.
pub const PREVIEW_CHARS: usize = 300;

/// Truncate to at most `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Render articles as numbered blocks with source, date, body, and links.
pub fn format_article_block(articles: &[Article], max_content_chars: usize) -> String {
    articles
        .iter()
        .enumerate()
        .map(|(index, article)| {
            let mut block = format!(
                "### [{}] {}\nSource: {} | Date: {}\n\n{}\n",
                index + 1,
                article.subject,
                article.source,
                article.timestamp,
                truncate_chars(article.content.trim(), max_content_chars)
            );
            if !article.links.is_empty() {
                block.push_str("\nLinks:\n");
                for link in &article.links {
                    block.push_str(&format!("- {}: {}\n", link.text, link.url));
                }
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

/// One-line preview: `[index] source | subject | preview (N words)`.
pub fn format_article_preview(index: usize, article: &Article) -> String {
    let preview = article.content.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(
        "[{index}] {} | {} | {} ({} words)",
        article.source,
        article.subject,
        truncate_chars(&preview, PREVIEW_CHARS),
        article.word_count
    )
}

/// Markdown listing used when a cluster is rendered without synthesis.
pub fn format_article_listing(articles: &[Article]) -> String {
    articles
        .iter()
        .map(|article| {
            let mut entry = format!(
                "**{}** ({})\n\n{}\n",
                article.subject,
                article.source,
                article.content.trim()
            );
            for link in &article.links {
                entry.push_str(&format!("- [{}]({})\n", link.text, link.url));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Link;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("ééééé", 3), "éé…");
    }

    #[test]
    fn preview_never_includes_full_content() {
        let body = "word ".repeat(500);
        let article = Article::new("Src", "Subject", "t", body, vec![]);
        let preview = format_article_preview(3, &article);
        assert!(preview.starts_with("[3] Src | Subject | "));
        assert!(preview.ends_with("(500 words)"));
        assert!(preview.chars().count() < 400);
    }

    #[test]
    fn block_lists_links() {
        let article = Article::new(
            "Src",
            "Subject",
            "2025-01-01",
            "Body",
            vec![Link {
                text: "Docs".into(),
                url: "https://docs.example".into(),
            }],
        );
        let block = format_article_block(&[article], 100);
        assert!(block.contains("### [1] Subject"));
        assert!(block.contains("- Docs: https://docs.example"));
    }
}
