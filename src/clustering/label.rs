//! Term-frequency topic labels.

use std::collections::HashMap;

use crate::types::Cluster;

const MIN_WORD_CHARS: usize = 4;
const LABEL_TERMS: usize = 3;

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "also", "among", "been", "before", "being",
    "below", "between", "both", "could", "does", "doing", "down", "during", "each", "even",
    "every", "first", "from", "further", "have", "having", "here", "into", "just", "last",
    "like", "made", "make", "many", "more", "most", "much", "must", "need", "news", "newsletter",
    "next", "only", "other", "over", "said", "same", "says", "should", "since", "some", "still",
    "such", "than", "that", "their", "them", "then", "there", "these", "they", "this", "those",
    "through", "under", "until", "very", "want", "week", "well", "were", "what", "when", "where",
    "which", "while", "will", "with", "would", "year", "your", "yours", "subscribe", "click",
    "read", "email", "unsubscribe", "http", "https", "www",
];

/// Derive a label from the most frequent non-stopword terms of the cluster's articles.
///
/// Subjects and bodies are lowercased and split on non-alphabetic characters; words shorter than
/// four characters and stopwords are discarded. The three most frequent survivors (ties broken by
/// first occurrence) are title-cased and joined with `" / "`. With no survivors the label falls
/// back to `"Topic {id + 1}"`.
pub fn generate_cluster_label(cluster: &Cluster) -> String {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0usize;

    for article in &cluster.articles {
        let text = format!("{} {}", article.subject, article.content).to_lowercase();
        for word in text.split(|c: char| !c.is_alphabetic()) {
            if word.chars().count() < MIN_WORD_CHARS || STOPWORDS.contains(&word) {
                continue;
            }
            let entry = counts.entry(word.to_string()).or_insert((0, position));
            entry.0 += 1;
            position += 1;
        }
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first_seen))| (word, count, first_seen))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let terms: Vec<String> = ranked
        .into_iter()
        .take(LABEL_TERMS)
        .map(|(word, _, _)| title_case(&word))
        .collect();

    if terms.is_empty() {
        format!("Topic {}", cluster.id + 1)
    } else {
        terms.join(" / ")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}
