use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use topicdigest::curation::{CurationError, select_strategy};
use topicdigest::digest::DigestLayout;
use topicdigest::embedding::{
    EmbedderSettings, EmbeddingClient, EmbeddingClientError, EmbeddingError,
};
use topicdigest::generation::{GenerationError, TextGenerator};
use topicdigest::pipeline::{DigestPipeline, PipelineError, PipelineSettings};
use topicdigest::prompts::PromptTemplates;
use topicdigest::retry::RetryPolicy;
use topicdigest::types::{Article, ClusterType, CurationStrategy, SelectionMethod};

const DIMENSION: usize = 8;
const DEEP_DIVE: &str = "## Featured one\nanalysis\n\n## Featured two\nanalysis";

/// One-hot embedding on the axis named by a `topicN` token in the text.
struct TopicEmbedder {
    poison: Option<&'static str>,
}

#[async_trait]
impl EmbeddingClient for TopicEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if let Some(poison) = self.poison {
            if texts.iter().any(|text| text.contains(poison)) {
                return Err(EmbeddingClientError::GenerationFailed("upstream 503".into()));
            }
        }
        Ok(texts
            .iter()
            .map(|text| {
                let axis = text
                    .split_whitespace()
                    .find_map(|word| word.strip_prefix("topic")?.parse::<usize>().ok())
                    .unwrap_or(0);
                let mut vector = vec![0.0; DIMENSION];
                vector[axis % DIMENSION] = 1.0;
                vector
            })
            .collect())
    }
}

/// Answers by prompt kind and records every prompt it receives.
struct ScriptedGenerator {
    selection_response: String,
    fail_marker: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(selection_response: &str) -> Arc<Self> {
        Arc::new(Self {
            selection_response: selection_response.to_string(),
            fail_marker: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing_on(marker: &'static str) -> Arc<Self> {
        Arc::new(Self {
            selection_response: "{}".to_string(),
            fail_marker: Some(marker),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts_starting_with(&self, prefix: &str) -> Vec<String> {
        self.prompts
            .lock()
            .expect("lock")
            .iter()
            .filter(|prompt| prompt.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().expect("lock").push(prompt.to_string());
        if let Some(marker) = self.fail_marker {
            if prompt.contains(marker) {
                return Err(GenerationError::GenerationFailed("model overloaded".into()));
            }
        }
        if prompt.contains("Respond with a JSON object") {
            return Ok(self.selection_response.clone());
        }
        if prompt.starts_with("Write an in-depth analysis") {
            return Ok(DEEP_DIVE.to_string());
        }
        Ok("Synthesized section".to_string())
    }
}

fn article(topic: usize, index: usize, words: usize) -> Article {
    let headline = format!("headline-{index:02}");
    Article::new(
        format!("Source {}", index % 4),
        format!("topic{topic} {headline}"),
        format!("2025-03-{:02}T08:00:00Z", 1 + index % 7),
        format!("Body of {headline} about topic{topic}. {}", "detail ".repeat(words)),
        vec![],
    )
}

fn interleaved(topics: usize, count: usize) -> Vec<Article> {
    (0..count).map(|index| article(index % topics, index, 10)).collect()
}

fn pipeline(
    embedder: TopicEmbedder,
    generator: Arc<ScriptedGenerator>,
    cluster_count: usize,
    top_article_count: usize,
    batch_size: usize,
) -> DigestPipeline {
    let retry = RetryPolicy::new(2, Duration::ZERO);
    DigestPipeline::new(
        Arc::new(embedder),
        generator,
        Arc::new(PromptTemplates::builtin()),
        EmbedderSettings {
            batch_size,
            max_chars: 8000,
            batch_delay: Duration::ZERO,
            expected_dimension: Some(DIMENSION),
            retry,
        },
        PipelineSettings {
            cluster_count,
            top_article_count,
            retry,
        },
    )
}

fn topic_markers(prompt: &str, topics: usize) -> HashSet<usize> {
    (0..topics)
        .filter(|topic| prompt.contains(&format!("topic{topic}")))
        .collect()
}

#[tokio::test]
async fn six_articles_with_k_eight_become_singletons() {
    let generator = ScriptedGenerator::new(r#"{"selected": [0, 1], "reasoning": "lead"}"#);
    let articles: Vec<Article> = (0..6).map(|index| article(index, index, 5)).collect();
    let pipeline = pipeline(TopicEmbedder { poison: None }, generator.clone(), 8, 5, 20);

    let run = pipeline
        .run(&articles, DigestLayout::Curated)
        .await
        .expect("run");

    assert_eq!(run.clusters.len(), 6);
    for (index, cluster) in run.clusters.iter().enumerate() {
        assert_eq!(cluster.id, index);
        assert_eq!(cluster.articles, vec![articles[index].clone()]);
    }
    assert!(run.clusters[..5].iter().all(|c| c.cluster_type == ClusterType::Main));
    assert_eq!(run.clusters[5].cluster_type, ClusterType::Miscellaneous);
    assert_eq!(run.clusters[5].label.as_deref(), Some("Other News"));

    assert!(run
        .curated
        .iter()
        .all(|curated| curated.strategy == CurationStrategy::Passthrough
            && curated.curated_content.is_none()));
    for article in &articles {
        assert!(run.document.contains(&format!("**{}**", article.subject)));
    }

    assert_eq!(run.selection.method, SelectionMethod::ParsedJson);
    assert_eq!(run.selection.selected, vec![articles[0].clone(), articles[1].clone()]);
    // Selection and deep dive only; passthrough clusters never call the generator.
    assert_eq!(run.metrics.generation_calls, 2);
    assert_eq!(run.metrics.articles_embedded, 6);
}

#[tokio::test]
async fn thirty_five_articles_in_one_topic_are_curated_heavily() {
    let plan = select_strategy(35);
    assert_eq!(
        (plan.strategy, plan.keep_count, plan.synthesize),
        (CurationStrategy::Heavy, 2, true)
    );

    let generator = ScriptedGenerator::new(r#"{"selected": [3]}"#);
    let articles = interleaved(1, 35);
    let pipeline = pipeline(TopicEmbedder { poison: None }, generator.clone(), 8, 5, 20);

    let run = pipeline
        .run(&articles, DigestLayout::Curated)
        .await
        .expect("run");

    assert_eq!(run.clusters.len(), 1);
    assert_eq!(run.clusters[0].len(), 35);
    assert_eq!(run.curated[0].strategy, CurationStrategy::Heavy);
    assert_eq!(run.curated[0].original_article_count, 35);
    assert_eq!(run.curated[0].curated_content.as_deref(), Some("Synthesized section"));

    let curation = generator.prompts_starting_with("You are curating the");
    assert_eq!(curation.len(), 1);
    assert!(curation[0].contains("Strategy: heavy"));
    assert!(curation[0].contains("Keep the 2 most substantive"));
    assert!(curation[0].contains("Synthesize the remaining 33 articles"));
}

#[tokio::test]
async fn curation_prompts_never_mix_clusters() {
    let generator = ScriptedGenerator::new(r#"{"selected": [0, 1, 2]}"#);
    let articles = interleaved(3, 36);
    let pipeline = pipeline(TopicEmbedder { poison: None }, generator.clone(), 3, 3, 10);

    let run = pipeline
        .run(&articles, DigestLayout::Curated)
        .await
        .expect("run");

    assert_eq!(run.clusters.len(), 3);
    let curation = generator.prompts_starting_with("You are curating the");
    assert_eq!(curation.len(), 3);
    let mut covered = HashSet::new();
    for prompt in &curation {
        let markers = topic_markers(prompt, 3);
        assert_eq!(markers.len(), 1, "prompt mixes topics: {markers:?}");
        covered.extend(markers);
        assert!(prompt.contains("Strategy: moderate"));
    }
    assert_eq!(covered, HashSet::from([0, 1, 2]));
}

#[tokio::test]
async fn weekly_summaries_exclude_featured_articles() {
    let generator = ScriptedGenerator::new(r#"{"selected": [0, 4], "reasoning": "lead stories"}"#);
    let articles = interleaved(3, 12);
    let pipeline = pipeline(TopicEmbedder { poison: None }, generator.clone(), 3, 5, 20);

    let run = pipeline
        .run(&articles, DigestLayout::Weekly)
        .await
        .expect("run");

    let featured: Vec<&str> = run
        .selection
        .selected
        .iter()
        .map(|article| article.subject.as_str())
        .collect();
    assert_eq!(featured, vec!["topic0 headline-00", "topic1 headline-04"]);
    assert_eq!(run.selection.reasoning, "lead stories");

    let summaries = generator.prompts_starting_with("Summarize the");
    assert_eq!(summaries.len(), 3);
    for prompt in &summaries {
        assert_eq!(topic_markers(prompt, 3).len(), 1);
        assert!(!prompt.contains("headline-00"), "featured article leaked into summary");
        assert!(!prompt.contains("headline-04"), "featured article leaked into summary");
    }

    let counts: Vec<usize> = run.summaries.iter().map(|s| s.article_count).collect();
    assert_eq!(counts.iter().sum::<usize>(), 10);

    let deep_dive = generator.prompts_starting_with("Write an in-depth analysis");
    assert_eq!(deep_dive.len(), 1);
    assert!(deep_dive[0].contains("headline-00") && deep_dive[0].contains("headline-04"));
    assert!(!deep_dive[0].contains("headline-01"));

    assert!(run.document.starts_with("# Weekly Digest"));
    assert!(run.document.contains("# Top Stories\n\n1. Featured one\n2. Featured two"));
    assert!(run.curated.is_empty());
}

#[tokio::test]
async fn unusable_selection_response_falls_back_to_word_count() {
    let generator = ScriptedGenerator::new("I could not decide between these.");
    let articles: Vec<Article> = [5, 40, 12, 60, 3, 25]
        .iter()
        .enumerate()
        .map(|(index, words)| article(index, index, *words))
        .collect();
    let pipeline = pipeline(TopicEmbedder { poison: None }, generator, 8, 2, 20);

    let run = pipeline
        .run(&articles, DigestLayout::Curated)
        .await
        .expect("selection never fails the run");

    assert_eq!(run.selection.method, SelectionMethod::Fallback);
    assert_eq!(
        run.selection.selected,
        vec![articles[3].clone(), articles[1].clone()]
    );
}

#[tokio::test]
async fn partial_embedding_failure_proceeds_with_remaining_articles() {
    let generator = ScriptedGenerator::new(r#"{"selected": [0]}"#);
    let mut articles = interleaved(2, 4);
    articles.push(Article::new("Wire", "topic1 poison", "2025-03-02T00:00:00Z", "bad", vec![]));
    articles.push(Article::new("Wire", "topic0 filler", "2025-03-02T00:00:00Z", "ok", vec![]));
    let pipeline = pipeline(
        TopicEmbedder {
            poison: Some("poison"),
        },
        generator,
        8,
        5,
        2,
    );

    let run = pipeline
        .run(&articles, DigestLayout::Curated)
        .await
        .expect("run");

    assert_eq!(
        run.failed_article_ids,
        vec![articles[4].id.clone(), articles[5].id.clone()]
    );
    let clustered: usize = run.clusters.iter().map(|cluster| cluster.len()).sum();
    assert_eq!(clustered, 4);
    assert_eq!(run.metrics.batches_failed, 1);
    assert_eq!(run.metrics.articles_failed, 2);
}

#[tokio::test]
async fn total_embedding_failure_aborts_the_run() {
    let generator = ScriptedGenerator::new("{}");
    let articles = interleaved(2, 5);
    let pipeline = pipeline(
        TopicEmbedder {
            poison: Some("topic"),
        },
        generator.clone(),
        8,
        5,
        2,
    );

    let error = pipeline
        .run(&articles, DigestLayout::Curated)
        .await
        .expect_err("nothing embedded");

    match error {
        PipelineError::Embedding(EmbeddingError::Exhausted {
            batches,
            failed_ids,
        }) => {
            assert_eq!(batches, 3);
            assert_eq!(failed_ids.len(), 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(generator.prompts.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn failed_cluster_curation_aborts_and_names_the_cluster() {
    let generator = ScriptedGenerator::failing_on("You are curating the");
    let articles = interleaved(1, 12);
    let pipeline = pipeline(TopicEmbedder { poison: None }, generator, 1, 5, 20);

    let error = pipeline
        .run(&articles, DigestLayout::Curated)
        .await
        .expect_err("curation failure is fatal");

    match error {
        PipelineError::Curation(CurationError::Cluster {
            label, attempts, ..
        }) => {
            assert_eq!(attempts, 2);
            assert!(!label.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}
