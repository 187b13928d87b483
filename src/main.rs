use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use topicdigest::digest::DigestLayout;
use topicdigest::embedding::build_embedding_client;
use topicdigest::generation::build_text_generator;
use topicdigest::pipeline::DigestPipeline;
use topicdigest::prompts::PromptTemplates;
use topicdigest::types::{Article, Link};
use topicdigest::{config, logging};

#[derive(Parser)]
#[command(
    name = "topicdigest",
    about = "Cluster articles by topic and curate them into a digest"
)]
struct Cli {
    /// JSON file holding an array of articles.
    #[arg(long)]
    input: PathBuf,
    /// Where to write the digest markdown; stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Digest layout: `curated` or `weekly`.
    #[arg(long, default_value_t = DigestLayout::Curated)]
    layout: DigestLayout,
    /// Also write the full run (clusters, selection, metrics) as JSON.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

/// Article as delivered by the upstream fetcher, before ids and counts are derived.
#[derive(Deserialize)]
struct ArticleRecord {
    source: String,
    subject: String,
    timestamp: String,
    content: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();
    let config = config::init_config().context("Failed to load configuration")?;

    let prompts = match &config.prompts_dir {
        Some(dir) => PromptTemplates::with_overrides(dir)
            .with_context(|| format!("Failed to load prompt overrides from {}", dir.display()))?,
        None => PromptTemplates::builtin(),
    };
    let embedding_client =
        build_embedding_client(config).context("Failed to build embedding client")?;
    let generator = build_text_generator(config).context("Failed to build text generator")?;

    let articles = load_articles(&cli.input)?;
    let pipeline = DigestPipeline::new(
        embedding_client,
        generator,
        Arc::new(prompts),
        config.embedder_settings(),
        config.pipeline_settings(),
    );

    let run = pipeline
        .run(&articles, cli.layout)
        .await
        .context("Digest run failed")?;

    match &cli.output {
        Some(path) => std::fs::write(path, &run.document)
            .with_context(|| format!("Failed to write digest to {}", path.display()))?,
        None => print!("{}", run.document),
    }

    if let Some(path) = &cli.snapshot {
        let json = serde_json::to_string_pretty(&run).context("Failed to serialize run snapshot")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote run snapshot");
    }

    Ok(())
}

fn load_articles(path: &Path) -> Result<Vec<Article>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read articles from {}", path.display()))?;
    let records: Vec<ArticleRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse articles in {}", path.display()))?;
    tracing::info!(articles = records.len(), path = %path.display(), "Loaded articles");

    Ok(records
        .into_iter()
        .map(|record| {
            Article::new(
                record.source,
                record.subject,
                record.timestamp,
                record.content,
                record.links,
            )
        })
        .collect())
}
