use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use console::style;

use crate::models::{CANONICAL_DIMENSION, Config};
use crate::services::{
    HttpGenerator, IngestionPipeline, QueryPipeline, WordChunker, create_provider, create_store,
};

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(help = "File to ingest; reads stdin when omitted")]
    pub file: Option<PathBuf>,

    #[arg(long, short = 's', help = "Source label for dedup; defaults to the file name")]
    pub source: Option<String>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[arg(required = true, help = "Query text")]
    pub query: String,

    #[arg(long, short = 'k', default_value_t = 5, help = "Number of chunks to retrieve")]
    pub k: usize,

    #[arg(long, help = "Routing hint passed through to the answer generator")]
    pub route: Option<String>,
}

pub async fn handle_ingest(args: IngestArgs, verbose: bool) -> Result<()> {
    let (content, fallback_source) = match args.file {
        Some(ref path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            (content, name)
        }
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("failed to read stdin")?;
            (content, "direct_input".to_string())
        }
    };

    let source = args.source.unwrap_or(fallback_source);
    let config = Config::load()?;

    if verbose {
        eprintln!("Source: {source}");
        eprintln!("  Store: {}", config.store.backend);
        eprintln!("  Embedding: {}", config.embedding.backend);
    }

    let provider = create_provider(&config.embedding)?;
    let store = create_store(&config.store, CANONICAL_DIMENSION).await?;
    let pipeline = IngestionPipeline::new(
        WordChunker::new(&config.chunking)?,
        provider,
        store,
        Duration::from_secs(config.embedding.timeout_secs),
    );

    let report = pipeline.ingest(&content, &source).await?;

    println!(
        "{} {} chunks from {} ({} characters)",
        style("Ingested").green().bold(),
        report.ingested,
        report.source,
        report.characters
    );

    Ok(())
}

pub async fn handle_query(args: QueryArgs, verbose: bool) -> Result<()> {
    let config = Config::load()?;

    if verbose {
        eprintln!("Query: \"{}\"", args.query);
        eprintln!("  k: {}", args.k);
    }

    let provider = create_provider(&config.embedding)?;
    let store = create_store(&config.store, CANONICAL_DIMENSION).await?;
    let generator = Arc::new(HttpGenerator::new(&config.generator)?);
    let pipeline = QueryPipeline::new(
        provider,
        store,
        generator,
        Duration::from_secs(config.embedding.timeout_secs),
        Duration::from_secs(config.generator.timeout_secs),
    );

    let response = pipeline
        .query(&args.query, args.k, args.route.as_deref())
        .await?;

    println!("{}", style("Answer").cyan().bold());
    println!("{}\n", response.answer);

    if !response.references.is_empty() {
        println!("{}", style("References").cyan().bold());
        for (i, reference) in response.references.iter().enumerate() {
            println!(
                "  {}. [{:.3}] {}",
                i + 1,
                reference.score,
                style(&reference.source).dim()
            );
        }
    }

    if verbose {
        eprintln!("\nContext preview:\n{}", response.context_preview);
        eprintln!("Generator: {}", response.generator_used);
    }

    Ok(())
}

pub async fn handle_stats(verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let store = create_store(&config.store, CANONICAL_DIMENSION).await?;
    let stats = store.stats().await?;

    println!("Backend:    {}", stats.backend);
    println!("Vectors:    {}", stats.total_vectors);
    println!("Dimension:  {}", stats.dimension);

    if verbose && stats.backend == "flat" {
        if let Ok(path) = config.store.resolved_index_path() {
            eprintln!("Index path: {}", path.display());
        }
    }

    Ok(())
}
