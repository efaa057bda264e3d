//! Bulk directory ingestion: walks a tree of .txt/.md files and indexes each
//! as one document, embedding through a bounded worker pool.

use std::path::PathBuf;

use clap::Parser;
use futures::stream::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use kbase_core::config::AppConfig;
use kbase_core::types::{DocumentMetadata, SourceType};
use kbase_server::build_state;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "kbase-bulk-index", about = "Index a directory of text files")]
struct Args {
    /// Directory to walk for .txt and .md files.
    dir: PathBuf,

    /// Source type to index the documents under.
    #[arg(long, default_value = "generic")]
    source_type: String,

    /// Configuration file (TOML); KBASE_* env vars override it.
    #[arg(long, default_value = "kbase.toml")]
    config: PathBuf,

    /// Concurrent embedding calls; bounded to respect provider rate limits.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
}

fn parse_source_type(raw: &str) -> anyhow::Result<SourceType> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|_| {
        anyhow::anyhow!(
            "unknown source_type '{raw}' (expected one of: wiki-page, ticket, \
             repository-file, uploaded-file, generic)"
        )
    })
}

fn list_text_files(root: &PathBuf) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| {
            matches!(
                p.extension().and_then(|s| s.to_str()),
                Some("txt") | Some("md")
            )
        })
        .collect();
    files.sort();
    files
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = Args::parse();
    let source_type = parse_source_type(&args.source_type)?;
    let config = AppConfig::load_from(&args.config)?;
    let state = build_state(&config).await?;

    let files = list_text_files(&args.dir);
    if files.is_empty() {
        println!("No .txt or .md files found under {}", args.dir.display());
        return Ok(());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );

    let registry = state.registry.clone();
    let mut stream = futures::stream::iter(files.into_iter().map(|path| {
        let registry = registry.clone();
        async move {
            let document_id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string());
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => return (document_id, Err(anyhow::anyhow!("read failed: {e}"))),
            };
            let metadata = DocumentMetadata {
                title: document_id.clone(),
                source_id: path.to_string_lossy().to_string(),
                ..DocumentMetadata::default()
            };
            let outcome = registry
                .index_document(source_type, &document_id, metadata, &text)
                .await
                .map_err(anyhow::Error::from);
            (document_id, outcome)
        }
    }))
    .buffer_unordered(args.concurrency.max(1));

    let mut indexed = 0usize;
    let mut chunks_total = 0usize;
    let mut failed = 0usize;
    while let Some((document_id, outcome)) = stream.next().await {
        match outcome {
            Ok(chunks) => {
                indexed += 1;
                chunks_total += chunks;
            }
            Err(e) => {
                failed += 1;
                warn!("failed to index '{document_id}': {e}");
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    println!(
        "Indexed {indexed} documents ({chunks_total} chunks) into {}; {failed} failed",
        source_type
    );
    let usage = state.registry.embedder().usage();
    println!(
        "Embedding usage: {} requests, {} input tokens",
        usage.requests, usage.input_tokens
    );
    Ok(())
}
