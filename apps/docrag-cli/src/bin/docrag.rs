use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::warn;

use docrag_cli::{collect_files, init_tracing, load_settings, local_filepath, AppContext};
use docrag_core::source::FileSource;
use docrag_core::traits::ByteSource;
use docrag_core::types::IngestStatus;
use docrag_pipeline::api::SearchParams;

#[derive(Parser, Debug)]
#[command(name = "docrag", about = "Index .txt/.pdf documents and query them")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest files or directories (recursively).
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Similarity search over indexed chunks.
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a question from indexed documents.
    Ask { question: String },
    /// List indexed files.
    Files,
    /// Replay a bucket-notification JSON payload.
    Event { payload: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = load_settings()?;
    let ctx = AppContext::build(settings).await?;

    match cli.command {
        Command::Ingest { paths } => ingest(&ctx, &paths).await?,
        Command::Search { query, top_k } => {
            let api = ctx.api()?;
            let found = api
                .search(SearchParams { query: Some(query), top_k })
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e.message, e.status))?;
            if found.results.is_empty() {
                println!("No results.");
            }
            for (i, r) in found.results.iter().enumerate() {
                println!("{:>2}. [{:.3}] {} ({})", i + 1, r.similarity_score, r.filename, r.filepath);
                println!("    {}", preview(&r.text, 200));
            }
        }
        Command::Ask { question } => {
            let answer = ctx.answerer()?.answer(&question).await?;
            println!("{}", answer.answer);
        }
        Command::Files => {
            let files = ctx.retrieval.list_indexed_files().await?;
            for f in &files {
                println!("{}\t{}", f.filename, f.filepath);
            }
            println!("{} files", files.len());
        }
        Command::Event { payload } => {
            let bytes = std::fs::read(&payload).with_context(|| format!("reading {}", payload.display()))?;
            let api = ctx.api()?;
            let report = api
                .bucket_event(&bytes)
                .await
                .map_err(|e| anyhow::anyhow!("{} ({})", e.message, e.status))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn ingest(ctx: &AppContext, paths: &[PathBuf]) -> Result<()> {
    let files = collect_files(paths);
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("#>-"),
    );
    let (mut processed, mut chunks, mut skipped, mut failed) = (0usize, 0usize, 0usize, 0usize);
    for path in &files {
        let source = FileSource::new(path);
        let filename = source.name().to_string();
        pb.set_message(filename.clone());
        let outcome = match local_filepath(path) {
            Ok(filepath) => ctx.ingestion.ingest(&source, &filename, &filepath).await.map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(IngestStatus::Processed { chunks: n }) => {
                processed += 1;
                chunks += n;
            }
            Ok(IngestStatus::Skipped(reason)) => {
                skipped += 1;
                pb.println(format!("skipped {}: {}", path.display(), reason));
            }
            Err(e) => {
                failed += 1;
                warn!("Failed to ingest {}: {:#}", path.display(), e);
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");
    println!("Processed {processed} files ({chunks} chunks), skipped {skipped}, failed {failed}");
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
