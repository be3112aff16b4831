use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use docqa_core::types::{Answer, META_PAGE, META_SOURCE};
use docqa_pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "docqa", about = "Ask questions about a local document collection", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the index from the documents directory
    Ingest,
    /// Answer a question from the indexed documents
    Ask {
        question: String,
    },
    /// Copy a file into the documents directory
    Upload {
        file: PathBuf,
    },
    /// List files in the documents directory
    Docs,
}

#[tokio::main]
async fn main() -> ExitCode {
    docqa_cli::init_tracing();
    let cli = Cli::parse();
    docqa_cli::report(run(cli).await)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = docqa_cli::load_settings()?;
    let pipeline = Pipeline::from_settings(&settings, Path::new(".")).await?;

    match cli.command {
        Command::Ingest => {
            let summary = pipeline.ingest().await?;
            for path in &summary.failed_files {
                println!("⚠️  skipped {}", path.display());
            }
            println!(
                "✅ Ingest complete ({} chunks from {} documents) -> {}",
                summary.chunk_count,
                summary.document_count,
                pipeline.index_dir().display()
            );
        }
        Command::Ask { question } => {
            // Ctrl-C abandons the outstanding embedding/generation calls
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    trigger.cancel();
                }
            });
            let answer = pipeline.ask_cancellable(&question, cancel).await?;
            print_answer(&answer);
        }
        Command::Upload { file } => {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .with_context(|| format!("not a file path: {}", file.display()))?;
            let bytes = tokio::fs::read(&file).await.with_context(|| format!("reading {}", file.display()))?;
            let dest = pipeline.upload(&name, &bytes).await?;
            info!(path = %dest.display(), "uploaded");
            println!("✅ Stored {} ({} bytes)", dest.display(), bytes.len());
        }
        Command::Docs => {
            let docs = pipeline.list_documents()?;
            if docs.is_empty() {
                println!("No documents in {}", pipeline.docs_dir().display());
            }
            for d in docs {
                println!("{:>10}  {}", d.size_bytes, d.name);
            }
        }
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.answer.trim());
    if answer.sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for (i, source) in answer.sources.iter().enumerate() {
        let origin = source.metadata.get(META_SOURCE).map(String::as_str).unwrap_or("unknown");
        let name = Path::new(origin).file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| origin.to_string());
        match source.metadata.get(META_PAGE) {
            Some(page) => println!("  {}. {} (page {}) [{:.3}]", i + 1, name, page, source.score),
            None => println!("  {}. {} [{:.3}]", i + 1, name, source.score),
        }
    }
}
