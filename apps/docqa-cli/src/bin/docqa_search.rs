use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use docqa_core::traits::Embedder;
use docqa_core::types::{snippet, META_SOURCE};
use docqa_vector::Retriever;

/// Retrieval only: print the chunks most similar to a query, no generation.
#[derive(Parser)]
#[command(name = "docqa-search", version)]
struct Args {
    query: String,
    /// Number of results (defaults to retrieval.k)
    #[arg(long, short = 'n')]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    docqa_cli::init_tracing();
    let args = Args::parse();
    docqa_cli::report(run(args).await)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings = docqa_cli::load_settings()?;
    let k = args.limit.unwrap_or(settings.retrieval.k);
    let embedder = docqa_embed::get_default_embedder(&settings).await?;
    let retriever = Retriever::load(&settings.index_dir(Path::new(".")), k).await?;

    let q = embedder.embed(&args.query).await?;
    let hits = retriever.retrieve(&q)?;
    println!("🔎 '{}' -> {} hits", args.query, hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let source = hit.chunk.metadata.get(META_SOURCE).map(String::as_str).unwrap_or(&hit.chunk.doc_path);
        println!("{:>2}. [{:.4}] {}", i + 1, hit.score, source);
        println!("    {}", snippet(&hit.chunk.content, settings.retrieval.snippet_chars).replace('\n', " "));
    }
    Ok(())
}
