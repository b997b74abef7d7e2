use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docrag_answer::AnswerPipeline;
use docrag_core::config::{resolve_with_base, Backend, Config, Settings};
use docrag_core::data_processor::DataProcessor;
use docrag_core::traits::VectorIndexer;
use docrag_core::types::RetrievedChunk;
use docrag_embed::get_default_embedder;
use docrag_vector::{FlatIndex, PersistentIndex, Retriever, StoreBuilder, VectorStore};

#[derive(Parser)]
#[command(name = "docrag", version, about = "Chunk, embed and query a local document collection")]
struct Cli {
    /// Vector store directory (defaults to `store.dir` from config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a vector store from a .zip archive or a directory of documents
    Ingest {
        input: PathBuf,
        /// Output directory; replaces `--store` for this run
        #[arg(long)]
        out: Option<PathBuf>,
        /// Only ingest the first N documents
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the chunks closest to a question
    Query {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Answer a question from retrieved chunks, with references
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Summarize a saved store
    Inspect,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let settings = config.settings()?;
    let cwd = std::env::current_dir()?;
    let store_dir = cli.store.clone().unwrap_or_else(|| resolve_with_base(&cwd, &settings.store.dir));

    match cli.command {
        Command::Ingest { input, out, limit } => {
            let out = out.unwrap_or(store_dir);
            ingest(&settings, &input, &out, limit)
        }
        Command::Query { question, top_k, json } => {
            let top_k = top_k.unwrap_or(settings.retrieval.top_k);
            match settings.store.backend {
                Backend::Flat => query::<FlatIndex>(&settings, &store_dir, &question, top_k, json),
                Backend::Lance => query_lance(&settings, &store_dir, &question, top_k, json),
            }
        }
        Command::Ask { question, top_k, json } => {
            let top_k = top_k.unwrap_or(settings.retrieval.top_k);
            match settings.store.backend {
                Backend::Flat => ask::<FlatIndex>(&settings, &store_dir, &question, top_k, json),
                Backend::Lance => ask_lance(&settings, &store_dir, &question, top_k, json),
            }
        }
        Command::Inspect => match settings.store.backend {
            Backend::Flat => inspect::<FlatIndex>(&store_dir),
            Backend::Lance => inspect_lance(&store_dir),
        },
    }
}

fn ingest(settings: &Settings, input: &Path, out: &Path, limit: Option<usize>) -> anyhow::Result<()> {
    println!("Ingesting {} into {}", input.display(), out.display());
    let processor = DataProcessor::with_chunking(settings.ingest.chunking());
    let chunks = match limit {
        Some(limit) => processor.process_path_limited(input, limit)?,
        None => processor.process_path(input)?,
    };
    let sources: BTreeSet<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    println!("Processed {} documents into {} chunks", sources.len(), chunks.len());

    let embedder = get_default_embedder(&settings.embedding)?;
    let builder = StoreBuilder::new(embedder.as_ref()).batch_size(settings.ingest.batch_size);
    let saved = match settings.store.backend {
        Backend::Flat => builder.build_and_save(&chunks, out, |_| Ok(FlatIndex::new()))?,
        Backend::Lance => build_lance(&builder, &chunks, out)?,
    };
    println!("Saved {} vectors to {}", saved, out.display());
    Ok(())
}

#[cfg(feature = "lance")]
fn build_lance(builder: &StoreBuilder<'_>, chunks: &[docrag_core::types::Chunk], out: &Path) -> anyhow::Result<usize> {
    Ok(builder.build_and_save(chunks, out, docrag_vector::LanceIndex::create)?)
}

#[cfg(not(feature = "lance"))]
fn build_lance(_builder: &StoreBuilder<'_>, _chunks: &[docrag_core::types::Chunk], _out: &Path) -> anyhow::Result<usize> {
    anyhow::bail!("store.backend = \"lance\" requires building with --features lance")
}

fn open_retriever<I: PersistentIndex>(settings: &Settings, store_dir: &Path) -> anyhow::Result<Retriever<I>> {
    let embedder = get_default_embedder(&settings.embedding)?;
    let retriever = Retriever::<I>::open(store_dir, embedder)?;
    if !retriever.is_ready() {
        info!("No vector store at {}; run `docrag ingest` first", store_dir.display());
    }
    Ok(retriever)
}

fn query<I: PersistentIndex>(settings: &Settings, store_dir: &Path, question: &str, top_k: usize, json: bool) -> anyhow::Result<()> {
    let retriever = open_retriever::<I>(settings, store_dir)?;
    let results = retriever.retrieve(question, top_k)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }
    Ok(())
}

fn print_results(results: &[RetrievedChunk]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        println!("{}. [{:.4}] {} (chunk {})", i + 1, r.score, r.source, r.chunk_index);
        let preview: String = r.text.chars().take(200).collect();
        let ellipsis = if r.text.chars().count() > 200 { "..." } else { "" };
        println!("   {}{}", preview, ellipsis);
    }
}

fn ask<I: PersistentIndex>(settings: &Settings, store_dir: &Path, question: &str, top_k: usize, json: bool) -> anyhow::Result<()> {
    let retriever = open_retriever::<I>(settings, store_dir)?;
    let answer = AnswerPipeline::default().ask(&retriever, question, top_k)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }
    println!("{}\n", answer.answer);
    if !answer.references.is_empty() {
        println!("References:");
        for r in &answer.references {
            println!("{}", r);
        }
    }
    Ok(())
}

fn inspect<I: PersistentIndex>(store_dir: &Path) -> anyhow::Result<()> {
    let Some(store) = VectorStore::<I>::load(store_dir)? else {
        println!("No vector store at {}", store_dir.display());
        return Ok(());
    };
    print_summary(&store, store_dir);
    Ok(())
}

fn print_summary<I: VectorIndexer>(store: &VectorStore<I>, store_dir: &Path) {
    let sources: BTreeSet<&str> = store.metadata().values().map(|m| m.source.as_str()).collect();
    println!("Store:     {}", store_dir.display());
    println!("Vectors:   {}", store.len());
    println!("Dimension: {}", store.dim().map_or_else(|| "-".to_string(), |d| d.to_string()));
    println!("Sources:   {}", sources.len());
    for source in sources.iter().take(20) {
        println!("  {}", source);
    }
    if sources.len() > 20 {
        println!("  ... and {} more", sources.len() - 20);
    }
}

#[cfg(feature = "lance")]
fn query_lance(settings: &Settings, store_dir: &Path, question: &str, top_k: usize, json: bool) -> anyhow::Result<()> {
    query::<docrag_vector::LanceIndex>(settings, store_dir, question, top_k, json)
}

#[cfg(feature = "lance")]
fn ask_lance(settings: &Settings, store_dir: &Path, question: &str, top_k: usize, json: bool) -> anyhow::Result<()> {
    ask::<docrag_vector::LanceIndex>(settings, store_dir, question, top_k, json)
}

#[cfg(feature = "lance")]
fn inspect_lance(store_dir: &Path) -> anyhow::Result<()> {
    inspect::<docrag_vector::LanceIndex>(store_dir)
}

#[cfg(not(feature = "lance"))]
fn query_lance(_settings: &Settings, _store_dir: &Path, _question: &str, _top_k: usize, _json: bool) -> anyhow::Result<()> {
    anyhow::bail!("store.backend = \"lance\" requires building with --features lance")
}

#[cfg(not(feature = "lance"))]
fn ask_lance(_settings: &Settings, _store_dir: &Path, _question: &str, _top_k: usize, _json: bool) -> anyhow::Result<()> {
    anyhow::bail!("store.backend = \"lance\" requires building with --features lance")
}

#[cfg(not(feature = "lance"))]
fn inspect_lance(_store_dir: &Path) -> anyhow::Result<()> {
    anyhow::bail!("store.backend = \"lance\" requires building with --features lance")
}
