use anyhow::Context;
use clap::{Parser, Subcommand};
use folio_retriever::{
    config::AppConfig,
    retrieval::{indexing_mode::IndexingMode, loader::Document, pipeline::IndexOutcome},
    services::IndexServices,
    storage::{ChunkFilter, ChunkStore},
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Index a folder of documents and query the folio vector index.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./folio.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the index, overriding the configuration
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Embedding model, overriding the configuration
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the documents folder and index new files until interrupted
    Watch {
        /// Folder to watch, overriding the configuration
        #[arg(long)]
        watch_dir: Option<PathBuf>,
        /// full-reindex, continuous-monitoring or read-only
        #[arg(long)]
        mode: Option<IndexingMode>,
    },
    /// Index the given files once
    Index {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List chunks in the index
    List {
        /// Only chunks from this exact source path
        #[arg(long)]
        source: Option<String>,
        /// Only chunks whose source path starts with this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Limit number of results
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Get a specific chunk by ID
    Get {
        /// Chunk ID
        id: i64,
        /// Output format
        #[arg(short, long, default_value = "full")]
        format: OutputFormat,
    },
    /// Retrieve the chunks most similar to a question
    Search {
        query: String,
        /// Maximum number of results (defaults to index.top_k)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show index statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(index_dir) = args.index_dir {
        config.index.index_dir = index_dir;
    }
    if let Some(model) = args.model {
        config.index.embedding_model = model;
    }
    if let Commands::Watch { watch_dir, mode } = &args.command {
        if let Some(watch_dir) = watch_dir {
            config.watcher.watch_dir = watch_dir.clone();
        }
        if let Some(mode) = mode {
            config.watcher.mode = *mode;
        }
    }

    let services = IndexServices::open(&config).await?;
    let result = run_command(&services, args.command).await;
    services.close().await;
    result
}

async fn run_command(services: &IndexServices, command: Commands) -> anyhow::Result<()> {
    let store = services.store();

    match command {
        Commands::Watch { .. } => {
            let runtime = services
                .start_indexing()
                .await?
                .context("Indexing mode is read-only, nothing to watch")?;
            println!(
                "Watching {} (Ctrl-C to stop)",
                services.config().watcher.watch_dir.display()
            );

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            println!("Shutting down, waiting for in-flight files...");
            runtime.shutdown().await;
            Ok(())
        }
        Commands::Index { files } => {
            let pipeline = services.pipeline()?;
            let mut failed = 0;

            for file in files {
                match pipeline.index_document(&Document::from_path(&file)).await {
                    Ok(IndexOutcome::Indexed(result)) => println!(
                        "Indexed {}: {} chunks ({} new) in {:?}",
                        result.path.display(),
                        result.chunks_created,
                        result.records_inserted,
                        result.processing_time
                    ),
                    Ok(IndexOutcome::Skipped { path, reason }) => {
                        println!("Skipped {}: {}", path.display(), reason)
                    }
                    Err(e) => {
                        failed += 1;
                        eprintln!("Failed: {e}");
                    }
                }
            }

            if failed > 0 {
                anyhow::bail!("{failed} file(s) could not be indexed");
            }
            Ok(())
        }
        Commands::List {
            source,
            prefix,
            limit,
            format,
        } => {
            let filter = ChunkFilter {
                source_path: source,
                path_prefix: prefix,
                limit: Some(limit),
            };
            let chunk_metadata = store.list_chunks(filter).await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&chunk_metadata)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} chunks:", chunk_metadata.len());
                    for metadata in chunk_metadata {
                        println!(
                            "  ID: {} | File: {} | Page: {} | Seq: {} | Chars: {}",
                            metadata.id,
                            metadata.source_path,
                            format_page(metadata.page),
                            metadata.sequence,
                            metadata.char_len
                        );
                    }
                }
                OutputFormat::Full => {
                    for metadata in chunk_metadata {
                        if let Some(chunk) = store.get_chunk(metadata.id).await? {
                            println!("Chunk ID: {}", chunk.id);
                            println!("File: {}", chunk.source_path);
                            println!("Page: {}", format_page(chunk.page));
                            println!("Chars: {}-{}", chunk.char_start, chunk.char_end);
                            println!("Content:\n{}", chunk.content);
                            println!("---");
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::Get { id, format } => {
            let Some(chunk) = store.get_chunk(id).await? else {
                println!("Chunk with ID {id} not found");
                return Ok(());
            };

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&chunk)?);
                }
                OutputFormat::Summary => {
                    println!("Chunk ID: {}", chunk.id);
                    println!("File: {}", chunk.source_path);
                    println!("Sequence: {}", chunk.sequence);
                    println!(
                        "Content preview: {}",
                        chunk.content.chars().take(100).collect::<String>()
                    );
                }
                OutputFormat::Full => {
                    println!("Chunk ID: {}", chunk.id);
                    println!("File: {}", chunk.source_path);
                    println!("Page: {}", format_page(chunk.page));
                    println!("Sequence: {}", chunk.sequence);
                    println!("Chars: {}-{}", chunk.char_start, chunk.char_end);
                    println!("Content:\n{}", chunk.content);
                }
            }
            Ok(())
        }
        Commands::Search {
            query,
            limit,
            format,
        } => {
            let result = services.retriever().retrieve(&query, limit).await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} similar chunks:", result.len());
                    for hit in &result.hits {
                        println!(
                            "  Similarity: {:.3} | ID: {} | File: {} | Page: {}",
                            hit.score,
                            hit.id,
                            hit.source_path,
                            format_page(hit.page)
                        );
                    }
                }
                OutputFormat::Full => {
                    for hit in &result.hits {
                        println!("Similarity: {:.3}", hit.score);
                        println!("Chunk ID: {}", hit.id);
                        println!("File: {}", hit.source_path);
                        println!("Page: {}", format_page(hit.page));
                        println!("Content:\n{}", hit.text);
                        println!("---");
                    }
                }
            }
            Ok(())
        }
        Commands::Stats { format } => {
            let stats = store.stats().await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                OutputFormat::Summary | OutputFormat::Full => {
                    println!("Index Statistics:");
                    println!(
                        "  Location: {}",
                        services
                            .index()
                            .location()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "<memory>".to_string())
                    );
                    println!("  Documents: {}", stats.documents);
                    println!("  Chunks: {}", stats.chunks);
                    println!(
                        "  Embedding model: {}",
                        stats.embedding_model.as_deref().unwrap_or("<none>")
                    );
                    if let Some(dimension) = stats.dimension {
                        println!("  Dimension: {dimension}");
                    }
                    if let Some(at) = stats.last_indexed_at {
                        println!("  Last indexed: {at} UTC");
                    }
                }
            }
            Ok(())
        }
    }
}

fn format_page(page: Option<u32>) -> String {
    page.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}
