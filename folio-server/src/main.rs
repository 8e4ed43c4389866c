use clap::Parser;
use folio_retriever::config::AppConfig;
use folio_retriever::retrieval::indexing_mode::IndexingMode;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Answer questions about a folder of documents over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./folio.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:8000
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory holding the index
    #[arg(long)]
    index_dir: Option<PathBuf>,

    /// Folder to watch for new documents
    #[arg(long)]
    watch_dir: Option<PathBuf>,

    /// full-reindex, continuous-monitoring or read-only
    #[arg(long)]
    mode: Option<IndexingMode>,

    /// Embedding model, must match the one the index was built with
    #[arg(long)]
    model: Option<String>,

    /// Base URL of the completion service
    #[arg(long)]
    completion_url: Option<String>,

    /// Model name sent to the completion service
    #[arg(long)]
    completion_model: Option<String>,
}

impl Args {
    fn apply(self, config: &mut AppConfig) {
        if let Some(bind) = self.bind {
            config.http.bind = bind;
        }
        if let Some(index_dir) = self.index_dir {
            config.index.index_dir = index_dir;
        }
        if let Some(watch_dir) = self.watch_dir {
            config.watcher.watch_dir = watch_dir;
        }
        if let Some(mode) = self.mode {
            config.watcher.mode = mode;
        }
        if let Some(model) = self.model {
            config.index.embedding_model = model;
        }
        if let Some(url) = self.completion_url {
            config.completion.base_url = url;
        }
        if let Some(model) = self.completion_model {
            config.completion.model = model;
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
    args.apply(&mut config);
    config.validate()?;

    folio_server::run_server(config).await
}
