mod routes;

use clap::Parser;
use doc_search_core::PipelineConfig;
use routes::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-search-server", version)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8000", env = "DOC_SEARCH_LISTEN")]
    listen: SocketAddr,

    /// Base URL of the text-generation backend.
    #[arg(long, default_value = "http://localhost:11434", env = "GENERATION_URL")]
    generation_url: String,

    /// Model used for classification and simulated OCR.
    #[arg(long, default_value = "llama3.1", env = "GENERATION_MODEL")]
    generation_model: String,

    /// Base URL of the embedding backend.
    #[arg(long, default_value = "http://localhost:11434", env = "EMBEDDING_URL")]
    embedding_url: String,

    /// Embedding model identifier.
    #[arg(long, default_value = "nomic-embed-text", env = "EMBEDDING_MODEL")]
    embedding_model: String,

    /// Dimensionality of the embedding vectors.
    #[arg(long, default_value = "768")]
    embedding_dimensions: usize,

    /// Timeout for every outbound backend call, in seconds.
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,

    /// Directory where uploaded blobs are stored.
    #[arg(long, default_value = "uploads", env = "DOC_SEARCH_UPLOAD_DIR")]
    upload_dir: PathBuf,

    /// Maximum accepted upload size in bytes.
    #[arg(long, default_value = "26214400")]
    max_upload_bytes: usize,

    /// Maximum hits returned per search query.
    #[arg(long, default_value = "10")]
    search_top_k: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = PipelineConfig {
        generation_url: cli.generation_url,
        generation_model: cli.generation_model,
        embedding_url: cli.embedding_url,
        embedding_model: cli.embedding_model,
        embedding_dimensions: cli.embedding_dimensions,
        request_timeout: Duration::from_secs(cli.request_timeout_secs),
        search_top_k: cli.search_top_k,
        ..PipelineConfig::default()
    };

    tokio::fs::create_dir_all(&cli.upload_dir).await?;

    let state = AppState::new(&config, cli.upload_dir);
    let app = routes::router(state, cli.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(
        addr = %cli.listen,
        version = env!("CARGO_PKG_VERSION"),
        "doc-search-server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(cause) = tokio::signal::ctrl_c().await {
        tracing::warn!(%cause, "could not install shutdown handler");
    }
}
