//! Shopsearch binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Resolve the embedding credential (missing key is fatal)
//! 4. Dispatch to `ingest`, `search` or `serve`

mod cli;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use shopsearch_api::routes;
use shopsearch_api::state::AppState;
use shopsearch_core::catalog::MarkdownCatalog;
use shopsearch_core::config::{expand_home, ShopConfig};
use shopsearch_core::error::{Result, ShopError};
use shopsearch_vector::embedding::{DynEmbeddingProvider, OpenRouterEmbedding};
use shopsearch_vector::{IndexStore, IngestionPipeline, QueryService, SearchOutcome};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let config = load_config(&config_file, args.config_is_explicit());

    let log_level = args
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.general.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&log_level);

    tracing::info!("Starting shopsearch v{}", env!("CARGO_PKG_VERSION"));

    let result = match config {
        Ok(config) => run(args.command, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, fatal = e.is_fatal(), "shopsearch failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load the config file. A missing default file falls back to defaults; an
/// explicitly requested file must exist and parse.
fn load_config(path: &Path, explicit: bool) -> Result<ShopConfig> {
    if !explicit && !path.exists() {
        return Ok(ShopConfig::default());
    }
    ShopConfig::load(path)
        .map_err(|e| ShopError::Config(format!("cannot load {}: {}", path.display(), e)))
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(command: Command, config: ShopConfig) -> Result<()> {
    // Fail before touching the index or binding a port.
    let embedder: Arc<dyn DynEmbeddingProvider> =
        Arc::new(OpenRouterEmbedding::from_config(&config.embedding)?);
    tracing::info!(model = %embedder.model(), "Embedding provider ready");

    let store = IndexStore::from_config(&config.index).with_batch_size(config.embedding.max_batch_size);

    match command {
        Command::Ingest { catalog } => {
            let catalog_path = catalog.unwrap_or_else(|| expand_home(&config.catalog.path));
            ingest(embedder, store, catalog_path).await
        }
        Command::Search { query, k } => {
            let k = k.unwrap_or(config.search.default_k);
            search(embedder, store, &config, &query, k).await
        }
        Command::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(embedder, store, config).await
        }
    }
}

async fn ingest(
    embedder: Arc<dyn DynEmbeddingProvider>,
    store: IndexStore,
    catalog_path: PathBuf,
) -> Result<()> {
    let catalog = MarkdownCatalog::new(catalog_path);
    let pipeline = IngestionPipeline::new_dyn(embedder, store);
    let (summary, handle) = pipeline.ingest_from(&catalog).await?;

    println!(
        "Indexed {} products ({} rejected) into collection '{}' at {}",
        summary.admitted_count,
        summary.rejected_count,
        handle.name(),
        handle.location().display()
    );
    Ok(())
}

async fn search(
    embedder: Arc<dyn DynEmbeddingProvider>,
    store: IndexStore,
    config: &ShopConfig,
    query: &str,
    k: usize,
) -> Result<()> {
    let handle = store.load().await.map_err(|e| {
        if matches!(e, ShopError::IndexNotFound { .. }) {
            tracing::warn!("Run `shopsearch ingest` first to build the collection");
        }
        e
    })?;
    let service = QueryService::new_dyn(handle, embedder)
        .with_timeout(Duration::from_secs(config.search.timeout_secs));

    let outcome = service.search(query, k).await?;
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &SearchOutcome) {
    println!("{}", outcome.message());
    for (i, product) in outcome.results().iter().enumerate() {
        println!(
            "{}. {} [{}] | {} | {}",
            i + 1,
            product.name,
            product.id,
            product.category,
            product.price
        );
    }
}

async fn serve(
    embedder: Arc<dyn DynEmbeddingProvider>,
    store: IndexStore,
    config: ShopConfig,
) -> Result<()> {
    let handle = store.load_or_empty(embedder.model()).await?;
    tracing::info!(
        collection = %handle.name(),
        products = handle.len(),
        "Serving collection"
    );

    let query_service = QueryService::new_dyn(handle, Arc::clone(&embedder))
        .with_timeout(Duration::from_secs(config.search.timeout_secs));
    let pipeline = IngestionPipeline::new_dyn(embedder, store);

    let server = config.server.clone();
    let state = AppState::new(config, query_service, pipeline);
    routes::start_server(&server, state).await
}
