//! CLI argument definitions for the shopsearch binary.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Env var naming the configuration file.
pub const CONFIG_ENV: &str = "SHOPSEARCH_CONFIG";

/// Config file used when neither `--config` nor the env var is set.
pub const DEFAULT_CONFIG_FILE: &str = "shopsearch.toml";

/// Shopsearch - semantic search over a product catalog.
#[derive(Parser, Debug)]
#[command(name = "shopsearch", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Rebuild the product collection from the catalog file.
    Ingest {
        /// Catalog file to read instead of the configured one.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Search the collection and print similar products.
    Search {
        /// Free-text query or an exact product name.
        query: String,
        /// Number of products to return.
        #[arg(short = 'k', long = "k")]
        k: Option<usize>,
    },
    /// Serve the HTTP API.
    Serve {
        /// API server port.
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SHOPSEARCH_CONFIG env var > ./shopsearch.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(std::env::var(CONFIG_ENV).ok())
    }

    fn resolve_config_path_with(&self, env_value: Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        match env_value {
            Some(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Whether the config path was chosen explicitly rather than defaulted.
    pub fn config_is_explicit(&self) -> bool {
        self.config.is_some() || std::env::var(CONFIG_ENV).is_ok_and(|v| !v.trim().is_empty())
    }
}
