use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, ShopError};

/// Top-level configuration for the product search service.
///
/// Loaded from `shopsearch.toml` by default. Every section falls back to its
/// defaults when absent, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl ShopConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ShopConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Where the offline ingestion flow reads products from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Markdown catalog file.
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "base.md".to_string(),
        }
    }
}

/// Remote embedding endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of the OpenAI-compatible API (without `/embeddings`).
    pub base_url: String,
    /// Embedding model identifier.
    pub model: String,
    /// Inline API key. Prefer the environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    /// Sent as `HTTP-Referer` on every call.
    pub site_url: String,
    /// Sent as `X-Title` on every call.
    pub site_name: String,
    /// Per-request timeout for the remote call.
    pub timeout_secs: u64,
    /// Maximum number of texts per remote batch call during a rebuild.
    pub max_batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-embedding-001".to_string(),
            api_key: None,
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            site_url: "http://localhost".to_string(),
            site_name: "Product Search".to_string(),
            timeout_secs: 30,
            max_batch_size: 256,
        }
    }
}

impl EmbeddingConfig {
    /// Resolve the API key from the config file or the process environment.
    ///
    /// Fails with [`ShopError::MissingCredential`] if neither yields a
    /// non-blank value.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Same as [`resolve_api_key`](Self::resolve_api_key) with an explicit
    /// environment lookup.
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| lookup(&self.api_key_env).filter(|k| !k.trim().is_empty()))
            .map(|k| k.trim().to_string())
            .ok_or_else(|| {
                ShopError::MissingCredential(format!(
                    "{} is not set and embedding.api_key is empty",
                    self.api_key_env
                ))
            })
    }
}

/// How a rebuild treats the collection already on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildPolicy {
    /// Delete the existing collection, then build in place. A failed rebuild
    /// leaves no collection behind.
    #[default]
    DeleteFirst,
    /// Build next to the existing collection and swap it in only on success.
    StagedSwap,
}

/// Vector index location and lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the persisted collection. `~/` is expanded.
    pub storage_dir: String,
    pub collection_name: String,
    pub rebuild_policy: RebuildPolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            storage_dir: "./product_index".to_string(),
            collection_name: "products".to_string(),
            rebuild_policy: RebuildPolicy::DeleteFirst,
        }
    }
}

impl IndexConfig {
    /// The storage directory with `~` expanded.
    pub fn storage_path(&self) -> PathBuf {
        expand_home(&self.storage_dir)
    }
}

/// Query defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results when the caller does not ask for a count.
    pub default_k: usize,
    /// Upper bound on the number of results a caller may request.
    pub max_k: usize,
    /// Timeout for one search request (embed + query). 0 disables it.
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_k: 10,
            timeout_secs: 30,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}
