//! Product query service.
//!
//! QueryService embeds the query text, over-fetches `k + 1` neighbours from
//! the collection, drops products whose name is the query itself, and
//! truncates to `k`.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use shopsearch_core::error::{Result, ShopError};
use shopsearch_core::types::ProductMetadata;

use crate::embedding::{DynEmbeddingProvider, EmbeddingProvider};
use crate::index::{CollectionHandle, QueryHit};

/// Extra candidates fetched to make room for an exact-name self-match.
pub const OVERFETCH: usize = 1;

/// Result of a search request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// The query was empty or whitespace; nothing was embedded.
    EmptyQuery,
    /// Nothing survived filtering. `candidates` is the number of raw hits
    /// fetched, so 0 means the collection itself returned nothing.
    NoResults { candidates: usize },
    /// Matching products, most similar first.
    Found { results: Vec<ProductMetadata> },
}

impl SearchOutcome {
    /// Short machine-readable status.
    pub fn status(&self) -> &'static str {
        match self {
            SearchOutcome::EmptyQuery => "empty_query",
            SearchOutcome::NoResults { .. } => "no_results",
            SearchOutcome::Found { .. } => "found",
        }
    }

    /// User-facing guidance for this outcome.
    pub fn message(&self) -> String {
        match self {
            SearchOutcome::EmptyQuery => "Please enter a query to search for products.".to_string(),
            SearchOutcome::NoResults { candidates: 0 } => {
                "No products found. Try changing your query.".to_string()
            }
            SearchOutcome::NoResults { .. } => {
                "No similar products found. Try changing your query.".to_string()
            }
            SearchOutcome::Found { results } => {
                format!("Found {} similar products:", results.len())
            }
        }
    }

    pub fn results(&self) -> &[ProductMetadata] {
        match self {
            SearchOutcome::Found { results } => results,
            _ => &[],
        }
    }
}

/// Serves semantic product search over one collection.
///
/// Built once at startup and shared behind an `Arc`. The serving handle can
/// be swapped after a re-ingestion with [`QueryService::replace_handle`].
pub struct QueryService {
    embedder: Arc<dyn DynEmbeddingProvider>,
    handle: RwLock<CollectionHandle>,
    timeout: Option<Duration>,
}

impl QueryService {
    pub fn new(handle: CollectionHandle, embedder: impl EmbeddingProvider + 'static) -> Self {
        Self::new_dyn(handle, Arc::new(embedder))
    }

    /// Create a query service from a shared dynamic embedding provider.
    pub fn new_dyn(handle: CollectionHandle, embedder: Arc<dyn DynEmbeddingProvider>) -> Self {
        warn_on_model_mismatch(&handle, embedder.as_ref());
        Self {
            embedder,
            handle: RwLock::new(handle),
            timeout: None,
        }
    }

    /// Bound each search (embed + query) by `timeout`. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// A clone of the currently served handle.
    pub fn handle(&self) -> Result<CollectionHandle> {
        self.handle
            .read()
            .map(|h| h.clone())
            .map_err(|e| ShopError::Storage(format!("Lock poisoned: {}", e)))
    }

    /// Serve `handle` from now on. In-flight searches finish on the old one.
    pub fn replace_handle(&self, handle: CollectionHandle) -> Result<()> {
        warn_on_model_mismatch(&handle, self.embedder.as_ref());
        let mut current = self
            .handle
            .write()
            .map_err(|e| ShopError::Storage(format!("Lock poisoned: {}", e)))?;
        *current = handle;
        Ok(())
    }

    /// Search for up to `k` products similar to `query`.
    ///
    /// Empty queries return [`SearchOutcome::EmptyQuery`] without calling
    /// the provider. `k == 0` is a validation error.
    pub async fn search(&self, query: &str, k: usize) -> Result<SearchOutcome> {
        if query.trim().is_empty() {
            return Ok(SearchOutcome::EmptyQuery);
        }
        if k == 0 {
            return Err(ShopError::Validation(
                "number of results must be at least 1".to_string(),
            ));
        }

        let fetch = k.saturating_add(OVERFETCH);
        let hits = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.nearest(query, fetch))
                .await
                .map_err(|_| {
                    ShopError::Timeout(format!("search did not finish within {:?}", limit))
                })??,
            None => self.nearest(query, fetch).await?,
        };

        let candidates = hits.len();
        let results = exclude_exact_matches(query, hits, k);
        debug!(candidates, returned = results.len(), k, "Search finished");

        if results.is_empty() {
            Ok(SearchOutcome::NoResults { candidates })
        } else {
            Ok(SearchOutcome::Found { results })
        }
    }

    async fn nearest(&self, query: &str, fetch: usize) -> Result<Vec<QueryHit>> {
        let vector = self.embedder.embed_single_boxed(query).await?;
        let handle = self.handle()?;
        handle.query(&vector, fetch)
    }
}

/// Keep hits whose name differs from the query (case-insensitive, trimmed),
/// stopping once `k` are collected.
pub fn exclude_exact_matches(query: &str, hits: Vec<QueryHit>, k: usize) -> Vec<ProductMetadata> {
    let needle = normalize(query);
    hits.into_iter()
        .map(|hit| hit.metadata)
        .filter(|meta| normalize(&meta.name) != needle)
        .take(k)
        .collect()
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn warn_on_model_mismatch(handle: &CollectionHandle, embedder: &dyn DynEmbeddingProvider) {
    if !handle.is_empty() && handle.model() != embedder.model() {
        warn!(
            collection = %handle.name(),
            collection_model = %handle.model(),
            query_model = %embedder.model(),
            "Query embeddings come from a different model than the collection; results will be meaningless"
        );
    }
}
