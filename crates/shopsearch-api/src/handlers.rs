//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query parameters or a JSON body via axum
//! extractors, calls into the shared services, and returns JSON.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use shopsearch_core::config::SearchConfig;
use shopsearch_core::types::{ProductMetadata, ProductRecord};
use shopsearch_vector::IngestSummary;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub k: Option<usize>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    /// One of `found`, `no_results`, `empty_query`.
    pub status: String,
    pub message: String,
    pub results: Vec<ProductMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub collection: String,
    pub indexed_products: usize,
    pub model: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /search - semantic product search.
///
/// A missing or blank `q` is answered with the `empty_query` status rather
/// than an error. `k` is clamped into `1..=search.max_k`.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params.q.unwrap_or_default();
    let k = effective_k(params.k, &state.config.search);

    let outcome = state.query_service.search(&query, k).await?;

    Ok(Json(SearchResponse {
        status: outcome.status().to_string(),
        message: outcome.message(),
        results: outcome.results().to_vec(),
    }))
}

/// POST /ingest - rebuild the collection from a JSON array of records.
///
/// On success the query service starts serving the new collection.
/// Concurrent ingests are serialised, so the served handle always matches
/// the collection on disk.
pub async fn ingest(
    State(state): State<AppState>,
    Json(records): Json<Vec<ProductRecord>>,
) -> Result<Json<IngestSummary>, ApiError> {
    let _guard = state.ingest_lock.lock().await;
    let (summary, handle) = state.pipeline.ingest(records).await?;
    state.query_service.replace_handle(handle)?;
    Ok(Json(summary))
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let handle = state.query_service.handle()?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        collection: handle.name().to_string(),
        indexed_products: handle.len(),
        model: handle.model().to_string(),
    }))
}

fn effective_k(requested: Option<usize>, config: &SearchConfig) -> usize {
    let max_k = config.max_k.max(1);
    requested.unwrap_or(config.default_k).clamp(1, max_k)
}
