//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use shopsearch_core::config::ShopConfig;
use shopsearch_vector::{IngestionPipeline, QueryService};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, read-only after startup.
    pub config: Arc<ShopConfig>,
    /// Serves `/search`; its handle is swapped after each ingest.
    pub query_service: Arc<QueryService>,
    /// Rebuilds the collection for `/ingest`.
    pub pipeline: Arc<IngestionPipeline>,
    /// Held across rebuild and handle swap so ingests apply in order.
    pub ingest_lock: Arc<Mutex<()>>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ShopConfig, query_service: QueryService, pipeline: IngestionPipeline) -> Self {
        Self {
            config: Arc::new(config),
            query_service: Arc::new(query_service),
            pipeline: Arc::new(pipeline),
            ingest_lock: Arc::new(Mutex::new(())),
            start_time: Instant::now(),
        }
    }
}
