//! Shopsearch API crate - axum HTTP server and route handlers.
//!
//! Exposes product search (`GET /search`), catalog re-ingestion
//! (`POST /ingest`) and a health check (`GET /health`).

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
