//! Shopsearch vector crate - embedding providers, persisted product
//! collection, ingestion pipeline, and query service.
//!
//! Embeddings come from an OpenAI-compatible remote endpoint (OpenRouter by
//! default) or a deterministic mock. Collections are persisted as one JSON
//! file per collection and searched by brute-force cosine distance.

pub mod embedding;
pub mod index;
pub mod pipeline;
pub mod search;

#[cfg(test)]
pub(crate) mod test_support;

pub use embedding::{DynEmbeddingProvider, EmbeddingProvider, MockEmbedding, OpenRouterEmbedding};
pub use index::{CollectionHandle, IndexStore, QueryHit};
pub use pipeline::{IngestSummary, IngestionPipeline};
pub use search::{QueryService, SearchOutcome};
