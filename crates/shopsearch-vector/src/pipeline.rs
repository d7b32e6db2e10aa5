//! Catalog ingestion pipeline.
//!
//! The IngestionPipeline turns raw product records into indexable units and
//! drives a full rebuild of the vector collection. Every run replaces the
//! whole collection; there is no diffing against the previous state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use shopsearch_core::catalog::CatalogSource;
use shopsearch_core::error::Result;
use shopsearch_core::types::{IndexableUnit, ProductRecord};

use crate::embedding::{DynEmbeddingProvider, EmbeddingProvider};
use crate::index::{CollectionHandle, IndexStore};

/// Outcome counts of one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Records with both `id` and `name`, now in the collection.
    pub admitted_count: usize,
    /// Records dropped for lacking `id` or `name`.
    pub rejected_count: usize,
}

/// Records in, rebuilt collection out.
///
/// 1. Admission: drop records without `id` or `name`
/// 2. Derivation of embedding text and metadata
/// 3. Full collection rebuild through the [`IndexStore`]
pub struct IngestionPipeline {
    embedder: Arc<dyn DynEmbeddingProvider>,
    store: IndexStore,
}

impl IngestionPipeline {
    pub fn new(embedder: impl EmbeddingProvider + 'static, store: IndexStore) -> Self {
        Self {
            embedder: Arc::new(embedder),
            store,
        }
    }

    /// Create a pipeline from a shared dynamic embedding provider.
    pub fn new_dyn(embedder: Arc<dyn DynEmbeddingProvider>, store: IndexStore) -> Self {
        Self { embedder, store }
    }

    /// Split records into indexable units and a rejected count.
    pub fn prepare(records: &[ProductRecord]) -> (Vec<IndexableUnit>, usize) {
        let mut units = Vec::with_capacity(records.len());
        let mut rejected = 0;
        for record in records {
            match IndexableUnit::from_record(record) {
                Some(unit) => units.push(unit),
                None => {
                    rejected += 1;
                    debug!(
                        id = ?record.id,
                        name = ?record.name,
                        "Rejecting record without id or name"
                    );
                }
            }
        }
        (units, rejected)
    }

    /// Rebuild the collection from `records`.
    ///
    /// A provider failure aborts the run; what is left on disk depends on
    /// the store's rebuild policy.
    pub async fn ingest(
        &self,
        records: Vec<ProductRecord>,
    ) -> Result<(IngestSummary, CollectionHandle)> {
        let (units, rejected_count) = Self::prepare(&records);
        let summary = IngestSummary {
            admitted_count: units.len(),
            rejected_count,
        };

        let handle = self.store.rebuild(self.embedder.as_ref(), units).await?;

        info!(
            admitted = summary.admitted_count,
            rejected = summary.rejected_count,
            collection = %handle.name(),
            "Catalog ingested"
        );
        Ok((summary, handle))
    }

    /// Pull every record from `source` and ingest them.
    pub async fn ingest_from(
        &self,
        source: &dyn CatalogSource,
    ) -> Result<(IngestSummary, CollectionHandle)> {
        let records = source.produce()?;
        self.ingest(records).await
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn embedder(&self) -> Arc<dyn DynEmbeddingProvider> {
        Arc::clone(&self.embedder)
    }
}
