//! Persisted product vector collection with brute-force cosine search.
//!
//! A collection lives in one JSON file, `<storage_dir>/<collection>.json`,
//! holding a manifest (model, dimensionality, build time) and every entry.
//! Collections are only ever replaced wholesale by [`IndexStore::rebuild`];
//! there is no per-record update path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shopsearch_core::config::{IndexConfig, RebuildPolicy};
use shopsearch_core::error::{Result, ShopError};
use shopsearch_core::types::{IndexableUnit, IndexedVector, ProductMetadata};

use crate::embedding::DynEmbeddingProvider;

/// On-disk format version. Bump when `CollectionFile` changes shape.
const FORMAT_VERSION: u32 = 1;

/// Default number of texts per embedding call during a rebuild.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// A single hit returned from a collection query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub metadata: ProductMetadata,
    /// Cosine distance (`1 - cosine similarity`); lower is more similar.
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionManifest {
    version: u32,
    collection: String,
    model: String,
    dimensions: usize,
    count: usize,
    built_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct CollectionFileRef<'a> {
    manifest: &'a CollectionManifest,
    entries: &'a [IndexedVector],
}

#[derive(Deserialize)]
struct CollectionFile {
    manifest: CollectionManifest,
    entries: Vec<IndexedVector>,
}

// =============================================================================
// CollectionHandle (Ready)
// =============================================================================

/// A ready-to-query collection bound to its storage location and model.
///
/// Entries are held in memory behind an `Arc`, so cloning a handle is cheap
/// and a handle stays valid even if the files on disk are replaced.
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    manifest: Arc<CollectionManifest>,
    location: PathBuf,
    entries: Arc<Vec<IndexedVector>>,
}

impl CollectionHandle {
    pub fn name(&self) -> &str {
        &self.manifest.collection
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Model the collection's vectors were built with.
    pub fn model(&self) -> &str {
        &self.manifest.model
    }

    /// Vector dimensionality, 0 for an empty collection.
    pub fn dimensions(&self) -> usize {
        self.manifest.dimensions
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.manifest.built_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` entries nearest to `vector`, most similar first.
    ///
    /// Ties keep insertion order. An empty collection yields an empty list.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        if k == 0 {
            return Err(ShopError::Validation("k must be at least 1".to_string()));
        }
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if vector.len() != self.manifest.dimensions {
            warn!(
                collection = %self.manifest.collection,
                expected = self.manifest.dimensions,
                actual = vector.len(),
                "Query vector dimensionality does not match collection"
            );
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, (1.0 - cosine_similarity(vector, &entry.vector)) as f32))
            .collect();

        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, distance)| QueryHit {
                metadata: self.entries[i].metadata.clone(),
                distance,
            })
            .collect())
    }
}

// =============================================================================
// CollectionBuilder (Building)
// =============================================================================

/// A collection under construction. Consumed by [`CollectionBuilder::finish`].
#[derive(Debug)]
struct CollectionBuilder {
    collection: String,
    model: String,
    dimensions: Option<usize>,
    entries: Vec<IndexedVector>,
}

impl CollectionBuilder {
    fn new(collection: &str, model: &str, capacity: usize) -> Self {
        Self {
            collection: collection.to_string(),
            model: model.to_string(),
            dimensions: None,
            entries: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, unit: IndexableUnit, vector: Vec<f32>) -> Result<()> {
        match self.dimensions {
            None => self.dimensions = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err(ShopError::Provider(format!(
                    "embedding for '{}' has {} dimensions, expected {}",
                    unit.metadata.id,
                    vector.len(),
                    d
                )));
            }
            Some(_) => {}
        }
        self.entries.push(IndexedVector {
            vector,
            embedding_text: unit.embedding_text,
            metadata: unit.metadata,
        });
        Ok(())
    }

    fn finish(self, location: PathBuf) -> CollectionHandle {
        let manifest = CollectionManifest {
            version: FORMAT_VERSION,
            collection: self.collection,
            model: self.model,
            dimensions: self.dimensions.unwrap_or(0),
            count: self.entries.len(),
            built_at: Utc::now(),
        };
        CollectionHandle {
            manifest: Arc::new(manifest),
            location,
            entries: Arc::new(self.entries),
        }
    }
}

// =============================================================================
// IndexStore
// =============================================================================

/// Owns one named collection at one storage directory.
///
/// Rebuilds take the store's write lock and loads take its read lock, so a
/// load never observes a half-written or deleted collection while a rebuild
/// on the same store is in flight.
#[derive(Debug, Clone)]
pub struct IndexStore {
    location: PathBuf,
    collection: String,
    policy: RebuildPolicy,
    batch_size: usize,
    lock: Arc<RwLock<()>>,
}

impl IndexStore {
    pub fn new(location: impl Into<PathBuf>, collection: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            collection: collection.into(),
            policy: RebuildPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            lock: Arc::new(RwLock::new(())),
        }
    }

    /// Build a store from the `[index]` config section.
    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(config.storage_path(), config.collection_name.clone())
            .with_policy(config.rebuild_policy)
    }

    pub fn with_policy(mut self, policy: RebuildPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cap on texts per embedding call. Values below 1 are treated as 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn policy(&self) -> RebuildPolicy {
        self.policy
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Path of the collection file.
    pub fn collection_path(&self) -> PathBuf {
        self.location
            .join(format!("{}.json", encode_file_stem(&self.collection)))
    }

    /// Whether a persisted collection file exists.
    pub fn exists(&self) -> bool {
        self.collection_path().is_file()
    }

    /// An empty in-memory handle for this collection, never written to disk.
    pub fn empty_handle(&self, model: &str) -> CollectionHandle {
        CollectionBuilder::new(&self.collection, model, 0).finish(self.location.clone())
    }

    /// Load the persisted collection, or fall back to an empty handle when
    /// none has been built yet.
    pub async fn load_or_empty(&self, model: &str) -> Result<CollectionHandle> {
        match self.load().await {
            Ok(handle) => Ok(handle),
            Err(ShopError::IndexNotFound { .. }) => {
                warn!(
                    collection = %self.collection,
                    location = %self.location.display(),
                    "No collection built yet; serving an empty one"
                );
                Ok(self.empty_handle(model))
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the collection with freshly embedded `units`.
    ///
    /// With [`RebuildPolicy::DeleteFirst`] the old collection is removed
    /// before embedding starts, so a provider failure leaves nothing behind.
    /// With [`RebuildPolicy::StagedSwap`] the new file is written under a
    /// temporary name and renamed over the old one only after every unit
    /// was embedded.
    pub async fn rebuild(
        &self,
        embedder: &dyn DynEmbeddingProvider,
        units: Vec<IndexableUnit>,
    ) -> Result<CollectionHandle> {
        let _guard = self.lock.write().await;
        let path = self.collection_path();

        info!(
            collection = %self.collection,
            location = %self.location.display(),
            units = units.len(),
            policy = ?self.policy,
            "Rebuilding collection"
        );

        if self.policy == RebuildPolicy::DeleteFirst {
            remove_if_exists(&path).await?;
        }

        let handle = self.embed_units(embedder, units).await?;
        persist(&handle, &path).await?;

        info!(
            collection = %self.collection,
            count = handle.len(),
            dimensions = handle.dimensions(),
            "Collection rebuilt"
        );
        Ok(handle)
    }

    /// Attach to the persisted collection without re-embedding.
    ///
    /// Fails with [`ShopError::IndexNotFound`] if no collection of this name
    /// exists at the location.
    pub async fn load(&self) -> Result<CollectionHandle> {
        let _guard = self.lock.read().await;
        let path = self.collection_path();
        let collection = self.collection.clone();
        let location = self.location.clone();

        let handle = tokio::task::spawn_blocking(move || read_collection(&path, &collection, location))
            .await
            .map_err(|e| ShopError::Storage(format!("Load task panicked: {}", e)))??;

        info!(
            collection = %handle.name(),
            count = handle.len(),
            model = %handle.model(),
            "Collection loaded"
        );
        Ok(handle)
    }

    async fn embed_units(
        &self,
        embedder: &dyn DynEmbeddingProvider,
        units: Vec<IndexableUnit>,
    ) -> Result<CollectionHandle> {
        let texts: Vec<String> = units.iter().map(|u| u.embedding_text.clone()).collect();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            let embedded = embedder.embed_batch_boxed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(ShopError::Provider(format!(
                    "provider returned {} embeddings for {} inputs",
                    embedded.len(),
                    batch.len()
                )));
            }
            debug!(batch = batch_no, size = batch.len(), "Embedded batch");
            vectors.extend(embedded);
        }

        let mut builder = CollectionBuilder::new(&self.collection, embedder.model(), units.len());
        for (unit, vector) in units.into_iter().zip(vectors) {
            builder.push(unit, vector)?;
        }
        Ok(builder.finish(self.location.clone()))
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "Deleted previous collection");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write the collection to a temporary file next to `path`, then rename it
/// into place.
async fn persist(handle: &CollectionHandle, path: &Path) -> Result<()> {
    let manifest = Arc::clone(&handle.manifest);
    let entries = Arc::clone(&handle.entries);
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(&CollectionFileRef {
            manifest: &manifest,
            entries: &entries,
        })?;

        let staging = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        std::fs::write(&staging, &bytes)?;
        if let Err(e) = std::fs::rename(&staging, &path) {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }
        debug!(path = %path.display(), bytes = bytes.len(), "Collection persisted");
        Ok(())
    })
    .await
    .map_err(|e| ShopError::Storage(format!("Persist task panicked: {}", e)))?
}

fn read_collection(path: &Path, collection: &str, location: PathBuf) -> Result<CollectionHandle> {
    let not_found = || ShopError::IndexNotFound {
        collection: collection.to_string(),
        location: location.clone(),
    };

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };
    let file: CollectionFile = serde_json::from_slice(&bytes)?;

    if file.manifest.collection != collection {
        return Err(not_found());
    }
    if file.manifest.version != FORMAT_VERSION {
        return Err(ShopError::Storage(format!(
            "unsupported collection format version {}",
            file.manifest.version
        )));
    }
    if file.manifest.count != file.entries.len() {
        return Err(ShopError::Storage(format!(
            "collection manifest lists {} entries but file holds {}",
            file.manifest.count,
            file.entries.len()
        )));
    }

    Ok(CollectionHandle {
        manifest: Arc::new(file.manifest),
        location,
        entries: Arc::new(file.entries),
    })
}

/// Encode a collection name as a file stem. ASCII letters, digits, `-` and
/// `_` pass through; every other byte becomes `%XX`, so distinct names never
/// share a file.
fn encode_file_stem(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
