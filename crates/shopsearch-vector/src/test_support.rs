//! Embedding doubles shared by the unit tests in this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use shopsearch_core::error::{Result, ShopError};

use crate::embedding::{EmbeddingProvider, MockEmbedding};

/// Always fails, like an unreachable or rejecting remote endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingEmbedding;

impl EmbeddingProvider for FailingEmbedding {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(ShopError::Provider("simulated outage".to_string()))
    }

    async fn embed_single(&self, _text: &str) -> Result<Vec<f32>> {
        Err(ShopError::Provider("simulated outage".to_string()))
    }

    fn model(&self) -> &str {
        "failing"
    }
}

/// Wraps [`MockEmbedding`] and records every call.
#[derive(Debug, Default)]
pub struct RecordingEmbedding {
    inner: MockEmbedding,
    batches: Mutex<Vec<usize>>,
    singles: AtomicUsize,
}

impl RecordingEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: MockEmbedding::with_dimensions(dimensions),
            batches: Mutex::new(Vec::new()),
            singles: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MockEmbedding {
        &self.inner
    }

    /// Sizes of the batch calls made so far, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn single_calls(&self) -> usize {
        self.singles.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for RecordingEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batches.lock().unwrap().push(texts.len());
        self.inner.embed_batch(texts).await
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        self.singles.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_single(text).await
    }

    fn model(&self) -> &str {
        EmbeddingProvider::model(&self.inner)
    }
}
