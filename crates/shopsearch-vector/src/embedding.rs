//! Embedding provider trait and implementations.
//!
//! - `OpenRouterEmbedding` calls an OpenAI-compatible `/embeddings` endpoint
//!   (OpenRouter by default) over HTTPS. This is the production backend.
//! - `MockEmbedding` provides deterministic hash-based vectors for testing.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use shopsearch_core::config::EmbeddingConfig;
use shopsearch_core::error::{Result, ShopError};

/// Converts text into fixed-dimensional vectors.
///
/// One provider instance is bound to one model; every vector it returns has
/// that model's dimensionality.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts with a single remote call.
    ///
    /// The output is positionally aligned with `texts`. An empty batch
    /// returns an empty result without calling the backend.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    /// Embed one query text. Uses the single-input request form.
    fn embed_single(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Identifier of the model producing the vectors.
    fn model(&self) -> &str;
}

/// Boxed future returned by [`DynEmbeddingProvider`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`EmbeddingProvider`] for dynamic dispatch.
///
/// `EmbeddingProvider` returns `impl Future` and so cannot be made into a
/// trait object. This trait boxes the futures instead, allowing
/// `Arc<dyn DynEmbeddingProvider>` to be stored in services without generics.
/// Every `EmbeddingProvider` implements it through the blanket impl below.
pub trait DynEmbeddingProvider: Send + Sync {
    fn embed_batch_boxed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;

    fn embed_single_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;

    fn model(&self) -> &str;
}

impl<T: EmbeddingProvider> DynEmbeddingProvider for T {
    fn embed_batch_boxed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(self.embed_batch(texts))
    }

    fn embed_single_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
        Box::pin(self.embed_single(text))
    }

    fn model(&self) -> &str {
        EmbeddingProvider::model(self)
    }
}

// ---------------------------------------------------------------------------
// OpenRouterEmbedding - remote OpenAI-compatible embeddings API
// ---------------------------------------------------------------------------

/// Embedding client for OpenRouter and other OpenAI-compatible endpoints.
///
/// Attaches `Authorization`, `HTTP-Referer` and `X-Title` headers to every
/// request. The attribution headers are for the remote service's accounting
/// and do not change the vectors. No retries are performed.
#[derive(Clone)]
pub struct OpenRouterEmbedding {
    client: Client,
    endpoint: String,
    model: String,
}

impl std::fmt::Debug for OpenRouterEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterEmbedding")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenRouterEmbedding {
    /// Build a client from config, resolving the API key from the config or
    /// the environment.
    ///
    /// Fails with [`ShopError::MissingCredential`] when no key is available.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        Self::new(&api_key, config)
    }

    /// Build a client with an explicit API key.
    pub fn new(api_key: &str, config: &EmbeddingConfig) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ShopError::MissingCredential(
                "embedding API key is empty".to_string(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(ShopError::Config("embedding.model is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| ShopError::Config(format!("invalid API key: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "HTTP-Referer",
            HeaderValue::from_str(&config.site_url)
                .map_err(|e| ShopError::Config(format!("invalid embedding.site_url: {}", e)))?,
        );
        headers.insert(
            "X-Title",
            HeaderValue::from_str(&config.site_name)
                .map_err(|e| ShopError::Config(format!("invalid embedding.site_name: {}", e)))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| ShopError::Config(format!("failed to build HTTP client: {}", e)))?;

        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));

        info!(endpoint = %endpoint, model = %config.model, "Embedding client ready");

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
        })
    }

    /// Endpoint URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, input: EmbeddingInput<'_>, expected: usize) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ShopError::Provider(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ShopError::Provider(format!(
                "embeddings request failed with status {}: {}",
                status, text
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ShopError::Provider(format!("failed to parse response: {}", e)))?;

        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != expected {
            return Err(ShopError::Provider(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.data.len(),
                expected
            )));
        }

        debug!(count = expected, model = %self.model, "Embeddings received");
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

impl EmbeddingProvider for OpenRouterEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(EmbeddingInput::Batch(texts), texts.len()).await
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(EmbeddingInput::Single(text), 1).await?;
        vectors
            .pop()
            .ok_or_else(|| ShopError::Provider("provider returned no embedding".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors for testing
// ---------------------------------------------------------------------------

/// Default dimensionality of [`MockEmbedding`] vectors.
pub const MOCK_DIMENSIONS: usize = 384;

/// Mock embedding provider that returns deterministic unit vectors.
///
/// The output is derived from a hash of the input text, so identical inputs
/// always produce identical outputs, and batch and single calls agree.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
    model: String,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self::with_dimensions(MOCK_DIMENSIONS)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            model: format!("mock-embedding-{}", dimensions),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The vector this provider returns for `text`.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }

        result
    }

    fn embed_checked(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(ShopError::Provider("Cannot embed empty text".to_string()));
        }
        Ok(self.vector_for(text))
    }
}

impl EmbeddingProvider for MockEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_checked(t)).collect()
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_checked(text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
