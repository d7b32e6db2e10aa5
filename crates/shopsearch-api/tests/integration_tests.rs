//! Integration tests for the Shopsearch API.
//!
//! Each test builds its own router over a temporary collection directory and
//! a deterministic mock embedding provider.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use shopsearch_api::create_router;
use shopsearch_api::handlers::{HealthResponse, SearchResponse};
use shopsearch_api::state::AppState;
use shopsearch_core::config::ShopConfig;
use shopsearch_core::error::{Result, ShopError};
use shopsearch_vector::embedding::{DynEmbeddingProvider, EmbeddingProvider, MockEmbedding};
use shopsearch_vector::{IndexStore, IngestionPipeline, QueryService};

// =============================================================================
// Helpers
// =============================================================================

/// Provider whose endpoint is down.
struct DownEmbedding;

impl EmbeddingProvider for DownEmbedding {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(ShopError::Provider("HTTP 503: upstream unavailable".to_string()))
    }

    async fn embed_single(&self, _text: &str) -> Result<Vec<f32>> {
        Err(ShopError::Provider("HTTP 503: upstream unavailable".to_string()))
    }

    fn model(&self) -> &str {
        "down"
    }
}

/// Provider that answers correctly but slowly.
struct SlowEmbedding(MockEmbedding);

impl EmbeddingProvider for SlowEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.0.embed_batch(texts).await
    }

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.0.embed_single(text).await
    }

    fn model(&self) -> &str {
        EmbeddingProvider::model(&self.0)
    }
}

/// Build state over an empty collection in a fresh temp directory.
async fn make_state_with(
    embedder: Arc<dyn DynEmbeddingProvider>,
    timeout: Duration,
) -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ShopConfig::default();
    let store = IndexStore::new(dir.path(), "products");
    let handle = store.load_or_empty(embedder.model()).await.unwrap();

    let query_service = QueryService::new_dyn(handle, Arc::clone(&embedder)).with_timeout(timeout);
    let pipeline = IngestionPipeline::new_dyn(embedder, store);
    (AppState::new(config, query_service, pipeline), dir)
}

async fn make_app() -> (axum::Router, tempfile::TempDir) {
    let (state, dir) =
        make_state_with(Arc::new(MockEmbedding::with_dimensions(32)), Duration::from_secs(5)).await;
    (create_router(state), dir)
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

const CATALOG: &str = r#"[
    {"id": "1", "name": "Phone A", "category": "Phones", "price": "300"},
    {"id": "2", "name": "Phone B", "category": "Phones", "price": "350"},
    {"id": "3", "name": "Kettle", "category": "Kitchen", "features": "1.7 l"},
    {"name": "Nameless id"},
    {"id": "5"}
]"#;

async fn ingest_catalog(app: &axum::Router) {
    let resp = app.clone().oneshot(post_json("/ingest", CATALOG)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

async fn search(app: &axum::Router, uri: &str) -> SearchResponse {
    let resp = app.clone().oneshot(get(uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_happy_path() {
    let (app, _dir) = make_app().await;
    let resp = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.collection, "products");
    assert_eq!(health.indexed_products, 0);
    assert_eq!(health.model, "mock-embedding-32");
}

#[tokio::test]
async fn test_health_reports_count_after_ingest() {
    let (app, _dir) = make_app().await;
    ingest_catalog(&app).await;

    let resp = app.oneshot(get("/health")).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.indexed_products, 3);
}

// =============================================================================
// Ingest
// =============================================================================

#[tokio::test]
async fn test_ingest_reports_admitted_and_rejected() {
    let (app, dir) = make_app().await;
    let resp = app.oneshot(post_json("/ingest", CATALOG)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(json["admitted_count"], 3);
    assert_eq!(json["rejected_count"], 2);
    assert!(dir.path().join("products.json").is_file());
}

#[tokio::test]
async fn test_ingest_empty_array() {
    let (app, _dir) = make_app().await;
    let resp = app.oneshot(post_json("/ingest", "[]")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(json["admitted_count"], 0);
    assert_eq!(json["rejected_count"], 0);
}

#[tokio::test]
async fn test_ingest_rejects_malformed_body() {
    let (app, _dir) = make_app().await;
    let resp = app
        .oneshot(post_json("/ingest", r#"{"not": "an array"}"#))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_ingest_provider_failure_is_bad_gateway() {
    let (state, _dir) = make_state_with(Arc::new(DownEmbedding), Duration::from_secs(5)).await;
    let app = create_router(state);

    let resp = app.oneshot(post_json("/ingest", CATALOG)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(json["error"], "provider_error");
    assert!(json["message"].as_str().unwrap().contains("503"));
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn test_search_excludes_exact_name_match() {
    let (app, _dir) = make_app().await;
    ingest_catalog(&app).await;

    let body = search(&app, "/search?q=Phone%20A&k=1").await;
    assert_eq!(body.status, "found");
    assert_eq!(body.results.len(), 1);
    assert_ne!(body.results[0].name, "Phone A");
    assert_eq!(body.message, "Found 1 similar products:");
}

#[tokio::test]
async fn test_search_result_carries_metadata() {
    let (app, _dir) = make_app().await;
    ingest_catalog(&app).await;

    let body = search(&app, "/search?q=Kettle&k=10").await;
    assert_eq!(body.results.len(), 2);
    assert!(body.results.iter().all(|r| r.category == "Phones"));
    assert!(body.results.iter().any(|r| r.price == "350"));
}

#[tokio::test]
async fn test_search_k_larger_than_collection() {
    let (app, _dir) = make_app().await;
    ingest_catalog(&app).await;

    let body = search(&app, "/search?q=something%20for%20tea&k=10").await;
    assert_eq!(body.status, "found");
    assert_eq!(body.results.len(), 3);
}

#[tokio::test]
async fn test_search_k_is_clamped_to_max() {
    let (app, _dir) = make_app().await;
    let records: Vec<Value> = (0..15)
        .map(|i| serde_json::json!({"id": i.to_string(), "name": format!("Item {}", i)}))
        .collect();
    let resp = app
        .clone()
        .oneshot(post_json("/ingest", &Value::Array(records).to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = search(&app, "/search?q=anything&k=100").await;
    assert_eq!(body.results.len(), 10);

    let body = search(&app, "/search?q=anything").await;
    assert_eq!(body.results.len(), 5);
}

#[tokio::test]
async fn test_search_empty_query() {
    let (app, _dir) = make_app().await;
    ingest_catalog(&app).await;

    for uri in ["/search", "/search?q=", "/search?q=%20%20%20"] {
        let body = search(&app, uri).await;
        assert_eq!(body.status, "empty_query", "uri {}", uri);
        assert!(body.results.is_empty());
        assert_eq!(body.message, "Please enter a query to search for products.");
    }
}

#[tokio::test]
async fn test_search_before_any_ingest_has_no_results() {
    let (app, _dir) = make_app().await;
    let body = search(&app, "/search?q=phone").await;
    assert_eq!(body.status, "no_results");
    assert_eq!(body.message, "No products found. Try changing your query.");
}

#[tokio::test]
async fn test_search_rejects_non_numeric_k() {
    let (app, _dir) = make_app().await;
    let resp = app.oneshot(get("/search?q=phone&k=many")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_provider_failure_is_bad_gateway() {
    let (state, _dir) = make_state_with(Arc::new(DownEmbedding), Duration::from_secs(5)).await;
    let app = create_router(state);

    let resp = app.oneshot(get("/search?q=phone")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_search_timeout_is_gateway_timeout() {
    let (state, _dir) = make_state_with(
        Arc::new(SlowEmbedding(MockEmbedding::with_dimensions(32))),
        Duration::from_millis(20),
    )
    .await;
    let app = create_router(state);

    let resp = app.oneshot(get("/search?q=phone")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    let json: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(json["error"], "timeout");
}

#[tokio::test]
async fn test_reingest_replaces_served_collection() {
    let (app, _dir) = make_app().await;
    ingest_catalog(&app).await;

    let resp = app
        .clone()
        .oneshot(post_json("/ingest", r#"[{"id": "9", "name": "Toaster"}]"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = search(&app, "/search?q=phone&k=10").await;
    assert_eq!(body.results.len(), 1);
    assert_eq!(body.results[0].id, "9");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingests_serve_the_persisted_collection() {
    let (state, dir) =
        make_state_with(Arc::new(MockEmbedding::with_dimensions(32)), Duration::from_secs(5)).await;
    let app = create_router(state.clone());

    for round in 0..10 {
        let small = app
            .clone()
            .oneshot(post_json("/ingest", r#"[{"id": "9", "name": "Toaster"}]"#));
        let large = app.clone().oneshot(post_json("/ingest", CATALOG));
        let (a, b) = tokio::join!(tokio::spawn(small), tokio::spawn(large));
        assert_eq!(a.unwrap().unwrap().status(), StatusCode::OK);
        assert_eq!(b.unwrap().unwrap().status(), StatusCode::OK);

        let served = state.query_service.handle().unwrap();
        let persisted = IndexStore::new(dir.path(), "products").load().await.unwrap();
        assert_eq!(served.len(), persisted.len(), "round {}", round);
        assert_eq!(served.built_at(), persisted.built_at(), "round {}", round);
    }
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _dir) = make_app().await;
    let resp = app.oneshot(get("/recent")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
