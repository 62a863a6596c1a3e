//! Integration tests for the karp-ops API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use karp_ops_server::api::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wizard_lib::{
    health::components,
    providers::{CachedPricing, InventoryProvider, RefreshCadence, StaticInventoryProvider, StaticPricingProvider},
    CatalogHandle, EventLogger, HealthRegistry, NodeInfo, NodeInventorySnapshot,
    PodInventorySnapshot, WizardError, WizardMetrics, WizardResult,
};

/// Inventory that never answers
struct StalledInventory;

#[async_trait]
impl InventoryProvider for StalledInventory {
    fn name(&self) -> &'static str {
        "stalled-inventory"
    }

    async fn nodes(&self) -> WizardResult<NodeInventorySnapshot> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(WizardError::upstream("stalled-inventory", "unreachable"))
    }

    async fn pods(&self) -> WizardResult<PodInventorySnapshot> {
        Err(WizardError::upstream("stalled-inventory", "connection refused"))
    }
}

fn on_demand_fleet(count: usize) -> Vec<NodeInfo> {
    (0..count)
        .map(|i| {
            NodeInfo::new(format!("node-{:02}", i), "m5.large", "us-east-1a", false)
                .with_capacity(2, 8.0)
        })
        .collect()
}

async fn setup_test_app(inventory: Arc<dyn InventoryProvider>) -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::CATALOG).await;
    health_registry.register(components::INVENTORY).await;
    health_registry.register(components::PRICING).await;

    let pricing = CachedPricing::new(
        Arc::new(StaticPricingProvider::default()),
        RefreshCadence::Daily,
    );
    let state = Arc::new(
        AppState::new(
            CatalogHandle::default(),
            inventory,
            pricing,
            health_registry,
            WizardMetrics::new(),
            EventLogger::new("test"),
        )
        .with_upstream_timeout(Duration::from_millis(200)),
    );
    let router = create_router(state.clone(), &[]);

    (router, state)
}

async fn fleet_app(count: usize) -> (Router, Arc<AppState>) {
    setup_test_app(Arc::new(StaticInventoryProvider::new(
        on_demand_fleet(count),
        Vec::new(),
    )))
    .await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_presets_listing() {
    let (app, _state) = fleet_app(0).await;

    let (status, body) = send(app, get("/api/v1/presets")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["presets"]["cost-optimized"]["spotRatio"], 90);
    assert!(body["presets"]["performance"].is_object());
    assert!(body["features"]["consolidation"].is_object());
    assert!(body["regions"]
        .as_array()
        .unwrap()
        .contains(&json!("us-east-1")));
    assert_eq!(body["version"].as_str().unwrap().len(), 12);
}

#[tokio::test]
async fn test_generate_config() {
    let (app, _state) = fleet_app(0).await;

    let request = json!({
        "presetId": "cost-optimized",
        "region": "us-east-1",
        "zone": "us-east-1a",
        "features": {"consolidation": true}
    });
    let (status, body) = send(app, post_json("/api/v1/generate-config", request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provisioner"]["spec"]["consolidation"]["enabled"], true);
    assert_eq!(body["nodeTemplate"]["spec"]["placement"]["region"], "us-east-1");
    assert_eq!(body["nodeTemplate"]["spec"]["placement"]["zone"], "us-east-1a");
    assert_eq!(body["summary"]["presetId"], "cost-optimized");
    assert!(!body["summary"]["instructions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_generate_config_rejects_bad_zone() {
    let (app, _state) = fleet_app(0).await;

    let request = json!({
        "presetId": "balanced",
        "region": "us-east-1",
        "zone": "eu-west-1a"
    });
    let (status, body) = send(app, post_json("/api/v1/generate-config", request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert_eq!(body["field"], "zone");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_generate_config_rejects_malformed_body() {
    let (app, _state) = fleet_app(0).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/generate-config")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "body");
}

#[tokio::test]
async fn test_cluster_cost_for_on_demand_fleet() {
    let (app, _state) = fleet_app(10).await;

    let (status, body) = send(app, get("/api/v1/cluster/cost")).await;
    assert_eq!(status, StatusCode::OK);

    let current = body["current"]["total"].as_f64().unwrap();
    let potential = body["potential"]["total"].as_f64().unwrap();
    assert!((current - 700.8).abs() < 0.01);
    assert!(potential <= current);
    assert!(body["savings"]["amount"].as_f64().unwrap() >= 0.0);
    assert!(!body["recommendations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cluster_cost_uses_preset_spot_ratio() {
    let (app, _state) = fleet_app(10).await;

    // performance allows no spot capacity
    let (status, body) = send(app, get("/api/v1/cluster/cost?presetId=performance")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["savings"]["amount"].as_f64().unwrap(), 0.0);
    assert_eq!(body["potential"]["total"], body["current"]["total"]);
}

#[tokio::test]
async fn test_cluster_cost_unknown_preset() {
    let (app, _state) = fleet_app(1).await;

    let (status, body) = send(app, get("/api/v1/cluster/cost?presetId=turbo")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "presetId");
}

#[tokio::test]
async fn test_empty_cluster_cost() {
    let (app, _state) = fleet_app(0).await;

    let (status, body) = send(app, get("/api/v1/cluster/cost")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current"]["total"].as_f64().unwrap(), 0.0);
    assert_eq!(body["savings"]["percentage"].as_f64().unwrap(), 0.0);
    assert!(body["recommendations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cluster_nodes() {
    let (app, _state) = fleet_app(3).await;

    let (status, body) = send(app, get("/api/v1/cluster/nodes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalNodes"], 3);
    assert_eq!(body["onDemandNodes"], 3);
    assert_eq!(body["spotNodes"], 0);
    assert_eq!(body["nodes"][0]["instanceType"], "m5.large");
}

#[tokio::test]
async fn test_price_quote() {
    let (app, _state) = fleet_app(0).await;

    let (status, body) = send(app.clone(), get("/api/v1/pricing/us-east-1/m5.large")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instanceType"], "m5.large");

    let (status, body) = send(app, get("/api/v1/pricing/us-east-1/z9.huge")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_pricing_refresh() {
    let (app, _state) = fleet_app(0).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/pricing/refresh")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "static-pricing");
    assert_eq!(body["regions"], 1);
    assert!(body["refreshedAt"].is_string());
}

#[tokio::test]
async fn test_rebalancing_recommendations() {
    let (app, _state) = fleet_app(10).await;

    let (status, body) = send(
        app,
        get("/api/v1/recommendations/rebalancing?strategy=spotOnly"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["spotInstanceStrategy"].as_array().unwrap().is_empty());
    assert!(body["instanceTypeOptimization"].as_array().unwrap().is_empty());
    assert!(body["estimatedSavings"]["monthly"]
        .as_str()
        .unwrap()
        .starts_with('$'));
}

#[tokio::test]
async fn test_rebalancing_rejects_unknown_strategy() {
    let (app, _state) = fleet_app(1).await;

    let (status, body) = send(
        app,
        get("/api/v1/recommendations/rebalancing?strategy=yolo"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_simulate_without_body() {
    let (app, _state) = fleet_app(10).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/simulate/rebalancing")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["savings"]["amount"].as_str().unwrap().starts_with('$'));
    assert!(!body["actions"].as_array().unwrap().is_empty());
    assert!(body["estimatedTime"].as_str().unwrap().contains('m'));
}

#[tokio::test]
async fn test_simulate_is_deterministic() {
    let (app, _state) = fleet_app(10).await;
    let request = || post_json("/api/v1/simulate/rebalancing", json!({"strategy": "full"}));

    let (_, first) = send(app.clone(), request()).await;
    let (_, second) = send(app, request()).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_upstream_timeout_is_503_and_degrades_health() {
    let (app, state) = setup_test_app(Arc::new(StalledInventory)).await;

    let (status, body) = send(app.clone(), get("/api/v1/cluster/nodes")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "UPSTREAM_UNAVAILABLE");
    assert_eq!(body["retryable"], true);

    let health = state.health_registry.health().await;
    assert_eq!(health.components[components::INVENTORY].consecutive_failures, 1);

    // still operational while only degraded
    let (status, body) = send(app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_repeated_failures_make_healthz_503() {
    let (app, _state) = setup_test_app(Arc::new(StalledInventory)).await;

    for _ in 0..3 {
        let (status, _) = send(app.clone(), get("/api/v1/cluster/pods")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    let (status, body) = send(app, get("/healthz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = fleet_app(0).await;

    let (status, body) = send(app, get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = fleet_app(0).await;
    state.health_registry.set_ready(true).await;

    let (status, body) = send(app, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _state) = fleet_app(2).await;

    // populate the node gauge first
    send(app.clone(), get("/api/v1/cluster/nodes")).await;

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("karp_ops_cluster_nodes"));
}
