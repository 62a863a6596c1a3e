//! HTTP API: presets, config generation, cost analysis, rebalancing,
//! plus health checks and Prometheus metrics

use crate::error::ApiError;
use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use wizard_lib::{
    catalog::{FeatureFlag, Preset},
    cost, generate,
    health::components,
    providers::{CachedPricing, InventoryProvider, PricingRead},
    rebalance, CatalogHandle, ComponentStatus, ConfigRequest, CostSnapshot,
    EventLogger, GeneratedConfiguration, HealthRegistry, NodeInventorySnapshot,
    PodInventorySnapshot, PricingSnapshot, RebalancingRecommendations, RebalancingStrategy,
    SimulationRequest, SimulationResult, SpotPolicy, WizardError, WizardMetrics, WizardResult,
};

const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogHandle,
    pub inventory: Arc<dyn InventoryProvider>,
    pub pricing: CachedPricing,
    pub policy: SpotPolicy,
    pub health_registry: HealthRegistry,
    pub metrics: WizardMetrics,
    pub logger: EventLogger,
    pub upstream_timeout: Duration,
}

impl AppState {
    pub fn new(
        catalog: CatalogHandle,
        inventory: Arc<dyn InventoryProvider>,
        pricing: CachedPricing,
        health_registry: HealthRegistry,
        metrics: WizardMetrics,
        logger: EventLogger,
    ) -> Self {
        Self {
            catalog,
            inventory,
            pricing,
            policy: SpotPolicy::default(),
            health_registry,
            metrics,
            logger,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: SpotPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    async fn bounded<T, F>(&self, provider: &str, fut: F) -> WizardResult<T>
    where
        F: Future<Output = WizardResult<T>>,
    {
        match tokio::time::timeout(self.upstream_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(WizardError::upstream(
                provider,
                format!("no response within {}s", self.upstream_timeout.as_secs_f64()),
            )),
        }
    }

    /// Feed a collaborator result into health, metrics and the event log
    async fn track<T>(&self, component: &str, provider: &str, result: WizardResult<T>) -> Result<T, ApiError> {
        match result {
            Ok(value) => {
                self.health_registry.record_success(component).await;
                Ok(value)
            }
            Err(e) => {
                self.note_failure(component, provider, &e).await;
                Err(ApiError(e))
            }
        }
    }

    async fn note_failure(&self, component: &str, provider: &str, error: &WizardError) {
        let message = error.to_string();
        self.health_registry.record_failure(component, message.clone()).await;
        let failures = self
            .health_registry
            .health()
            .await
            .components
            .get(component)
            .map(|h| h.consecutive_failures)
            .unwrap_or(1);
        self.metrics.inc_upstream_error(provider);
        self.logger.log_upstream_failure(provider, &message, failures);
    }

    pub async fn fetch_nodes(&self) -> Result<NodeInventorySnapshot, ApiError> {
        let provider = self.inventory.name();
        let result = self.bounded(provider, self.inventory.nodes()).await;
        let nodes = self.track(components::INVENTORY, provider, result).await?;
        self.metrics.set_cluster_nodes(nodes.spot_nodes, nodes.on_demand_nodes);
        Ok(nodes)
    }

    pub async fn fetch_pods(&self) -> Result<PodInventorySnapshot, ApiError> {
        let provider = self.inventory.name();
        let result = self.bounded(provider, self.inventory.pods()).await;
        self.track(components::INVENTORY, provider, result).await
    }

    pub async fn fetch_pricing(&self) -> Result<Arc<PricingSnapshot>, ApiError> {
        let provider = self.pricing.provider_name();
        let result = self.bounded(provider, self.pricing.get()).await;
        self.accept_pricing(provider, result).await
    }

    /// A stale read still answers the request but counts as a pricing failure
    async fn accept_pricing(
        &self,
        provider: &str,
        result: WizardResult<PricingRead>,
    ) -> Result<Arc<PricingSnapshot>, ApiError> {
        match result {
            Ok(PricingRead {
                snapshot,
                refresh_error: Some(e),
            }) => {
                self.note_failure(components::PRICING, provider, &e).await;
                Ok(snapshot)
            }
            other => self
                .track(components::PRICING, provider, other)
                .await
                .map(|read| read.snapshot),
        }
    }

    /// Configured policy, or the preset's spot ratio when one is named
    async fn policy_for(&self, preset_id: Option<&str>) -> Result<SpotPolicy, ApiError> {
        let Some(id) = preset_id else {
            return Ok(self.policy);
        };
        let catalog = self.catalog.snapshot().await;
        let preset = catalog.resolve(id).map_err(|_| {
            WizardError::invalid_request("presetId", format!("unknown preset `{}`", id))
        })?;
        Ok(self.policy.for_preset(preset))
    }
}

/// Catalog listing served to the wizard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetsResponse {
    pub presets: BTreeMap<String, Preset>,
    pub regions: Vec<String>,
    pub features: BTreeMap<String, FeatureFlag>,
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostQuery {
    #[serde(default, alias = "preset")]
    pub preset_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancingQuery {
    #[serde(default, alias = "preset")]
    pub preset_id: Option<String>,
    #[serde(default)]
    pub strategy: RebalancingStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingRefreshResponse {
    pub provider: String,
    pub regions: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
}

fn query_error(rejection: QueryRejection) -> ApiError {
    ApiError(WizardError::invalid_request("query", rejection.body_text()))
}

async fn list_presets(State(state): State<Arc<AppState>>) -> Json<PresetsResponse> {
    let catalog = state.catalog.snapshot().await;
    Json(PresetsResponse {
        presets: catalog
            .list_presets()
            .iter()
            .map(|p| (p.id.clone(), p.clone()))
            .collect(),
        regions: catalog.list_regions().to_vec(),
        features: catalog.list_features().clone(),
        version: catalog.version().to_string(),
    })
}

async fn generate_config(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ConfigRequest>, JsonRejection>,
) -> Result<Json<GeneratedConfiguration>, ApiError> {
    let Json(request) =
        body.map_err(|e| ApiError(WizardError::invalid_request("body", e.body_text())))?;

    let started = Instant::now();
    let catalog = state.catalog.snapshot().await;
    let config = generate(&catalog, &request)?;
    state
        .metrics
        .observe_generation_latency(started.elapsed().as_secs_f64());

    state.logger.log_config_generated(
        &config.summary.preset_id,
        &config.summary.region,
        &config.summary.zone,
        &config.summary.catalog_version,
    );
    Ok(Json(config))
}

async fn cluster_cost(
    State(state): State<Arc<AppState>>,
    query: Result<Query<CostQuery>, QueryRejection>,
) -> Result<Json<CostSnapshot>, ApiError> {
    let Query(query) = query.map_err(query_error)?;
    let policy = state.policy_for(query.preset_id.as_deref()).await?;
    let nodes = state.fetch_nodes().await?;
    let pricing = state.fetch_pricing().await?;

    let started = Instant::now();
    let snapshot = cost::analyze(&nodes, &pricing, &policy)?;
    state
        .metrics
        .observe_analysis_latency(started.elapsed().as_secs_f64());
    state.metrics.set_potential_savings(snapshot.savings.amount);

    state.logger.log_cost_analyzed(
        nodes.total_nodes,
        snapshot.current.total,
        snapshot.potential.total,
        snapshot.savings.percentage,
        cost::tally(&nodes.nodes, &pricing).gaps.len(),
    );
    Ok(Json(snapshot))
}

async fn cluster_nodes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<NodeInventorySnapshot>, ApiError> {
    Ok(Json(state.fetch_nodes().await?))
}

async fn cluster_pods(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PodInventorySnapshot>, ApiError> {
    Ok(Json(state.fetch_pods().await?))
}

async fn price_quote(
    State(state): State<Arc<AppState>>,
    Path((region, instance_type)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let pricing = state.fetch_pricing().await?;
    Ok(Json(pricing.quote(&region, &instance_type)?))
}

async fn refresh_pricing(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PricingRefreshResponse>, ApiError> {
    let provider = state.pricing.provider_name();
    let result = state.bounded(provider, state.pricing.refresh()).await;
    let snapshot = state.track(components::PRICING, provider, result).await?;

    info!(provider = provider, regions = snapshot.prices.len(), "Pricing refreshed on request");
    Ok(Json(PricingRefreshResponse {
        provider: provider.to_string(),
        regions: snapshot.prices.len(),
        refreshed_at: state.pricing.last_refreshed().await,
    }))
}

async fn rebalancing_recommendations(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RebalancingQuery>, QueryRejection>,
) -> Result<Json<RebalancingRecommendations>, ApiError> {
    let Query(query) = query.map_err(query_error)?;
    let policy = state.policy_for(query.preset_id.as_deref()).await?;
    let nodes = state.fetch_nodes().await?;
    let pricing = state.fetch_pricing().await?;

    let started = Instant::now();
    let recommendations = rebalance::recommend(&nodes, &pricing, &policy, query.strategy)?;
    state
        .metrics
        .observe_simulation_latency(started.elapsed().as_secs_f64());

    Ok(Json(recommendations))
}

async fn simulate_rebalancing(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SimulationResult>, ApiError> {
    let request: SimulationRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SimulationRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| WizardError::invalid_request("body", e.to_string()))?
    };

    let policy = state.policy_for(request.preset_id.as_deref()).await?;
    let nodes = state.fetch_nodes().await?;
    let pricing = state.fetch_pricing().await?;

    let started = Instant::now();
    let plan = rebalance::recommend(&nodes, &pricing, &policy, request.strategy)?;
    let result = rebalance::simulate(&nodes, &pricing, &plan)?;
    state
        .metrics
        .observe_simulation_latency(started.elapsed().as_secs_f64());

    let strategy = serde_json::to_value(request.strategy)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    state.logger.log_rebalancing_simulated(
        &strategy,
        result.actions.len(),
        &result.savings.amount,
        &result.estimated_time,
    );
    Ok(Json(result))
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            e.to_string(),
        ),
    }
}

/// CORS for the wizard's browser origins; any origin when none are configured
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
}

/// Create the API router
pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/presets", get(list_presets))
        .route("/generate-config", post(generate_config))
        .route("/cluster/cost", get(cluster_cost))
        .route("/cluster/nodes", get(cluster_nodes))
        .route("/cluster/pods", get(cluster_pods))
        .route("/pricing/refresh", post(refresh_pricing))
        .route("/pricing/:region/:instance_type", get(price_quote))
        .route("/recommendations/rebalancing", get(rebalancing_recommendations))
        .route("/simulate/rebalancing", post(simulate_rebalancing));

    Router::new()
        .nest("/api/v1", api)
        .route("/healthz", get(healthz))
        .route("/health", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Start the HTTP server and run until `shutdown` resolves
pub async fn serve<F>(port: u16, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wizard_lib::providers::{RefreshCadence, StaticInventoryProvider, StaticPricingProvider};

    async fn state() -> AppState {
        let health_registry = HealthRegistry::new();
        health_registry.register(components::PRICING).await;

        AppState::new(
            CatalogHandle::default(),
            Arc::new(StaticInventoryProvider::new(Vec::new(), Vec::new())),
            CachedPricing::new(
                Arc::new(StaticPricingProvider::default()),
                RefreshCadence::Daily,
            ),
            health_registry,
            WizardMetrics::new(),
            EventLogger::new("test"),
        )
    }

    fn stale_read() -> WizardResult<PricingRead> {
        Ok(PricingRead {
            snapshot: Arc::new(PricingSnapshot::builtin()),
            refresh_error: Some(WizardError::upstream("stale-feed", "feed down")),
        })
    }

    async fn pricing_status(state: &AppState) -> ComponentStatus {
        state.health_registry.health().await.components[components::PRICING].status
    }

    #[tokio::test]
    async fn test_stale_pricing_is_served_but_reported() {
        let state = state().await;

        let snapshot = state.accept_pricing("stale-feed", stale_read()).await.unwrap();
        assert_eq!(*snapshot, PricingSnapshot::builtin());
        assert_eq!(pricing_status(&state).await, ComponentStatus::Degraded);

        state.accept_pricing("stale-feed", stale_read()).await.unwrap();
        state.accept_pricing("stale-feed", stale_read()).await.unwrap();
        assert_eq!(pricing_status(&state).await, ComponentStatus::Unhealthy);

        let metrics = state.metrics.render().unwrap();
        assert!(metrics.contains("karp_ops_upstream_errors_total{provider=\"stale-feed\"}"));

        // a fresh read restores health
        state.fetch_pricing().await.unwrap();
        assert_eq!(pricing_status(&state).await, ComponentStatus::Healthy);
    }
}
