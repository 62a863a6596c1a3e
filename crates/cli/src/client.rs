//! API client for the karp-ops server

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;
use wizard_lib::{
    catalog::{FeatureFlag, Preset},
    pricing::PriceQuote,
    ConfigRequest, CostSnapshot, GeneratedConfiguration, NodeInventorySnapshot,
    PodInventorySnapshot, RebalancingRecommendations, RebalancingStrategy, SimulationRequest,
    SimulationResult,
};

/// API client for the karp-ops server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // keep any path prefix when joining relative API paths
        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.url(path, query)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        decode(response).await
    }

    /// Make a POST request, with a JSON body when one is given
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: Option<&B>) -> Result<T> {
        let url = self.url(path, &[])?;

        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.context("Failed to send request")?;

        decode(response).await
    }

    pub async fn presets(&self) -> Result<PresetsResponse> {
        self.get("api/v1/presets", &[]).await
    }

    pub async fn generate_config(&self, request: &ConfigRequest) -> Result<GeneratedConfiguration> {
        self.post("api/v1/generate-config", Some(request)).await
    }

    pub async fn cluster_cost(&self, preset: Option<&str>) -> Result<CostSnapshot> {
        self.get("api/v1/cluster/cost", &preset_query(preset)).await
    }

    pub async fn cluster_nodes(&self) -> Result<NodeInventorySnapshot> {
        self.get("api/v1/cluster/nodes", &[]).await
    }

    pub async fn cluster_pods(&self) -> Result<PodInventorySnapshot> {
        self.get("api/v1/cluster/pods", &[]).await
    }

    pub async fn price_quote(&self, region: &str, instance_type: &str) -> Result<PriceQuote> {
        let path = format!("api/v1/pricing/{}/{}", region, instance_type);
        self.get(&path, &[]).await
    }

    pub async fn refresh_pricing(&self) -> Result<PricingRefresh> {
        self.post::<_, ()>("api/v1/pricing/refresh", None).await
    }

    pub async fn rebalancing(
        &self,
        preset: Option<&str>,
        strategy: RebalancingStrategy,
    ) -> Result<RebalancingRecommendations> {
        let mut query = preset_query(preset);
        query.push(("strategy", strategy_param(strategy)));
        self.get("api/v1/recommendations/rebalancing", &query).await
    }

    pub async fn simulate(&self, request: &SimulationRequest) -> Result<SimulationResult> {
        self.post("api/v1/simulate/rebalancing", Some(request)).await
    }
}

fn preset_query(preset: Option<&str>) -> Vec<(&'static str, String)> {
    preset
        .map(|p| vec![("presetId", p.to_string())])
        .unwrap_or_default()
}

/// Wire name of a strategy ("spotOnly", ...)
pub fn strategy_param(strategy: RebalancingStrategy) -> String {
    serde_json::to_value(strategy)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "full".to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => anyhow::bail!("API error ({}): {}", status, err.describe()),
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    response.json().await.context("Failed to parse response")
}

// API response types

/// Catalog listing returned by `GET /api/v1/presets`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetsResponse {
    pub presets: BTreeMap<String, Preset>,
    pub regions: Vec<String>,
    pub features: BTreeMap<String, FeatureFlag>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingRefresh {
    pub provider: String,
    pub regions: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn describe(&self) -> String {
        let mut out = self.message.clone();
        if self.retryable {
            out.push_str(" (temporary, retry later)");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_cluster_cost_sends_preset() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/cluster/cost")
            .match_query(Matcher::UrlEncoded("presetId".into(), "balanced".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "current": {"total": 700.8, "ondemand": 700.8, "spot": 0.0},
                    "potential": {"total": 455.52, "ondemand": 350.4, "spot": 105.12},
                    "savings": {"amount": 245.28, "percentage": 35.0},
                    "recommendations": ["Move 5 on-demand m5.large node(s) to Spot to save $245.28/month"]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let snapshot = client.cluster_cost(Some("balanced")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(snapshot.current.total, 700.8);
        assert_eq!(snapshot.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn test_rebalancing_sends_strategy_wire_name() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/recommendations/rebalancing")
            .match_query(Matcher::UrlEncoded("strategy".into(), "spotOnly".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "instanceTypeOptimization": [],
                    "spotInstanceStrategy": ["Move 7 on-demand m5.large node(s) in us-east-1 to Spot to save $343.39/month"],
                    "consolidation": [],
                    "estimatedSavings": {"monthly": "$343.39", "percentage": 49.0},
                    "actions": []
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let plan = client
            .rebalancing(None, RebalancingStrategy::SpotOnly)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(plan.estimated_savings.monthly, "$343.39");
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/generate-config")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "error": "Bad Request",
                    "message": "invalid request field `zone`: must be in region us-east-1",
                    "code": "INVALID_REQUEST",
                    "field": "zone",
                    "retryable": false
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let request = ConfigRequest::new("balanced", "us-east-1", "eu-west-1a");
        let err = client.generate_config(&request).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("zone"));
    }

    #[tokio::test]
    async fn test_upstream_error_marked_temporary() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/cluster/nodes")
            .with_status(503)
            .with_body(
                json!({
                    "error": "Service Unavailable",
                    "message": "kube-inventory unavailable: no response within 10s",
                    "code": "UPSTREAM_UNAVAILABLE",
                    "retryable": true
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.cluster_nodes().await.unwrap_err();
        assert!(err.to_string().contains("retry later"));
    }

    #[tokio::test]
    async fn test_refresh_pricing_timestamp() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/pricing/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "provider": "static-pricing",
                    "regions": 1,
                    "refreshedAt": "2026-03-01T12:00:00Z"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let refresh = client.refresh_pricing().await.unwrap();

        assert_eq!(refresh.regions, 1);
        assert_eq!(
            refresh.refreshed_at.unwrap().to_rfc3339(),
            "2026-03-01T12:00:00+00:00"
        );
    }

    #[test]
    fn test_base_url_keeps_prefix() {
        let client = ApiClient::new("http://gateway.local/karp-ops").unwrap();
        let url = client.url("api/v1/presets", &[]).unwrap();
        assert_eq!(url.as_str(), "http://gateway.local/karp-ops/api/v1/presets");
    }

    #[test]
    fn test_strategy_param() {
        assert_eq!(strategy_param(RebalancingStrategy::Full), "full");
        assert_eq!(
            strategy_param(RebalancingStrategy::ConsolidationOnly),
            "consolidationOnly"
        );
    }
}
