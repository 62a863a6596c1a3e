//! karp-ops server - Karpenter provisioning wizard and cost optimizer
//!
//! Serves the preset catalog, generates provisioner configuration, and
//! analyzes cluster cost and rebalancing opportunities over HTTP.

use anyhow::{Context, Result};
use karp_ops_server::{
    api::{self, AppState},
    config::{InventorySource, ServerConfig},
    kube_inventory::KubeInventoryProvider,
    watcher::{CatalogWatcher, ReloadContext},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wizard_lib::{
    health::components,
    providers::{
        CachedPricing, FileInventoryProvider, FilePricingProvider, InventoryProvider,
        PricingProvider, StaticInventoryProvider, StaticPricingProvider,
    },
    CatalogHandle, EventLogger, HealthRegistry, PresetCatalog, WizardMetrics,
};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting karp-ops server");

    let config = ServerConfig::load()?;
    info!(
        port = config.port,
        inventory = ?config.inventory_source,
        pricing_refresh = ?config.pricing_refresh,
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CATALOG).await;
    health_registry.register(components::INVENTORY).await;
    health_registry.register(components::PRICING).await;

    let metrics = WizardMetrics::new();
    let logger = EventLogger::new(&config.instance_name);

    let catalog = match &config.catalog_path {
        Some(path) => PresetCatalog::from_path(path)
            .with_context(|| format!("Failed to load catalog from {}", path.display()))?,
        None => PresetCatalog::builtin(),
    };
    let catalog_version = catalog.version().to_string();
    metrics.set_catalog_version(&catalog_version);
    let catalog = CatalogHandle::new(catalog);

    let inventory: Arc<dyn InventoryProvider> = match config.inventory_source {
        InventorySource::Kube => Arc::new(
            KubeInventoryProvider::try_default()
                .await
                .context("Failed to connect to the Kubernetes API")?,
        ),
        InventorySource::File => match &config.inventory_path {
            Some(path) => Arc::new(FileInventoryProvider::new(path)),
            None => anyhow::bail!("inventory_source = file requires inventory_path"),
        },
        InventorySource::Static => Arc::new(StaticInventoryProvider::empty()),
    };

    let pricing_provider: Arc<dyn PricingProvider> = match &config.pricing_path {
        Some(path) => Arc::new(FilePricingProvider::new(path)),
        None => Arc::new(StaticPricingProvider::default()),
    };
    let pricing = CachedPricing::new(pricing_provider, config.pricing_refresh);
    if let Err(e) = pricing.refresh().await {
        // served as 503 until a later refresh succeeds
        warn!(error = %e, "Initial pricing load failed");
        health_registry
            .record_failure(components::PRICING, e.to_string())
            .await;
    }

    // Keep the watcher alive for the lifetime of the server
    let _watcher = match (&config.catalog_path, config.watch_catalog) {
        (Some(path), true) => Some(CatalogWatcher::spawn(
            path.clone(),
            ReloadContext {
                catalog: catalog.clone(),
                metrics: metrics.clone(),
                logger: logger.clone(),
                health_registry: health_registry.clone(),
            },
        )?),
        _ => None,
    };

    let state = Arc::new(
        AppState::new(
            catalog,
            inventory,
            pricing,
            health_registry.clone(),
            metrics,
            logger.clone(),
        )
        .with_policy(config.spot_policy())
        .with_upstream_timeout(config.upstream_timeout()),
    );
    let router = api::create_router(state, &config.cors_origin_list());

    health_registry.set_ready(true).await;
    logger.log_startup(
        SERVER_VERSION,
        &catalog_version,
        &format!("0.0.0.0:{}", config.port),
    );

    let shutdown_logger = logger.clone();
    api::serve(config.port, router, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
