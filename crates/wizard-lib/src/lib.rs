//! Karpenter cost-optimization engine
//!
//! This crate provides the core functionality for:
//! - Preset and feature catalog with hot reload
//! - Provisioner / node template generation
//! - Cluster cost analysis
//! - Rebalancing planning and dry-run simulation
//! - Inventory and pricing provider seams
//! - Health checks and observability

pub mod catalog;
pub mod cost;
pub mod error;
pub mod generator;
pub mod health;
pub mod models;
pub mod observability;
pub mod pricing;
pub mod providers;
pub mod rebalance;

pub use catalog::{CatalogHandle, PresetCatalog};
pub use cost::SpotPolicy;
pub use error::{WizardError, WizardResult};
pub use generator::{generate, ConfigRequest, GeneratedConfiguration};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EventLogger, WizardMetrics};
pub use pricing::PricingSnapshot;
