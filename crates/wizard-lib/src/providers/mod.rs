//! Collaborators that feed the analyzers
//!
//! The engine never talks to a cluster or a price feed directly; it asks an
//! [`InventoryProvider`] and a [`PricingProvider`] for snapshots and computes
//! over those. Implementations here are the in-process and file-backed ones;
//! the Kubernetes provider lives with the server.

mod inventory;
mod pricing;

pub use inventory::{
    attach_pod_requests, FileInventoryProvider, InventoryDocument, StaticInventoryProvider,
};
pub use pricing::{
    CachedPricing, FilePricingProvider, PricingRead, RefreshCadence, StaticPricingProvider,
};

use crate::error::WizardResult;
use crate::models::{NodeInventorySnapshot, PodInventorySnapshot};
use crate::pricing::PricingSnapshot;
use async_trait::async_trait;

/// Source of node and pod inventory
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// Short name used in logs, metrics and error messages
    fn name(&self) -> &'static str;

    async fn nodes(&self) -> WizardResult<NodeInventorySnapshot>;

    async fn pods(&self) -> WizardResult<PodInventorySnapshot>;
}

/// Source of instance pricing
#[async_trait]
pub trait PricingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> WizardResult<PricingSnapshot>;
}
