use super::InventoryProvider;
use crate::error::{WizardError, WizardResult};
use crate::models::{NodeInfo, NodeInventorySnapshot, NodeUtilization, PodInfo, PodInventorySnapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inventory file format: node and pod lists, counters are derived
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    #[serde(default)]
    pub pods: Vec<PodInfo>,
}

/// Fixed in-memory inventory
#[derive(Debug, Clone)]
pub struct StaticInventoryProvider {
    nodes: NodeInventorySnapshot,
    pods: PodInventorySnapshot,
}

impl StaticInventoryProvider {
    pub fn new(nodes: Vec<NodeInfo>, pods: Vec<PodInfo>) -> Self {
        Self {
            nodes: NodeInventorySnapshot::from_nodes(nodes),
            pods: PodInventorySnapshot::from_pods(pods),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Use a snapshot as given, counters included
    pub fn from_snapshot(nodes: NodeInventorySnapshot) -> Self {
        Self {
            nodes,
            pods: PodInventorySnapshot::from_pods(Vec::new()),
        }
    }
}

#[async_trait]
impl InventoryProvider for StaticInventoryProvider {
    fn name(&self) -> &'static str {
        "static-inventory"
    }

    async fn nodes(&self) -> WizardResult<NodeInventorySnapshot> {
        Ok(self.nodes.clone())
    }

    async fn pods(&self) -> WizardResult<PodInventorySnapshot> {
        Ok(self.pods.clone())
    }
}

/// Inventory read from a JSON file on every call
#[derive(Debug, Clone)]
pub struct FileInventoryProvider {
    path: PathBuf,
}

impl FileInventoryProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> WizardResult<InventoryDocument> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            WizardError::upstream(self.name(), format!("{}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            WizardError::upstream(self.name(), format!("{}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl InventoryProvider for FileInventoryProvider {
    fn name(&self) -> &'static str {
        "file-inventory"
    }

    async fn nodes(&self) -> WizardResult<NodeInventorySnapshot> {
        let doc = self.load().await?;
        let mut nodes = doc.nodes;
        attach_pod_requests(&mut nodes, &doc.pods);
        Ok(NodeInventorySnapshot::from_nodes(nodes))
    }

    async fn pods(&self) -> WizardResult<PodInventorySnapshot> {
        Ok(PodInventorySnapshot::from_pods(self.load().await?.pods))
    }
}

/// Fill missing node utilization from the pods scheduled on it.
///
/// Only done when pods are listed at all; a node with no pods then reports
/// zero requests.
pub fn attach_pod_requests(nodes: &mut [NodeInfo], pods: &[PodInfo]) {
    if pods.is_empty() {
        return;
    }
    for node in nodes.iter_mut().filter(|n| n.utilization.is_none()) {
        let (cpu, memory) = pods
            .iter()
            .filter(|p| p.node_name == node.name)
            .fold((0.0, 0.0), |(c, m), p| (c + p.cpu_request, m + p.memory_request_gb));
        node.utilization = Some(NodeUtilization {
            cpu_requested: cpu,
            memory_requested_gb: memory,
        });
    }
}
