//! Core data models shared by the analyzers and the HTTP API
//!
//! Every type serializes as camelCase JSON; the browser client reads these
//! shapes directly.

use crate::error::{WizardError, WizardResult};
use serde::{Deserialize, Serialize};

/// Advisory utilization derived from pod resource requests on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUtilization {
    pub cpu_requested: f64,
    pub memory_requested_gb: f64,
}

/// A single cluster node as reported by the inventory provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub name: String,
    pub instance_type: String,
    pub region: String,
    pub zone: String,
    pub is_spot: bool,
    pub state: String,
    pub cpu_cores: u32,
    pub memory_gb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization: Option<NodeUtilization>,
}

impl NodeInfo {
    pub fn new(
        name: impl Into<String>,
        instance_type: impl Into<String>,
        zone: impl Into<String>,
        is_spot: bool,
    ) -> Self {
        let zone = zone.into();
        let region = region_of_zone(&zone).to_string();
        Self {
            name: name.into(),
            instance_type: instance_type.into(),
            region,
            zone,
            is_spot,
            state: "Ready".to_string(),
            cpu_cores: 0,
            memory_gb: 0.0,
            utilization: None,
        }
    }

    pub fn with_capacity(mut self, cpu_cores: u32, memory_gb: f64) -> Self {
        self.cpu_cores = cpu_cores;
        self.memory_gb = memory_gb;
        self
    }

    pub fn with_utilization(mut self, cpu_requested: f64, memory_requested_gb: f64) -> Self {
        self.utilization = Some(NodeUtilization {
            cpu_requested,
            memory_requested_gb,
        });
        self
    }

    pub fn capacity_type(&self) -> &'static str {
        if self.is_spot {
            "spot"
        } else {
            "on-demand"
        }
    }
}

/// Strip the trailing availability-zone letter ("us-east-1a" -> "us-east-1")
pub fn region_of_zone(zone: &str) -> &str {
    match zone.chars().last() {
        Some(c) if c.is_ascii_lowercase() => &zone[..zone.len() - 1],
        _ => zone,
    }
}

/// Point-in-time view of the cluster's nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInventorySnapshot {
    pub total_nodes: usize,
    pub spot_nodes: usize,
    pub on_demand_nodes: usize,
    pub total_cpu: u64,
    pub total_memory: f64,
    pub nodes: Vec<NodeInfo>,
}

impl NodeInventorySnapshot {
    /// Build a snapshot whose counters are derived from `nodes`
    pub fn from_nodes(nodes: Vec<NodeInfo>) -> Self {
        let spot_nodes = nodes.iter().filter(|n| n.is_spot).count();
        let total_cpu = nodes.iter().map(|n| n.cpu_cores as u64).sum();
        let total_memory = nodes.iter().map(|n| n.memory_gb).sum();
        Self {
            total_nodes: nodes.len(),
            spot_nodes,
            on_demand_nodes: nodes.len() - spot_nodes,
            total_cpu,
            total_memory,
            nodes,
        }
    }

    pub fn empty() -> Self {
        Self::from_nodes(Vec::new())
    }

    /// Check the counting invariants a provider must uphold
    pub fn validate(&self) -> WizardResult<()> {
        if self.total_nodes != self.spot_nodes + self.on_demand_nodes {
            return Err(WizardError::InvalidInventory(format!(
                "totalNodes {} != spotNodes {} + onDemandNodes {}",
                self.total_nodes, self.spot_nodes, self.on_demand_nodes
            )));
        }
        if self.total_nodes != self.nodes.len() {
            return Err(WizardError::InvalidInventory(format!(
                "totalNodes {} but {} nodes listed",
                self.total_nodes,
                self.nodes.len()
            )));
        }
        let spot = self.nodes.iter().filter(|n| n.is_spot).count();
        if spot != self.spot_nodes {
            return Err(WizardError::InvalidInventory(format!(
                "spotNodes {} but {} nodes flagged spot",
                self.spot_nodes, spot
            )));
        }
        let cpu: u64 = self.nodes.iter().map(|n| n.cpu_cores as u64).sum();
        if cpu != self.total_cpu {
            return Err(WizardError::InvalidInventory(format!(
                "totalCpu {} != sum of node cores {}",
                self.total_cpu, cpu
            )));
        }
        let memory: f64 = self.nodes.iter().map(|n| n.memory_gb).sum();
        if (memory - self.total_memory).abs() > 1e-6 {
            return Err(WizardError::InvalidInventory(format!(
                "totalMemory {} != sum of node memory {}",
                self.total_memory, memory
            )));
        }
        if let Some(node) = self.nodes.iter().find(|n| n.memory_gb < 0.0) {
            return Err(WizardError::InvalidInventory(format!(
                "node {} reports negative memory",
                node.name
            )));
        }
        Ok(())
    }

    /// True when every node carries utilization data
    pub fn has_utilization(&self) -> bool {
        !self.nodes.is_empty() && self.nodes.iter().all(|n| n.utilization.is_some())
    }
}

/// A pod and its summed container requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub node_name: String,
    pub status: String,
    pub cpu_request: f64,
    pub memory_request_gb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInventorySnapshot {
    pub total_pods: usize,
    pub total_cpu: f64,
    pub total_memory: f64,
    pub pods: Vec<PodInfo>,
}

impl PodInventorySnapshot {
    pub fn from_pods(pods: Vec<PodInfo>) -> Self {
        Self {
            total_pods: pods.len(),
            total_cpu: pods.iter().map(|p| p.cpu_request).sum(),
            total_memory: pods.iter().map(|p| p.memory_request_gb).sum(),
            pods,
        }
    }
}

/// Monthly cost split by capacity type
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub total: f64,
    pub ondemand: f64,
    pub spot: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Savings {
    pub amount: f64,
    pub percentage: f64,
}

/// Current vs. potential spend for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSnapshot {
    pub current: CostBreakdown,
    pub potential: CostBreakdown,
    pub savings: Savings,
    pub recommendations: Vec<String>,
}

/// Savings rendered for display ("$892.30")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedSavings {
    pub monthly: String,
    pub percentage: f64,
}

/// One step of a rebalancing plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RebalancingAction {
    /// Replace on-demand nodes with spot capacity of the same type
    #[serde(rename_all = "camelCase")]
    MoveToSpot {
        region: String,
        instance_type: String,
        node_names: Vec<String>,
    },
    /// Replace nodes with a cheaper instance type of equal or larger shape
    #[serde(rename_all = "camelCase")]
    ReplaceInstanceType {
        region: String,
        from: String,
        to: String,
        node_names: Vec<String>,
    },
    /// Drain nodes whose workloads fit on the rest of their group
    #[serde(rename_all = "camelCase")]
    Consolidate {
        region: String,
        instance_type: String,
        node_names: Vec<String>,
    },
}

impl RebalancingAction {
    pub fn node_names(&self) -> &[String] {
        match self {
            RebalancingAction::MoveToSpot { node_names, .. }
            | RebalancingAction::ReplaceInstanceType { node_names, .. }
            | RebalancingAction::Consolidate { node_names, .. } => node_names,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RebalancingAction::MoveToSpot { .. } => "move_to_spot",
            RebalancingAction::ReplaceInstanceType { .. } => "replace_instance_type",
            RebalancingAction::Consolidate { .. } => "consolidate",
        }
    }
}

/// Rebalancing advice grouped the way the rebalancer view renders it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancingRecommendations {
    pub instance_type_optimization: Vec<String>,
    pub spot_instance_strategy: Vec<String>,
    pub consolidation: Vec<String>,
    pub estimated_savings: EstimatedSavings,
    #[serde(default)]
    pub actions: Vec<RebalancingAction>,
}

/// Which action kinds a rebalancing plan may contain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RebalancingStrategy {
    #[default]
    Full,
    SpotOnly,
    InstanceTypeOnly,
    ConsolidationOnly,
}

impl RebalancingStrategy {
    pub fn allows_spot(&self) -> bool {
        matches!(self, RebalancingStrategy::Full | RebalancingStrategy::SpotOnly)
    }

    pub fn allows_instance_types(&self) -> bool {
        matches!(
            self,
            RebalancingStrategy::Full | RebalancingStrategy::InstanceTypeOnly
        )
    }

    pub fn allows_consolidation(&self) -> bool {
        matches!(
            self,
            RebalancingStrategy::Full | RebalancingStrategy::ConsolidationOnly
        )
    }
}

/// Optional body of a simulation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    #[serde(default)]
    pub strategy: RebalancingStrategy,
    #[serde(default, alias = "preset")]
    pub preset_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSavings {
    pub amount: String,
    pub percentage: f64,
}

/// Outcome of a dry-run rebalancing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub savings: SimulationSavings,
    pub actions: Vec<String>,
    pub estimated_time: String,
}
