//! Inventory from a live cluster through the Kubernetes API
//!
//! Nodes are described by their well-known labels; utilization is the sum of
//! container requests of the active pods bound to each node.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{api::ListParams, Api, Client};
use std::collections::BTreeMap;
use tracing::debug;
use wizard_lib::providers::{attach_pod_requests, InventoryProvider};
use wizard_lib::{
    models::region_of_zone, NodeInfo, NodeInventorySnapshot, PodInfo, PodInventorySnapshot,
    WizardError, WizardResult,
};

pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
pub const LABEL_ZONE: &str = "topology.kubernetes.io/zone";
pub const LABEL_REGION: &str = "topology.kubernetes.io/region";
pub const LABEL_KARPENTER_CAPACITY_TYPE: &str = "karpenter.sh/capacity-type";
pub const LABEL_EKS_CAPACITY_TYPE: &str = "eks.amazonaws.com/capacityType";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const PROVIDER: &str = "kube-inventory";

pub struct KubeInventoryProvider {
    client: Client,
}

impl KubeInventoryProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with in-cluster config or the local kubeconfig
    pub async fn try_default() -> Result<Self, kube::Error> {
        Ok(Self::new(Client::try_default().await?))
    }

    async fn list_nodes(&self) -> WizardResult<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| WizardError::upstream(PROVIDER, format!("failed to list nodes: {}", e)))
    }

    async fn list_pods(&self) -> WizardResult<Vec<PodInfo>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| WizardError::upstream(PROVIDER, format!("failed to list pods: {}", e)))?;
        Ok(list.items.iter().filter_map(pod_info).collect())
    }
}

#[async_trait]
impl InventoryProvider for KubeInventoryProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn nodes(&self) -> WizardResult<NodeInventorySnapshot> {
        let raw = self.list_nodes().await?;
        let pods = self.list_pods().await?;

        let mut nodes: Vec<NodeInfo> = raw.iter().filter_map(node_info).collect();
        if nodes.len() < raw.len() {
            debug!(
                skipped = raw.len() - nodes.len(),
                "Nodes without an instance-type label were left out"
            );
        }
        attach_pod_requests(&mut nodes, &pods);
        Ok(NodeInventorySnapshot::from_nodes(nodes))
    }

    async fn pods(&self) -> WizardResult<PodInventorySnapshot> {
        Ok(PodInventorySnapshot::from_pods(self.list_pods().await?))
    }
}

/// Convert a Node object; `None` when it has no instance type label
pub fn node_info(node: &Node) -> Option<NodeInfo> {
    let labels = node.metadata.labels.as_ref()?;
    let name = node.metadata.name.clone()?;
    let instance_type = labels.get(LABEL_INSTANCE_TYPE)?;
    let zone = labels.get(LABEL_ZONE).cloned().unwrap_or_default();

    let mut info = NodeInfo::new(name, instance_type, zone.clone(), is_spot(labels));
    info.region = labels
        .get(LABEL_REGION)
        .cloned()
        .unwrap_or_else(|| region_of_zone(&zone).to_string());

    if let Some(status) = &node.status {
        let ready = status
            .conditions
            .as_ref()
            .and_then(|c| c.iter().find(|c| c.type_ == "Ready"))
            .map_or(false, |c| c.status == "True");
        info.state = if ready { "Ready" } else { "NotReady" }.to_string();

        if let Some(capacity) = &status.capacity {
            let cpu = capacity.get("cpu").map_or(0.0, cpu_cores);
            let memory = capacity.get("memory").map_or(0.0, memory_gib);
            info = info.with_capacity(cpu.floor() as u32, memory);
        }
    }
    Some(info)
}

fn is_spot(labels: &BTreeMap<String, String>) -> bool {
    labels
        .get(LABEL_KARPENTER_CAPACITY_TYPE)
        .or_else(|| labels.get(LABEL_EKS_CAPACITY_TYPE))
        .map_or(false, |v| v.eq_ignore_ascii_case("spot"))
}

/// Convert a Pod object; finished pods hold no requests and are skipped
pub fn pod_info(pod: &Pod) -> Option<PodInfo> {
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    if phase == "Succeeded" || phase == "Failed" {
        return None;
    }

    let spec = pod.spec.as_ref()?;
    let (cpu_request, memory_request_gb) = spec
        .containers
        .iter()
        .filter_map(|c| c.resources.as_ref()?.requests.as_ref())
        .fold((0.0, 0.0), |(cpu, memory), requests| {
            (
                cpu + requests.get("cpu").map_or(0.0, cpu_cores),
                memory + requests.get("memory").map_or(0.0, memory_gib),
            )
        });

    Some(PodInfo {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string()),
        node_name: spec.node_name.clone().unwrap_or_default(),
        status: phase,
        cpu_request,
        memory_request_gb,
    })
}

/// Plain number with an optional suffix from `suffixes`
fn parse_scaled(raw: &str, suffixes: &[(&str, f64)]) -> Option<f64> {
    suffixes
        .iter()
        .find_map(|(suffix, factor)| {
            raw.strip_suffix(suffix)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|n| n * factor)
        })
        .or_else(|| raw.parse::<f64>().ok())
}

/// CPU quantity ("250m", "2", "500000n") in cores
pub fn cpu_cores(quantity: &Quantity) -> f64 {
    const SUFFIXES: &[(&str, f64)] = &[("n", 1e-9), ("u", 1e-6), ("m", 1e-3), ("k", 1e3)];

    let q = quantity.0.trim();
    parse_scaled(q, SUFFIXES).unwrap_or_else(|| {
        debug!(quantity = %q, "Unparseable CPU quantity, counted as 0");
        0.0
    })
}

/// Memory quantity ("128Mi", "16Gi", "1G", "1048576") in GiB
pub fn memory_gib(quantity: &Quantity) -> f64 {
    const SUFFIXES: &[(&str, f64)] = &[
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", GIB),
        ("Ti", GIB * 1024.0),
        ("Pi", GIB * 1024.0 * 1024.0),
        ("Ei", GIB * 1024.0 * 1024.0 * 1024.0),
        ("m", 1e-3),
        ("k", 1e3),
        ("K", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
    ];

    let q = quantity.0.trim();
    match parse_scaled(q, SUFFIXES) {
        Some(bytes) => bytes / GIB,
        None => {
            debug!(quantity = %q, "Unparseable memory quantity, counted as 0");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn q(s: &str) -> Quantity {
        Quantity(s.to_string())
    }

    #[test]
    fn test_cpu_quantities() {
        assert_eq!(cpu_cores(&q("2")), 2.0);
        assert_eq!(cpu_cores(&q("250m")), 0.25);
        assert_eq!(cpu_cores(&q("500000000n")), 0.5);
        assert_eq!(cpu_cores(&q("garbage")), 0.0);
    }

    #[test]
    fn test_memory_quantities() {
        assert_eq!(memory_gib(&q("16Gi")), 16.0);
        assert_eq!(memory_gib(&q("512Mi")), 0.5);
        assert_eq!(memory_gib(&q("1073741824")), 1.0);
        assert!((memory_gib(&q("1G")) - 0.931).abs() < 0.001);
        assert_eq!(memory_gib(&q("1Pi")), 1024.0 * 1024.0);
        assert_eq!(memory_gib(&q("2Ei")), 2.0 * 1024.0 * 1024.0 * 1024.0);
        assert!((memory_gib(&q("1P")) - 931_322.574).abs() < 0.001);
        assert!((memory_gib(&q("1E")) - 931_322_574.615).abs() < 0.001);
        assert!((memory_gib(&q("1073741824000m")) - 1.0).abs() < 1e-9);
        assert!((memory_gib(&q("1e9")) - 0.931).abs() < 0.001);
        assert_eq!(memory_gib(&q("lots")), 0.0);
    }

    #[test]
    fn test_node_from_labels_and_capacity() {
        let node: Node = serde_json::from_value(json!({
            "metadata": {
                "name": "ip-10-0-1-12",
                "labels": {
                    "node.kubernetes.io/instance-type": "m5.large",
                    "topology.kubernetes.io/zone": "us-west-2b",
                    "karpenter.sh/capacity-type": "spot"
                }
            },
            "status": {
                "capacity": {"cpu": "2", "memory": "7910804Ki"},
                "conditions": [{"type": "Ready", "status": "True"}]
            }
        }))
        .unwrap();

        let info = node_info(&node).unwrap();
        assert_eq!(info.instance_type, "m5.large");
        assert_eq!(info.region, "us-west-2");
        assert_eq!(info.zone, "us-west-2b");
        assert!(info.is_spot);
        assert_eq!(info.state, "Ready");
        assert_eq!(info.cpu_cores, 2);
        assert!(info.memory_gb > 7.0 && info.memory_gb < 8.0);
    }

    #[test]
    fn test_node_without_instance_type_is_skipped() {
        let node: Node = serde_json::from_value(json!({
            "metadata": {"name": "kind-control-plane", "labels": {}}
        }))
        .unwrap();
        assert!(node_info(&node).is_none());
    }

    #[test]
    fn test_eks_capacity_label_and_not_ready() {
        let node: Node = serde_json::from_value(json!({
            "metadata": {
                "name": "n1",
                "labels": {
                    "node.kubernetes.io/instance-type": "c5.xlarge",
                    "topology.kubernetes.io/region": "eu-west-1",
                    "eks.amazonaws.com/capacityType": "ON_DEMAND"
                }
            },
            "status": {"conditions": [{"type": "Ready", "status": "False"}]}
        }))
        .unwrap();

        let info = node_info(&node).unwrap();
        assert!(!info.is_spot);
        assert_eq!(info.region, "eu-west-1");
        assert_eq!(info.state, "NotReady");
    }

    #[test]
    fn test_pod_requests_are_summed() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "web-1", "namespace": "shop"},
            "spec": {
                "nodeName": "n1",
                "containers": [
                    {"name": "app", "resources": {"requests": {"cpu": "500m", "memory": "1Gi"}}},
                    {"name": "sidecar", "resources": {"requests": {"cpu": "100m"}}},
                    {"name": "bare"}
                ]
            },
            "status": {"phase": "Running"}
        }))
        .unwrap();

        let info = pod_info(&pod).unwrap();
        assert_eq!(info.node_name, "n1");
        assert_eq!(info.namespace, "shop");
        assert!((info.cpu_request - 0.6).abs() < 1e-9);
        assert_eq!(info.memory_request_gb, 1.0);
    }

    #[test]
    fn test_finished_pods_are_skipped() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "job-1"},
            "spec": {"containers": [{"name": "c"}]},
            "status": {"phase": "Succeeded"}
        }))
        .unwrap();
        assert!(pod_info(&pod).is_none());
    }
}
