//! Karpenter manifest shapes emitted by the generator
//!
//! Maps are `BTreeMap` so serialized output is byte-stable.

use crate::catalog::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PROVISIONER_API_VERSION: &str = "karpenter.sh/v1beta1";
pub const PROVISIONER_KIND: &str = "NodePool";
pub const NODE_TEMPLATE_API_VERSION: &str = "karpenter.k8s.aws/v1beta1";
pub const NODE_TEMPLATE_KIND: &str = "EC2NodeClass";

pub const LABEL_ARCH: &str = "kubernetes.io/arch";
pub const LABEL_ZONE: &str = "topology.kubernetes.io/zone";
pub const LABEL_REGION: &str = "topology.kubernetes.io/region";
pub const LABEL_CAPACITY_TYPE: &str = "karpenter.sh/capacity-type";
pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub key: String,
    pub operator: String,
    pub values: Vec<String>,
}

impl Requirement {
    pub fn one_of(key: &str, values: Vec<String>) -> Self {
        Self {
            key: key.to_string(),
            operator: "In".to_string(),
            values,
        }
    }

    pub fn exactly(key: &str, value: &str) -> Self {
        Self::one_of(key, vec![value.to_string()])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    pub value: String,
    pub effect: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consolidation {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionerSpec {
    pub provider_ref: ProviderRef,
    pub requirements: Vec<Requirement>,
    pub resource_limits: ResourceLimits,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub weight: u32,
    pub consolidation: Consolidation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_empty: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_until_expired: Option<u64>,
}

/// Provisioner (NodePool): what may be launched and under which constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionerManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ProvisionerSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub region: String,
    pub zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMeta {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateNodeSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplateContent {
    pub metadata: TemplateMeta,
    pub spec: TemplateNodeSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataOptions {
    pub http_endpoint: String,
    #[serde(rename = "httpProtocolIPv6")]
    pub http_protocol_ipv6: String,
    pub http_put_response_hop_limit: u32,
    pub http_tokens: String,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            http_endpoint: "enabled".to_string(),
            http_protocol_ipv6: "disabled".to_string(),
            http_put_response_hop_limit: 2,
            http_tokens: "required".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplateSpec {
    pub placement: Placement,
    pub template: NodeTemplateContent,
    pub requirements: Vec<Requirement>,
    pub ami_family: String,
    pub instance_profile: String,
    pub launch_template_name: String,
    pub subnet_selector: BTreeMap<String, String>,
    pub security_group_selector: BTreeMap<String, String>,
    pub metadata_options: MetadataOptions,
}

/// Node template (EC2NodeClass): placement and node-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplateManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: NodeTemplateSpec,
}

/// True for Graviton families such as `c6g`, `t4g` or `m7gd`
pub fn is_graviton_family(family: &str) -> bool {
    match family.find(|c: char| c.is_ascii_digit()) {
        Some(pos) => family[pos..]
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .contains('g'),
        None => false,
    }
}

/// Architectures required to run every type in an allow-list
pub fn architectures_for(instance_types: &[String]) -> Vec<String> {
    let arm = instance_types
        .iter()
        .filter_map(|t| t.split('.').next())
        .any(is_graviton_family);
    if arm {
        vec!["amd64".to_string(), "arm64".to_string()]
    } else {
        vec!["amd64".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graviton_detection() {
        assert!(is_graviton_family("c6g"));
        assert!(is_graviton_family("t4g"));
        assert!(is_graviton_family("m7gd"));
        assert!(!is_graviton_family("c6i"));
        assert!(!is_graviton_family("m5"));
        assert!(!is_graviton_family("g5"));
        assert!(!is_graviton_family("metal"));
    }

    #[test]
    fn test_architectures_for_allow_list() {
        let mixed = vec!["m5.large".to_string(), "c6g.large".to_string()];
        assert_eq!(architectures_for(&mixed), vec!["amd64", "arm64"]);
        let intel = vec!["c5.xlarge".to_string()];
        assert_eq!(architectures_for(&intel), vec!["amd64"]);
    }

    #[test]
    fn test_metadata_options_field_names() {
        let json = serde_json::to_value(MetadataOptions::default()).unwrap();
        assert_eq!(json["httpProtocolIPv6"], "disabled");
        assert_eq!(json["httpPutResponseHopLimit"], 2);
    }
}
