//! Catalog shipped with the binary

use super::{CatalogDocument, FeatureFlag, Preset, ResourceLimits};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn feature(id: &str, description: &str, default_enabled: bool) -> FeatureFlag {
    FeatureFlag {
        id: id.to_string(),
        description: description.to_string(),
        default_enabled,
    }
}

pub(super) fn document() -> CatalogDocument {
    CatalogDocument {
        presets: vec![
            Preset {
                id: "cost-optimized".to_string(),
                name: "Cost Optimized".to_string(),
                description: "Maximize savings with Spot instances and Graviton processors"
                    .to_string(),
                features: strings(&[
                    "consolidation",
                    "spotInterruptionHandling",
                    "nodeTerminationHandler",
                ]),
                disabled_features: Vec::new(),
                spot_ratio: 90,
                highlights: strings(&[
                    "Prefer Spot instances (up to 90% savings)",
                    "Graviton instances (ARM64) for better price/performance",
                    "Smaller instance sizes for cost efficiency",
                    "Consolidation enabled",
                ]),
                instance_types: strings(&[
                    "t3.medium",
                    "t3.large",
                    "t3.xlarge",
                    "m5.large",
                    "m5.xlarge",
                    "m5.2xlarge",
                    "c5.large",
                    "c5.xlarge",
                    "c5.2xlarge",
                    "c6g.large",
                    "c6g.xlarge",
                ]),
                resource_limits: ResourceLimits {
                    cpu: "1000".to_string(),
                    memory: "1900Gi".to_string(),
                },
            },
            Preset {
                id: "performance".to_string(),
                name: "Performance".to_string(),
                description: "Optimize for compute-intensive workloads".to_string(),
                features: strings(&["nodeTerminationHandler"]),
                disabled_features: strings(&["consolidation", "spotInterruptionHandling"]),
                spot_ratio: 0,
                highlights: strings(&[
                    "On-demand instances for stability",
                    "Larger instance sizes",
                    "Latest generation processors (C6i, M6i)",
                    "Consolidation disabled for consistent performance",
                ]),
                instance_types: strings(&[
                    "c5.xlarge",
                    "c5.2xlarge",
                    "c5.4xlarge",
                    "c6i.xlarge",
                    "c6i.2xlarge",
                    "c6i.4xlarge",
                    "m5.2xlarge",
                    "m5.4xlarge",
                    "m5.8xlarge",
                ]),
                resource_limits: ResourceLimits {
                    cpu: "2000".to_string(),
                    memory: "3800Gi".to_string(),
                },
            },
            Preset {
                id: "balanced".to_string(),
                name: "Balanced".to_string(),
                description: "Balance cost and performance with mixed instances".to_string(),
                features: strings(&["spotInterruptionHandling", "nodeTerminationHandler"]),
                disabled_features: Vec::new(),
                spot_ratio: 50,
                highlights: strings(&[
                    "Mix of Spot and On-demand instances",
                    "Moderate instance sizing",
                    "General-purpose instance families",
                    "Flexible consolidation policies",
                ]),
                instance_types: strings(&[
                    "m5.large",
                    "m5.xlarge",
                    "m5.2xlarge",
                    "c5.large",
                    "c5.xlarge",
                    "c5.2xlarge",
                    "t3.medium",
                    "t3.large",
                    "t3.xlarge",
                ]),
                resource_limits: ResourceLimits {
                    cpu: "1500".to_string(),
                    memory: "2850Gi".to_string(),
                },
            },
        ],
        features: vec![
            feature(
                "consolidation",
                "Enable node consolidation for better resource utilization",
                false,
            ),
            feature(
                "spotInterruptionHandling",
                "Handle spot instance interruptions gracefully",
                true,
            ),
            feature(
                "nodeTerminationHandler",
                "Automatic graceful termination handling",
                true,
            ),
        ],
        regions: strings(&[
            "us-east-1",
            "us-east-2",
            "us-west-1",
            "us-west-2",
            "eu-west-1",
            "eu-west-2",
            "eu-central-1",
            "ap-southeast-1",
            "ap-southeast-2",
            "ap-northeast-1",
        ]),
    }
}
