//! Provisioner and node-template generation
//!
//! `generate` is a pure function of the request and the catalog snapshot it
//! is handed: identical inputs serialize to identical bytes.
//!
//! Feature values are resolved by overlaying, lowest precedence first:
//! 1. the feature catalog default
//! 2. the preset's own opinion (`features` on, `disabledFeatures` off)
//! 3. explicit `features` in the request
//!
//! `customizations` are applied last, directly onto manifest fields.

mod customize;
pub mod manifest;

pub use customize::{Customizations, SUPPORTED_KEYS};

use crate::catalog::{Preset, PresetCatalog, ResourceLimits};
use crate::error::{WizardError, WizardResult};
use manifest::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const FEATURE_CONSOLIDATION: &str = "consolidation";
pub const FEATURE_SPOT_INTERRUPTION: &str = "spotInterruptionHandling";
pub const FEATURE_TERMINATION_HANDLER: &str = "nodeTerminationHandler";

const DEFAULT_WEIGHT: u32 = 50;
const DEFAULT_CLUSTER: &str = "default";
const DEFAULT_AMI_FAMILY: &str = "AL2";
const INSTANCE_PROFILE: &str = "KarpenterNodeInstanceProfile";
const MANAGED_BY: &str = "karp-ops-wizard";
const DISCOVERY_TAG: &str = "karpenter.sh/discovery";
const SPOT_TAINT_KEY: &str = "karp-ops.io/spot-capacity";
const TERMINATION_HANDLER_LABEL: &str = "aws-node-termination-handler/managed";

/// Input of the configuration wizard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
    #[serde(alias = "preset")]
    pub preset_id: String,
    pub region: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
    #[serde(default)]
    pub customizations: BTreeMap<String, Value>,
}

impl ConfigRequest {
    pub fn new(preset_id: &str, region: &str, zone: &str) -> Self {
        Self {
            preset_id: preset_id.to_string(),
            region: region.to_string(),
            zone: zone.to_string(),
            ..Default::default()
        }
    }

    pub fn with_feature(mut self, id: &str, enabled: bool) -> Self {
        self.features.insert(id.to_string(), enabled);
        self
    }

    pub fn with_customization(mut self, key: &str, value: Value) -> Self {
        self.customizations.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub preset_id: String,
    pub region: String,
    pub zone: String,
    /// Effective value of every catalog feature
    pub features: BTreeMap<String, bool>,
    pub catalog_version: String,
    pub instructions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedConfiguration {
    pub provisioner: ProvisionerManifest,
    pub node_template: NodeTemplateManifest,
    pub summary: ConfigSummary,
}

impl GeneratedConfiguration {
    pub fn provisioner_yaml(&self) -> WizardResult<String> {
        Ok(serde_yaml::to_string(&self.provisioner)?)
    }

    pub fn node_template_yaml(&self) -> WizardResult<String> {
        Ok(serde_yaml::to_string(&self.node_template)?)
    }
}

/// Effective feature values for a preset plus explicit overrides
pub fn resolve_features(
    catalog: &PresetCatalog,
    preset: &Preset,
    overrides: &BTreeMap<String, bool>,
) -> BTreeMap<String, bool> {
    catalog
        .list_features()
        .values()
        .map(|flag| {
            let mut enabled = flag.default_enabled;
            if let Some(preset_value) = preset.feature_default(&flag.id) {
                enabled = preset_value;
            }
            if let Some(explicit) = overrides.get(&flag.id) {
                enabled = *explicit;
            }
            (flag.id.clone(), enabled)
        })
        .collect()
}

/// Validate `request` against `catalog` and build both manifests
pub fn generate(
    catalog: &PresetCatalog,
    request: &ConfigRequest,
) -> WizardResult<GeneratedConfiguration> {
    let preset = validate(catalog, request)?;
    let custom = Customizations::parse(&request.customizations)?;
    let features = resolve_features(catalog, preset, &request.features);
    let consolidation = enabled(&features, FEATURE_CONSOLIDATION);

    if consolidation && custom.ttl_seconds_after_empty.is_some() {
        return Err(WizardError::invalid_request(
            "customizations.ttlSecondsAfterEmpty",
            "cannot be combined with consolidation",
        ));
    }

    let instance_types = custom
        .instance_types
        .clone()
        .unwrap_or_else(|| preset.instance_types.clone());
    let capacity_types = preset.capacity_types();
    let spot_capable = capacity_types.iter().any(|c| c == "spot");
    let cluster = custom.cluster_name.as_deref().unwrap_or(DEFAULT_CLUSTER);
    let node_class_name = format!("{}-nodepool", preset.id);

    let mut meta_labels = BTreeMap::new();
    meta_labels.insert("karpenter.io/cluster".to_string(), cluster.to_string());
    meta_labels.insert("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert(
        "karp-ops.io/spot-ratio-target".to_string(),
        preset.spot_ratio.to_string(),
    );
    annotations.insert(
        "karp-ops.io/catalog-version".to_string(),
        catalog.version().to_string(),
    );

    let mut node_labels = BTreeMap::new();
    for (id, on) in &features {
        if *on {
            node_labels.insert(format!("features.karp-ops.io/{}", id), "true".to_string());
        }
    }
    if enabled(&features, FEATURE_TERMINATION_HANDLER) {
        node_labels.insert(TERMINATION_HANDLER_LABEL.to_string(), "true".to_string());
    }
    // customized labels win over feature labels
    node_labels.extend(custom.labels.clone());

    let mut taints = Vec::new();
    if spot_capable && enabled(&features, FEATURE_SPOT_INTERRUPTION) {
        taints.push(Taint {
            key: SPOT_TAINT_KEY.to_string(),
            value: "true".to_string(),
            effect: "PreferNoSchedule".to_string(),
        });
    }

    let arch = architectures_for(&instance_types);
    let provisioner = ProvisionerManifest {
        api_version: PROVISIONER_API_VERSION.to_string(),
        kind: PROVISIONER_KIND.to_string(),
        metadata: ObjectMeta {
            name: format!("{}-provisioner", preset.id),
            labels: meta_labels.clone(),
            annotations: annotations.clone(),
        },
        spec: ProvisionerSpec {
            provider_ref: ProviderRef {
                api_version: NODE_TEMPLATE_API_VERSION.to_string(),
                kind: NODE_TEMPLATE_KIND.to_string(),
                name: node_class_name.clone(),
            },
            requirements: vec![
                Requirement::one_of(LABEL_ARCH, arch.clone()),
                Requirement::exactly(LABEL_ZONE, &request.zone),
                Requirement::exactly(LABEL_REGION, &request.region),
                Requirement::one_of(LABEL_CAPACITY_TYPE, capacity_types.clone()),
                Requirement::one_of(LABEL_INSTANCE_TYPE, instance_types),
            ],
            resource_limits: ResourceLimits {
                cpu: custom
                    .cpu_limit
                    .clone()
                    .unwrap_or_else(|| preset.resource_limits.cpu.clone()),
                memory: custom
                    .memory_limit
                    .clone()
                    .unwrap_or_else(|| preset.resource_limits.memory.clone()),
            },
            taints: taints.clone(),
            labels: node_labels.clone(),
            weight: custom.weight.unwrap_or(DEFAULT_WEIGHT),
            consolidation: Consolidation {
                enabled: consolidation,
            },
            ttl_seconds_after_empty: custom.ttl_seconds_after_empty,
            ttl_seconds_until_expired: custom.ttl_seconds_until_expired,
        },
    };

    let mut discovery = BTreeMap::new();
    discovery.insert(DISCOVERY_TAG.to_string(), cluster.to_string());

    let node_template = NodeTemplateManifest {
        api_version: NODE_TEMPLATE_API_VERSION.to_string(),
        kind: NODE_TEMPLATE_KIND.to_string(),
        metadata: ObjectMeta {
            name: node_class_name,
            labels: meta_labels,
            annotations,
        },
        spec: NodeTemplateSpec {
            placement: Placement {
                region: request.region.clone(),
                zone: request.zone.clone(),
            },
            template: NodeTemplateContent {
                metadata: TemplateMeta {
                    labels: node_labels,
                },
                spec: TemplateNodeSpec { taints },
            },
            requirements: vec![
                Requirement::one_of(LABEL_ARCH, arch),
                Requirement::one_of(LABEL_CAPACITY_TYPE, capacity_types),
            ],
            ami_family: custom
                .ami_family
                .clone()
                .unwrap_or_else(|| DEFAULT_AMI_FAMILY.to_string()),
            instance_profile: INSTANCE_PROFILE.to_string(),
            launch_template_name: format!("KarpenterLaunchTemplate-{}", preset.id),
            subnet_selector: discovery.clone(),
            security_group_selector: discovery,
            metadata_options: MetadataOptions::default(),
        },
    };

    Ok(GeneratedConfiguration {
        provisioner,
        node_template,
        summary: ConfigSummary {
            preset_id: preset.id.clone(),
            region: request.region.clone(),
            zone: request.zone.clone(),
            instructions: instructions(&features, spot_capable),
            features,
            catalog_version: catalog.version().to_string(),
        },
    })
}

fn enabled(features: &BTreeMap<String, bool>, id: &str) -> bool {
    features.get(id).copied().unwrap_or(false)
}

fn validate<'a>(catalog: &'a PresetCatalog, request: &ConfigRequest) -> WizardResult<&'a Preset> {
    if request.preset_id.trim().is_empty() {
        return Err(WizardError::invalid_request("presetId", "must not be empty"));
    }
    let preset = catalog.resolve(&request.preset_id).map_err(|_| {
        WizardError::invalid_request(
            "presetId",
            format!("unknown preset {}", request.preset_id),
        )
    })?;

    if request.region.trim().is_empty() {
        return Err(WizardError::invalid_request("region", "must not be empty"));
    }
    if !catalog.has_region(&request.region) {
        return Err(WizardError::invalid_request(
            "region",
            format!("unsupported region {}", request.region),
        ));
    }

    let zone_ok = request
        .zone
        .strip_prefix(request.region.as_str())
        .map(|suffix| suffix.len() == 1 && suffix.chars().all(|c| c.is_ascii_lowercase()))
        .unwrap_or(false);
    if !zone_ok {
        return Err(WizardError::invalid_request(
            "zone",
            format!(
                "zone {:?} is not an availability zone of {}",
                request.zone, request.region
            ),
        ));
    }

    if let Some(unknown) = request.features.keys().find(|id| catalog.feature(id).is_none()) {
        return Err(WizardError::invalid_request(
            format!("features.{}", unknown),
            "unknown feature",
        ));
    }

    Ok(preset)
}

fn instructions(features: &BTreeMap<String, bool>, spot_capable: bool) -> Vec<String> {
    let mut steps = vec![
        "Apply the provisioner configuration: kubectl apply -f provisioner.yaml".to_string(),
        "Apply the node template: kubectl apply -f node-template.yaml".to_string(),
    ];
    if enabled(features, FEATURE_TERMINATION_HANDLER) {
        steps.push(
            "Install the AWS Node Termination Handler: helm upgrade --install aws-node-termination-handler eks/aws-node-termination-handler -n kube-system"
                .to_string(),
        );
    }
    if spot_capable && enabled(features, FEATURE_SPOT_INTERRUPTION) {
        steps.push(
            "Configure an SQS interruption queue and set settings.interruptionQueue on the Karpenter controller"
                .to_string(),
        );
    }
    if enabled(features, FEATURE_CONSOLIDATION) {
        steps.push(
            "Add PodDisruptionBudgets to critical workloads before consolidation starts moving pods"
                .to_string(),
        );
    }
    steps.push("Monitor node provisioning: kubectl get nodes -w".to_string());

    steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect()
}
