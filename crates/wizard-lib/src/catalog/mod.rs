//! Preset and feature-flag registry
//!
//! A catalog is validated once when it is built: every preset must reference
//! known features, carry a valid spot ratio and a non-empty instance
//! allow-list. Lookups afterwards cannot fail on integrity grounds.

mod builtin;
mod handle;

pub use handle::CatalogHandle;

use crate::error::{WizardError, WizardResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Karpenter resource limits for a provisioner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: String,
    pub memory: String,
}

/// A published configuration preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Feature ids this preset switches on, in display order
    pub features: Vec<String>,
    /// Feature ids this preset switches off regardless of catalog default
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_features: Vec<String>,
    /// Target share of spot capacity, 0..=100
    pub spot_ratio: u8,
    #[serde(default)]
    pub highlights: Vec<String>,
    pub instance_types: Vec<String>,
    pub resource_limits: ResourceLimits,
}

impl Preset {
    /// Preset's own opinion on a feature, if it has one
    pub fn feature_default(&self, feature_id: &str) -> Option<bool> {
        if self.features.iter().any(|f| f == feature_id) {
            Some(true)
        } else if self.disabled_features.iter().any(|f| f == feature_id) {
            Some(false)
        } else {
            None
        }
    }

    /// Capacity types implied by the spot ratio
    pub fn capacity_types(&self) -> Vec<String> {
        match self.spot_ratio {
            0 => vec!["on-demand".to_string()],
            100 => vec!["spot".to_string()],
            _ => vec!["spot".to_string(), "on-demand".to_string()],
        }
    }

    /// Instance families referenced by the allow-list ("m5.large" -> "m5")
    pub fn instance_families(&self) -> Vec<String> {
        let families: BTreeSet<&str> = self
            .instance_types
            .iter()
            .filter_map(|t| t.split('.').next())
            .collect();
        families.into_iter().map(str::to_string).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub id: String,
    pub description: String,
    #[serde(rename = "default", alias = "defaultEnabled")]
    pub default_enabled: bool,
}

/// On-disk representation of a catalog (JSON or YAML)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub presets: Vec<Preset>,
    pub features: Vec<FeatureFlag>,
    pub regions: Vec<String>,
}

/// Validated, immutable preset registry
#[derive(Debug, Clone, PartialEq)]
pub struct PresetCatalog {
    presets: Vec<Preset>,
    index: BTreeMap<String, usize>,
    features: BTreeMap<String, FeatureFlag>,
    regions: Vec<String>,
    version: String,
}

impl PresetCatalog {
    /// Validate a document and build the catalog
    pub fn new(document: CatalogDocument) -> WizardResult<Self> {
        let version = fingerprint(&document)?;
        let CatalogDocument {
            presets,
            features,
            regions,
        } = document;

        if regions.is_empty() {
            return Err(WizardError::InvalidCatalog("no regions defined".into()));
        }
        let mut seen_regions = BTreeSet::new();
        for region in &regions {
            if region.trim().is_empty() {
                return Err(WizardError::InvalidCatalog("empty region code".into()));
            }
            if !seen_regions.insert(region.as_str()) {
                return Err(WizardError::InvalidCatalog(format!(
                    "duplicate region {}",
                    region
                )));
            }
        }

        let mut feature_map = BTreeMap::new();
        for feature in features {
            if feature.id.trim().is_empty() {
                return Err(WizardError::InvalidCatalog("empty feature id".into()));
            }
            if feature_map.contains_key(&feature.id) {
                return Err(WizardError::InvalidCatalog(format!(
                    "duplicate feature {}",
                    feature.id
                )));
            }
            feature_map.insert(feature.id.clone(), feature);
        }

        if presets.is_empty() {
            return Err(WizardError::InvalidCatalog("no presets defined".into()));
        }
        let mut index = BTreeMap::new();
        for (position, preset) in presets.iter().enumerate() {
            validate_preset(preset, &feature_map)?;
            if index.insert(preset.id.clone(), position).is_some() {
                return Err(WizardError::InvalidCatalog(format!(
                    "duplicate preset {}",
                    preset.id
                )));
            }
        }

        Ok(Self {
            presets,
            index,
            features: feature_map,
            regions,
            version,
        })
    }

    /// The catalog compiled into the binary
    pub fn builtin() -> Self {
        Self::new(builtin::document()).expect("built-in catalog is valid")
    }

    /// Load a JSON or YAML catalog file, chosen by extension
    pub fn from_path(path: &Path) -> WizardResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let document: CatalogDocument = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            _ => serde_json::from_str(&raw)?,
        };
        Self::new(document)
    }

    /// Presets in publication order
    pub fn list_presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn list_features(&self) -> &BTreeMap<String, FeatureFlag> {
        &self.features
    }

    pub fn list_regions(&self) -> &[String] {
        &self.regions
    }

    pub fn has_region(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r == region)
    }

    pub fn feature(&self, id: &str) -> Option<&FeatureFlag> {
        self.features.get(id)
    }

    pub fn resolve(&self, preset_id: &str) -> WizardResult<&Preset> {
        self.index
            .get(preset_id)
            .map(|&i| &self.presets[i])
            .ok_or_else(|| WizardError::NotFound {
                kind: "preset",
                id: preset_id.to_string(),
            })
    }

    /// Content fingerprint; changes whenever any preset, feature or region does
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn to_document(&self) -> CatalogDocument {
        CatalogDocument {
            presets: self.presets.clone(),
            features: self.features.values().cloned().collect(),
            regions: self.regions.clone(),
        }
    }
}

fn validate_preset(preset: &Preset, features: &BTreeMap<String, FeatureFlag>) -> WizardResult<()> {
    let fail = |reason: String| WizardError::InvalidCatalog(format!("preset {}: {}", preset.id, reason));

    if preset.id.trim().is_empty() {
        return Err(WizardError::InvalidCatalog("preset with empty id".into()));
    }
    if preset.spot_ratio > 100 {
        return Err(fail(format!("spotRatio {} exceeds 100", preset.spot_ratio)));
    }
    if preset.instance_types.is_empty() {
        return Err(fail("empty instance type allow-list".into()));
    }

    let mut seen = BTreeSet::new();
    for id in preset.features.iter().chain(&preset.disabled_features) {
        if !features.contains_key(id) {
            return Err(fail(format!("references unknown feature {}", id)));
        }
        if !seen.insert(id.as_str()) {
            return Err(fail(format!("lists feature {} more than once", id)));
        }
    }
    Ok(())
}

fn fingerprint(document: &CatalogDocument) -> WizardResult<String> {
    let canonical = serde_json::to_vec(document)?;
    let digest = Sha256::digest(&canonical);
    Ok(hex::encode(digest)[..12].to_string())
}
