//! Typed view over the free-form `customizations` map of a request

use crate::error::{WizardError, WizardResult};
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys accepted in `customizations`, in documentation order
pub const SUPPORTED_KEYS: &[&str] = &[
    "ttlSecondsAfterEmpty",
    "ttlSecondsUntilExpired",
    "weight",
    "cpuLimit",
    "memoryLimit",
    "instanceTypes",
    "labels",
    "amiFamily",
    "clusterName",
];

const MAX_WEIGHT: u64 = 100;

/// Manifest-field overrides parsed from a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Customizations {
    pub ttl_seconds_after_empty: Option<u64>,
    pub ttl_seconds_until_expired: Option<u64>,
    pub weight: Option<u32>,
    pub cpu_limit: Option<String>,
    pub memory_limit: Option<String>,
    pub instance_types: Option<Vec<String>>,
    pub labels: BTreeMap<String, String>,
    pub ami_family: Option<String>,
    pub cluster_name: Option<String>,
}

impl Customizations {
    pub fn parse(raw: &BTreeMap<String, Value>) -> WizardResult<Self> {
        let mut parsed = Customizations::default();

        for (key, value) in raw {
            let field = format!("customizations.{}", key);
            match key.as_str() {
                "ttlSecondsAfterEmpty" => {
                    parsed.ttl_seconds_after_empty = Some(non_negative_int(&field, value)?)
                }
                "ttlSecondsUntilExpired" => {
                    parsed.ttl_seconds_until_expired = Some(non_negative_int(&field, value)?)
                }
                "weight" => {
                    let weight = non_negative_int(&field, value)?;
                    if weight == 0 || weight > MAX_WEIGHT {
                        return Err(WizardError::invalid_request(
                            field,
                            format!("must be between 1 and {}", MAX_WEIGHT),
                        ));
                    }
                    parsed.weight = Some(weight as u32);
                }
                "cpuLimit" => parsed.cpu_limit = Some(quantity(&field, value)?),
                "memoryLimit" => parsed.memory_limit = Some(quantity(&field, value)?),
                "instanceTypes" => parsed.instance_types = Some(instance_types(&field, value)?),
                "labels" => parsed.labels = labels(&field, value)?,
                "amiFamily" => parsed.ami_family = Some(non_empty_string(&field, value)?),
                "clusterName" => parsed.cluster_name = Some(non_empty_string(&field, value)?),
                _ => {
                    return Err(WizardError::invalid_request(
                        field,
                        format!("unsupported customization; expected one of {}", SUPPORTED_KEYS.join(", ")),
                    ))
                }
            }
        }

        Ok(parsed)
    }
}

fn non_negative_int(field: &str, value: &Value) -> WizardResult<u64> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    // browsers send every number as a double
    match value.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(f as u64),
        _ => Err(WizardError::invalid_request(
            field,
            "must be a non-negative integer",
        )),
    }
}

fn quantity(field: &str, value: &Value) -> WizardResult<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f > 0.0 => Ok(n.to_string()),
            _ => Err(WizardError::invalid_request(field, "must be positive")),
        },
        _ => Err(WizardError::invalid_request(
            field,
            "must be a resource quantity such as \"1000\" or \"1900Gi\"",
        )),
    }
}

fn non_empty_string(field: &str, value: &Value) -> WizardResult<String> {
    match value.as_str().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(WizardError::invalid_request(field, "must be a non-empty string")),
    }
}

fn instance_types(field: &str, value: &Value) -> WizardResult<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| WizardError::invalid_request(field, "must be an array of instance types"))?;
    if items.is_empty() {
        return Err(WizardError::invalid_request(field, "must not be empty"));
    }

    let mut types = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(t) if t.contains('.') && !t.starts_with('.') && !t.ends_with('.') => {
                if !types.iter().any(|existing| existing == t) {
                    types.push(t.to_string());
                }
            }
            _ => {
                return Err(WizardError::invalid_request(
                    field,
                    format!("invalid instance type {}", item),
                ))
            }
        }
    }
    Ok(types)
}

fn labels(field: &str, value: &Value) -> WizardResult<BTreeMap<String, String>> {
    let object = value
        .as_object()
        .ok_or_else(|| WizardError::invalid_request(field, "must be an object of string labels"))?;

    let mut labels = BTreeMap::new();
    for (key, value) in object {
        if key.trim().is_empty() {
            return Err(WizardError::invalid_request(field, "label keys must not be empty"));
        }
        let value = value.as_str().ok_or_else(|| {
            WizardError::invalid_request(format!("{}.{}", field, key), "label values must be strings")
        })?;
        labels.insert(key.clone(), value.to_string());
    }
    Ok(labels)
}
