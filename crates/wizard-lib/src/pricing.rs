//! Instance pricing snapshots
//!
//! Prices are hourly USD figures keyed by `(region, instanceType)`. Spot
//! prices are optional: an instance type without one is treated as having no
//! spot availability in that region.

use crate::error::{WizardError, WizardResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Fixed hours-per-month used to turn hourly prices into monthly figures
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Spot discount applied to the built-in table (spot ~= 30% of on-demand)
pub const SPOT_PRICE_FACTOR: f64 = 0.3;

pub const CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

/// Compute shape of an instance type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceShape {
    pub vcpu: u32,
    pub memory_gib: f64,
    pub arch: Architecture,
}

impl InstanceShape {
    /// True when `self` offers at least the CPU and memory of `other`
    pub fn covers(&self, other: &InstanceShape) -> bool {
        self.vcpu >= other.vcpu && self.memory_gib + 1e-9 >= other.memory_gib
    }
}

/// Hourly prices for one instance type in one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePrice {
    pub on_demand: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcpu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gib: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<Architecture>,
}

impl InstancePrice {
    pub fn new(on_demand: f64, spot: Option<f64>) -> Self {
        Self {
            on_demand,
            spot,
            vcpu: None,
            memory_gib: None,
            arch: None,
        }
    }

    pub fn with_shape(mut self, vcpu: u32, memory_gib: f64, arch: Architecture) -> Self {
        self.vcpu = Some(vcpu);
        self.memory_gib = Some(memory_gib);
        self.arch = Some(arch);
        self
    }

    pub fn shape(&self) -> Option<InstanceShape> {
        Some(InstanceShape {
            vcpu: self.vcpu?,
            memory_gib: self.memory_gib?,
            arch: self.arch.unwrap_or(Architecture::Amd64),
        })
    }

    /// Hourly price for the given capacity type, if offered
    pub fn hourly(&self, spot: bool) -> Option<f64> {
        if spot {
            self.spot
        } else {
            Some(self.on_demand)
        }
    }

    /// Spot price, only when it actually undercuts on-demand
    pub fn spot_discount(&self) -> Option<f64> {
        self.spot.filter(|s| *s < self.on_demand)
    }
}

/// Pricing data for every known `(region, instanceType)` pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    #[serde(default)]
    pub prices: BTreeMap<String, BTreeMap<String, InstancePrice>>,
}

impl PricingSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region: &str, instance_type: &str, price: InstancePrice) {
        self.prices
            .entry(region.to_string())
            .or_default()
            .insert(instance_type.to_string(), price);
    }

    pub fn with_price(mut self, region: &str, instance_type: &str, price: InstancePrice) -> Self {
        self.insert(region, instance_type, price);
        self
    }

    pub fn get(&self, region: &str, instance_type: &str) -> Option<&InstancePrice> {
        self.prices.get(region)?.get(instance_type)
    }

    /// All priced instance types in a region, in name order
    pub fn region_types(&self, region: &str) -> impl Iterator<Item = (&String, &InstancePrice)> {
        self.prices.get(region).into_iter().flat_map(|m| m.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.prices.values().all(|m| m.is_empty())
    }

    /// Parse a JSON pricing document
    pub fn from_json(raw: &str) -> WizardResult<Self> {
        let snapshot: PricingSnapshot = serde_json::from_str(raw)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn from_path(path: &Path) -> WizardResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> WizardResult<()> {
        for (region, types) in &self.prices {
            for (instance_type, price) in types {
                let bad_spot = price.spot.map(|s| !(s.is_finite() && s >= 0.0));
                if !(price.on_demand.is_finite() && price.on_demand >= 0.0)
                    || bad_spot.unwrap_or(false)
                {
                    return Err(WizardError::Serialization(format!(
                        "invalid price for {}/{}",
                        region, instance_type
                    )));
                }
            }
        }
        Ok(())
    }

    /// Built-in us-east-1 table used when no pricing feed is configured
    pub fn builtin() -> Self {
        use Architecture::{Amd64, Arm64};

        let table: &[(&str, f64, u32, f64, Architecture)] = &[
            ("t3.medium", 0.0416, 2, 4.0, Amd64),
            ("t3.large", 0.0832, 2, 8.0, Amd64),
            ("t3.xlarge", 0.1664, 4, 16.0, Amd64),
            ("m5.large", 0.096, 2, 8.0, Amd64),
            ("m5.xlarge", 0.192, 4, 16.0, Amd64),
            ("m5.2xlarge", 0.384, 8, 32.0, Amd64),
            ("m5.4xlarge", 0.768, 16, 64.0, Amd64),
            ("m5.8xlarge", 1.536, 32, 128.0, Amd64),
            ("c5.large", 0.096, 2, 4.0, Amd64),
            ("c5.xlarge", 0.192, 4, 8.0, Amd64),
            ("c5.2xlarge", 0.384, 8, 16.0, Amd64),
            ("c5.4xlarge", 0.768, 16, 32.0, Amd64),
            ("c6i.xlarge", 0.17, 4, 8.0, Amd64),
            ("c6i.2xlarge", 0.34, 8, 16.0, Amd64),
            ("c6i.4xlarge", 0.68, 16, 32.0, Amd64),
            ("c6g.large", 0.0768, 2, 4.0, Arm64),
            ("c6g.xlarge", 0.1536, 4, 8.0, Arm64),
            ("c6g.2xlarge", 0.3072, 8, 16.0, Arm64),
        ];

        let mut snapshot = Self::new();
        for (instance_type, on_demand, vcpu, memory, arch) in table {
            let spot = round_price(on_demand * SPOT_PRICE_FACTOR);
            snapshot.insert(
                "us-east-1",
                instance_type,
                InstancePrice::new(*on_demand, Some(spot)).with_shape(*vcpu, *memory, *arch),
            );
        }
        snapshot
    }

    /// Quote for a single instance type, as served by the pricing endpoint
    pub fn quote(&self, region: &str, instance_type: &str) -> WizardResult<PriceQuote> {
        let price = self
            .get(region, instance_type)
            .ok_or_else(|| WizardError::NotFound {
                kind: "price",
                id: format!("{}/{}", region, instance_type),
            })?;
        Ok(PriceQuote::from_price(region, instance_type, price))
    }
}

fn round_price(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRate {
    pub price: f64,
    pub currency: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRate {
    pub price: f64,
    pub currency: String,
    pub unit: String,
    pub discount: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRates {
    pub on_demand: f64,
    pub spot: f64,
    pub savings: f64,
}

/// Per-instance price view with monthly projections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub region: String,
    pub instance_type: String,
    pub on_demand: HourlyRate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot: Option<SpotRate>,
    pub monthly: MonthlyRates,
}

impl PriceQuote {
    fn from_price(region: &str, instance_type: &str, price: &InstancePrice) -> Self {
        let spot = price.spot.map(|s| {
            let discount = if price.on_demand > 0.0 {
                (1.0 - s / price.on_demand) * 100.0
            } else {
                0.0
            };
            SpotRate {
                price: s,
                currency: CURRENCY.to_string(),
                unit: "per hour".to_string(),
                discount: format!("{:.0}%", discount),
            }
        });
        let monthly_on_demand = crate::cost::round_cents(price.on_demand * HOURS_PER_MONTH);
        let monthly_spot = price
            .spot
            .map(|s| crate::cost::round_cents(s * HOURS_PER_MONTH))
            .unwrap_or(monthly_on_demand);

        Self {
            region: region.to_string(),
            instance_type: instance_type.to_string(),
            on_demand: HourlyRate {
                price: price.on_demand,
                currency: CURRENCY.to_string(),
                unit: "per hour".to_string(),
            },
            spot,
            monthly: MonthlyRates {
                on_demand: monthly_on_demand,
                spot: monthly_spot,
                savings: crate::cost::round_cents(monthly_on_demand - monthly_spot),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_table_has_spot_for_every_type() {
        let pricing = PricingSnapshot::builtin();
        let m5 = pricing.get("us-east-1", "m5.large").unwrap();
        assert_eq!(m5.on_demand, 0.096);
        assert_eq!(m5.spot, Some(0.0288));
        assert!(pricing
            .region_types("us-east-1")
            .all(|(_, p)| p.spot_discount().is_some() && p.shape().is_some()));
        assert!(pricing.get("eu-west-1", "m5.large").is_none());
    }

    #[test]
    fn test_graviton_shape_is_arm() {
        let pricing = PricingSnapshot::builtin();
        let shape = pricing.get("us-east-1", "c6g.large").unwrap().shape().unwrap();
        assert_eq!(shape.arch, Architecture::Arm64);
        assert_eq!(shape.vcpu, 2);
    }

    #[test]
    fn test_shape_covers() {
        let small = InstanceShape {
            vcpu: 2,
            memory_gib: 4.0,
            arch: Architecture::Amd64,
        };
        let large = InstanceShape {
            vcpu: 2,
            memory_gib: 8.0,
            arch: Architecture::Amd64,
        };
        assert!(large.covers(&small));
        assert!(!small.covers(&large));
        assert!(small.covers(&small));
    }

    #[test]
    fn test_spot_discount_ignores_expensive_spot() {
        let price = InstancePrice::new(0.1, Some(0.2));
        assert_eq!(price.spot_discount(), None);
        assert_eq!(price.hourly(true), Some(0.2));
        assert_eq!(InstancePrice::new(0.1, None).hourly(true), None);
    }

    #[test]
    fn test_quote_monthly_figures() {
        let pricing = PricingSnapshot::builtin();
        let quote = pricing.quote("us-east-1", "m5.large").unwrap();
        assert_eq!(quote.monthly.on_demand, 70.08);
        assert_eq!(quote.monthly.spot, 21.02);
        assert_eq!(quote.spot.as_ref().unwrap().discount, "70%");

        let missing = pricing.quote("us-east-1", "x1.32xlarge");
        assert!(matches!(missing, Err(WizardError::NotFound { .. })));
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"prices":{{"eu-west-1":{{"m5.large":{{"onDemand":0.107,"spot":0.035,"vcpu":2,"memoryGib":8,"arch":"amd64"}}}}}}}}"#
        )
        .unwrap();

        let pricing = PricingSnapshot::from_path(file.path()).unwrap();
        let price = pricing.get("eu-west-1", "m5.large").unwrap();
        assert_eq!(price.on_demand, 0.107);
        assert_eq!(price.shape().unwrap().memory_gib, 8.0);
    }

    #[test]
    fn test_rejects_negative_prices() {
        let raw = r#"{"prices":{"us-east-1":{"m5.large":{"onDemand":-1.0}}}}"#;
        assert!(PricingSnapshot::from_json(raw).is_err());
    }
}
