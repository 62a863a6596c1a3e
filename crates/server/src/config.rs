//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use wizard_lib::providers::RefreshCadence;
use wizard_lib::SpotPolicy;

/// Where node and pod inventory comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventorySource {
    /// Live cluster through the Kubernetes API
    #[default]
    Kube,
    /// JSON snapshot at `inventory_path`
    File,
    /// Empty in-memory inventory
    Static,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Name attached to structured events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Catalog file; the built-in catalog is served when unset
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// Reload the catalog when `catalog_path` changes on disk
    #[serde(default = "default_true")]
    pub watch_catalog: bool,

    #[serde(default)]
    pub inventory_source: InventorySource,

    #[serde(default)]
    pub inventory_path: Option<PathBuf>,

    /// Pricing file; the built-in table is used when unset
    #[serde(default)]
    pub pricing_path: Option<PathBuf>,

    #[serde(default)]
    pub pricing_refresh: RefreshCadence,

    /// Upper bound on a single inventory or pricing fetch
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,

    /// Spot ceiling used when no preset context is given
    #[serde(default = "default_max_spot_fraction")]
    pub default_max_spot_fraction: f64,

    #[serde(default = "default_min_monthly_savings")]
    pub min_monthly_savings: f64,

    #[serde(default = "default_target_utilization")]
    pub target_utilization: f64,

    /// Comma-separated list of allowed browser origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_port() -> u16 {
    8080
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "karp-ops".to_string())
}

fn default_true() -> bool {
    true
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_max_spot_fraction() -> f64 {
    0.7
}

fn default_min_monthly_savings() -> f64 {
    1.0
}

fn default_target_utilization() -> f64 {
    0.8
}

fn default_cors_origins() -> String {
    "http://localhost:3000,http://localhost:5173".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            instance_name: default_instance_name(),
            catalog_path: None,
            watch_catalog: default_true(),
            inventory_source: InventorySource::default(),
            inventory_path: None,
            pricing_path: None,
            pricing_refresh: RefreshCadence::default(),
            upstream_timeout_secs: default_upstream_timeout(),
            default_max_spot_fraction: default_max_spot_fraction(),
            min_monthly_savings: default_min_monthly_savings(),
            target_utilization: default_target_utilization(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from an optional `karp-ops.*` file and `KARP_OPS__*`
    /// environment variables. A bare `PORT` overrides the configured port.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("karp-ops").required(false))
            .add_source(
                config::Environment::with_prefix("KARP_OPS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: ServerConfig = config
            .try_deserialize()
            .context("invalid karp-ops configuration")?;

        if let Ok(port) = std::env::var("PORT") {
            loaded.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port: {}", port))?;
        }

        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<()> {
        if self.inventory_source == InventorySource::File && self.inventory_path.is_none() {
            anyhow::bail!("inventory_source = file requires inventory_path");
        }
        if !(0.0..=1.0).contains(&self.default_max_spot_fraction) {
            anyhow::bail!(
                "default_max_spot_fraction must be within 0..=1, got {}",
                self.default_max_spot_fraction
            );
        }
        if !(self.target_utilization > 0.0 && self.target_utilization <= 1.0) {
            anyhow::bail!(
                "target_utilization must be within (0, 1], got {}",
                self.target_utilization
            );
        }
        Ok(())
    }

    pub fn spot_policy(&self) -> SpotPolicy {
        SpotPolicy {
            max_spot_fraction: self.default_max_spot_fraction,
            min_monthly_savings: self.min_monthly_savings,
            target_utilization: self.target_utilization,
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.inventory_source, InventorySource::Kube);
        assert_eq!(config.pricing_refresh, RefreshCadence::Daily);
        assert_eq!(config.spot_policy(), SpotPolicy::default());
        assert_eq!(config.upstream_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_cors_origin_list_splits_and_trims() {
        let config = ServerConfig {
            cors_origins: " http://a.test , ,http://b.test".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(config.cors_origin_list(), vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_file_inventory_requires_path() {
        let config = ServerConfig {
            inventory_source: InventorySource::File,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            inventory_source: InventorySource::File,
            inventory_path: Some(PathBuf::from("/tmp/inventory.json")),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_spot_fraction_bounds() {
        let config = ServerConfig {
            default_max_spot_fraction: 1.5,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_source() {
        let raw = config::Config::builder()
            .add_source(config::File::from_str(
                r#"{"port": 9090, "inventory_source": "static", "pricing_refresh": "manual"}"#,
                config::FileFormat::Json,
            ))
            .build()
            .unwrap();
        let config: ServerConfig = raw.try_deserialize().unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.inventory_source, InventorySource::Static);
        assert_eq!(config.pricing_refresh, RefreshCadence::Manual);
        assert_eq!(config.default_max_spot_fraction, 0.7);
    }
}
