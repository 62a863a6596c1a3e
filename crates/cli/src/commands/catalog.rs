//! Preset listing and provisioner configuration generation

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tabled::Tabled;
use wizard_lib::{ConfigRequest, GeneratedConfiguration};

use crate::client::ApiClient;
use crate::output::{
    color_flag, print_heading, print_info, print_json, print_success, render_table, OutputFormat,
};

pub const PROVISIONER_FILE: &str = "provisioner.yaml";
pub const NODE_TEMPLATE_FILE: &str = "node-template.yaml";

/// Row for presets table
#[derive(Tabled)]
struct PresetRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Spot")]
    spot_ratio: String,
    #[tabled(rename = "Instance Types")]
    instance_types: String,
    #[tabled(rename = "Limits")]
    limits: String,
    #[tabled(rename = "Features")]
    features: String,
}

/// Row for feature flags table
#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "Feature")]
    id: String,
    #[tabled(rename = "Default")]
    default_enabled: String,
    #[tabled(rename = "Description")]
    description: String,
}

/// List presets, feature flags and regions
pub async fn list_presets(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result = client.presets().await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rows: Vec<PresetRow> = result
                .presets
                .values()
                .map(|p| PresetRow {
                    id: p.id.cyan().to_string(),
                    name: p.name.clone(),
                    spot_ratio: format!("{}%", p.spot_ratio),
                    instance_types: p.instance_types.join(", "),
                    limits: format!("{} CPU / {}", p.resource_limits.cpu, p.resource_limits.memory),
                    features: p.features.join(", "),
                })
                .collect();
            println!("{}", render_table(rows));
            println!();

            let rows: Vec<FeatureRow> = result
                .features
                .values()
                .map(|f| FeatureRow {
                    id: f.id.clone(),
                    default_enabled: color_flag(f.default_enabled),
                    description: f.description.clone(),
                })
                .collect();
            println!("{}", render_table(rows));
            println!();

            println!("Regions: {}", result.regions.join(", "));
            println!("Catalog version: {}", result.version.dimmed());
        }
    }

    Ok(())
}

/// Parse `key=value`; the value is read as JSON when it parses, else as a string
pub fn parse_customization(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in `{}`", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Inputs to `kow generate`
pub struct GenerateArgs {
    pub preset: String,
    pub region: String,
    pub zone: String,
    pub enable: Vec<String>,
    pub disable: Vec<String>,
    pub customizations: Vec<(String, Value)>,
    pub output_dir: Option<PathBuf>,
}

impl GenerateArgs {
    pub fn to_request(&self) -> ConfigRequest {
        let mut request = ConfigRequest::new(&self.preset, &self.region, &self.zone);
        for id in &self.enable {
            request = request.with_feature(id, true);
        }
        // disabling wins when a feature is named both ways
        for id in &self.disable {
            request = request.with_feature(id, false);
        }
        for (key, value) in &self.customizations {
            request = request.with_customization(key, value.clone());
        }
        request
    }
}

/// Write both manifests into `dir`, creating it if needed
pub fn write_manifests(config: &GeneratedConfiguration, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let provisioner = dir.join(PROVISIONER_FILE);
    std::fs::write(&provisioner, config.provisioner_yaml()?)
        .with_context(|| format!("Failed to write {}", provisioner.display()))?;

    let node_template = dir.join(NODE_TEMPLATE_FILE);
    std::fs::write(&node_template, config.node_template_yaml()?)
        .with_context(|| format!("Failed to write {}", node_template.display()))?;

    Ok((provisioner, node_template))
}

/// Generate provisioner and node template manifests
pub async fn generate(client: &ApiClient, args: GenerateArgs, format: OutputFormat) -> Result<()> {
    let config = client.generate_config(&args.to_request()).await?;

    if let Some(dir) = &args.output_dir {
        let (provisioner, node_template) = write_manifests(&config, dir)?;
        if format == OutputFormat::Json {
            return print_json(&config.summary);
        }
        print_success(&format!("Wrote {}", provisioner.display()));
        print_success(&format!("Wrote {}", node_template.display()));
        println!();
        print_instructions(&config);
        return Ok(());
    }

    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Table => {
            print_heading("Generated Configuration", 50);
            println!("Preset:   {}", config.summary.preset_id.cyan());
            println!("Region:   {}", config.summary.region);
            println!("Zone:     {}", config.summary.zone);
            let features: Vec<String> = config
                .summary
                .features
                .iter()
                .map(|(id, on)| format!("{}={}", id, color_flag(*on)))
                .collect();
            println!("Features: {}", features.join(" "));
            println!();

            println!("{}", config.provisioner_yaml()?);
            println!("---");
            println!("{}", config.node_template_yaml()?);
            print_instructions(&config);
        }
    }

    Ok(())
}

fn print_instructions(config: &GeneratedConfiguration) {
    print_info("Next steps:");
    for step in &config.summary.instructions {
        println!("  {}", step);
    }
}
