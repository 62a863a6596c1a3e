//! Karpenter Optimization Wizard CLI
//!
//! A command-line tool for browsing presets, generating provisioner
//! manifests, and reviewing cluster cost and rebalancing plans.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::catalog::{parse_customization, GenerateArgs};
use commands::rebalance::StrategyArg;
use commands::{catalog, cluster, pricing, rebalance, settings};
use serde_json::Value;
use std::path::PathBuf;

/// Karpenter Optimization Wizard CLI
#[derive(Parser)]
#[command(name = "kow")]
#[command(author, version, about = "CLI for the Karpenter Optimization Wizard", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via KOW_API_URL env var)
    #[arg(long, env = "KOW_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List optimization presets, feature flags and regions
    Presets,

    /// Generate provisioner and node template manifests
    Generate {
        /// Preset ID (cost-optimized, performance, balanced)
        #[arg(long, short)]
        preset: Option<String>,

        /// AWS region
        #[arg(long, short, default_value = "us-east-1")]
        region: String,

        /// Availability zone inside the region
        #[arg(long, short)]
        zone: String,

        /// Turn a feature flag on (repeatable)
        #[arg(long)]
        enable: Vec<String>,

        /// Turn a feature flag off (repeatable)
        #[arg(long)]
        disable: Vec<String>,

        /// Override a manifest field, as key=value (repeatable)
        #[arg(long = "set", value_parser = parse_customization)]
        customizations: Vec<(String, Value)>,

        /// Write provisioner.yaml and node-template.yaml into this directory
        #[arg(long, short)]
        output_dir: Option<PathBuf>,
    },

    /// Show current and potential monthly cost
    Cost {
        /// Take the spot policy from this preset
        #[arg(long, short)]
        preset: Option<String>,
    },

    /// List cluster nodes
    Nodes,

    /// List pods and their resource requests
    Pods {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Instance pricing
    #[command(subcommand)]
    Pricing(PricingCommands),

    /// Show rebalancing recommendations
    Rebalance {
        /// Take the spot policy from this preset
        #[arg(long, short)]
        preset: Option<String>,

        /// Limit the plan to one kind of action
        #[arg(long, short, value_enum, default_value_t = StrategyArg::Full)]
        strategy: StrategyArg,
    },

    /// Dry-run a rebalancing plan without touching the cluster
    Simulate {
        /// Take the spot policy from this preset
        #[arg(long, short)]
        preset: Option<String>,

        /// Limit the plan to one kind of action
        #[arg(long, short, value_enum, default_value_t = StrategyArg::Full)]
        strategy: StrategyArg,
    },

    /// Local CLI settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum PricingCommands {
    /// Show on-demand and spot price for an instance type
    Quote {
        /// AWS region
        region: String,

        /// Instance type (e.g. m5.large)
        instance_type: String,
    },

    /// Refetch pricing on the server
    Refresh,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show stored settings
    Show,

    /// Update stored settings
    Set {
        /// Default API endpoint URL
        #[arg(long)]
        api_url: Option<String>,

        /// Default output format
        #[arg(long)]
        format: Option<output::OutputFormat>,

        /// Default preset
        #[arg(long)]
        preset: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;

    let format = config.resolve_format(cli.format);
    let api_url = config.resolve_api_url(cli.api_url.as_deref());
    if cli.verbose {
        output::print_info(&format!("Using API at {}", api_url));
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Presets => {
            catalog::list_presets(&client, format).await?;
        }
        Commands::Generate {
            preset,
            region,
            zone,
            enable,
            disable,
            customizations,
            output_dir,
        } => {
            let Some(preset) = config.resolve_preset(preset) else {
                anyhow::bail!("No preset given; pass --preset or run `kow config set --preset`");
            };
            let args = GenerateArgs {
                preset,
                region,
                zone,
                enable,
                disable,
                customizations,
                output_dir,
            };
            catalog::generate(&client, args, format).await?;
        }
        Commands::Cost { preset } => {
            let preset = config.resolve_preset(preset);
            cluster::show_cost(&client, preset.as_deref(), format).await?;
        }
        Commands::Nodes => {
            cluster::list_nodes(&client, format).await?;
        }
        Commands::Pods { namespace } => {
            cluster::list_pods(&client, namespace.as_deref(), format).await?;
        }
        Commands::Pricing(pricing_cmd) => match pricing_cmd {
            PricingCommands::Quote {
                region,
                instance_type,
            } => {
                pricing::show_quote(&client, &region, &instance_type, format).await?;
            }
            PricingCommands::Refresh => {
                pricing::refresh(&client, format).await?;
            }
        },
        Commands::Rebalance { preset, strategy } => {
            let preset = config.resolve_preset(preset);
            rebalance::show_recommendations(&client, preset.as_deref(), strategy, format).await?;
        }
        Commands::Simulate { preset, strategy } => {
            let preset = config.resolve_preset(preset);
            rebalance::simulate(&client, preset, strategy, format).await?;
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => {
                settings::show(&config, format)?;
            }
            ConfigCommands::Set {
                api_url,
                format: default_format,
                preset,
            } => {
                settings::set(config, api_url, default_format, preset)?;
            }
        },
    }

    Ok(())
}
