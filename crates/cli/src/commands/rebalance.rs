//! Rebalancing recommendations and dry-run simulation

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use wizard_lib::{RebalancingStrategy, SimulationRequest};

use crate::client::ApiClient;
use crate::output::{color_percentage, print_heading, print_json, print_warning, OutputFormat};

/// Which action kinds a plan may contain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    #[default]
    Full,
    SpotOnly,
    InstanceTypeOnly,
    ConsolidationOnly,
}

impl From<StrategyArg> for RebalancingStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Full => RebalancingStrategy::Full,
            StrategyArg::SpotOnly => RebalancingStrategy::SpotOnly,
            StrategyArg::InstanceTypeOnly => RebalancingStrategy::InstanceTypeOnly,
            StrategyArg::ConsolidationOnly => RebalancingStrategy::ConsolidationOnly,
        }
    }
}

fn print_section(title: &str, items: &[String]) {
    println!("{}", title.bold());
    if items.is_empty() {
        println!("  {}", "nothing to suggest".dimmed());
    }
    for item in items {
        println!("  • {}", item);
    }
    println!();
}

/// Show rebalancing recommendations
pub async fn show_recommendations(
    client: &ApiClient,
    preset: Option<&str>,
    strategy: StrategyArg,
    format: OutputFormat,
) -> Result<()> {
    let result = client.rebalancing(preset, strategy.into()).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_heading("Rebalancing Recommendations", 60);
            print_section("Instance Type Optimization", &result.instance_type_optimization);
            print_section("Spot Instance Strategy", &result.spot_instance_strategy);
            print_section("Consolidation", &result.consolidation);

            println!(
                "{} {}/month ({})",
                "Estimated Savings:".bold(),
                result.estimated_savings.monthly.green().bold(),
                color_percentage(result.estimated_savings.percentage)
            );
            println!("Planned actions: {}", result.actions.len());
        }
    }

    Ok(())
}

/// Dry-run the rebalancing plan
pub async fn simulate(
    client: &ApiClient,
    preset: Option<String>,
    strategy: StrategyArg,
    format: OutputFormat,
) -> Result<()> {
    let request = SimulationRequest {
        strategy: strategy.into(),
        preset_id: preset,
    };
    let result = client.simulate(&request).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_heading("Rebalancing Simulation (dry run)", 60);

            if result.actions.is_empty() {
                print_warning("No rebalancing actions apply to this cluster");
            } else {
                for (i, action) in result.actions.iter().enumerate() {
                    println!("  {}. {}", i + 1, action);
                }
            }
            println!();

            println!(
                "{} {} ({})",
                "Savings:".bold(),
                result.savings.amount.green().bold(),
                color_percentage(result.savings.percentage)
            );
            println!("Estimated time: {}", result.estimated_time);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_arg_names() {
        assert_eq!(
            StrategyArg::from_str("spot-only", false).unwrap(),
            StrategyArg::SpotOnly
        );
        assert_eq!(
            RebalancingStrategy::from(StrategyArg::ConsolidationOnly),
            RebalancingStrategy::ConsolidationOnly
        );
    }
}
