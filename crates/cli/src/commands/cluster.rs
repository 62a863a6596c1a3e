//! Cluster cost and inventory commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;
use wizard_lib::cost::format_currency;

use crate::client::ApiClient;
use crate::output::{
    color_capacity, color_percentage, color_state, format_gib, print_heading, print_json,
    print_warning, render_table, OutputFormat,
};

/// Row for cost breakdown table
#[derive(Tabled)]
struct CostRow {
    #[tabled(rename = "")]
    label: String,
    #[tabled(rename = "On-Demand")]
    ondemand: String,
    #[tabled(rename = "Spot")]
    spot: String,
    #[tabled(rename = "Total")]
    total: String,
}

/// Row for nodes table
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    instance_type: String,
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Capacity")]
    capacity_type: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Requested")]
    requested: String,
    #[tabled(rename = "State")]
    state: String,
}

/// Row for pods table
#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "CPU Req")]
    cpu: String,
    #[tabled(rename = "Mem Req")]
    memory: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Show current vs. potential monthly cost
pub async fn show_cost(client: &ApiClient, preset: Option<&str>, format: OutputFormat) -> Result<()> {
    let result = client.cluster_cost(preset).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_heading("Cluster Cost (monthly)", 50);
            if let Some(preset) = preset {
                println!("Spot policy from preset: {}", preset.cyan());
                println!();
            }

            let rows = vec![
                CostRow {
                    label: "Current".to_string(),
                    ondemand: format_currency(result.current.ondemand),
                    spot: format_currency(result.current.spot),
                    total: format_currency(result.current.total),
                },
                CostRow {
                    label: "Potential".to_string(),
                    ondemand: format_currency(result.potential.ondemand),
                    spot: format_currency(result.potential.spot),
                    total: format_currency(result.potential.total).green().to_string(),
                },
            ];
            println!("{}", render_table(rows));
            println!();

            println!(
                "{} {} ({})",
                "Potential Savings:".bold(),
                format_currency(result.savings.amount).green().bold(),
                color_percentage(result.savings.percentage)
            );

            if !result.recommendations.is_empty() {
                println!();
                println!("{}", "Recommendations".bold());
                println!("{}", "-".repeat(50));
                for rec in &result.recommendations {
                    println!("  • {}", rec);
                }
            }
        }
    }

    Ok(())
}

/// List cluster nodes
pub async fn list_nodes(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result = client.cluster_nodes().await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.nodes.is_empty() {
                print_warning("No nodes found");
                return Ok(());
            }

            let rows: Vec<NodeRow> = result
                .nodes
                .iter()
                .map(|n| NodeRow {
                    name: n.name.clone(),
                    instance_type: n.instance_type.clone(),
                    zone: n.zone.clone(),
                    capacity_type: color_capacity(n.is_spot),
                    cpu: n.cpu_cores.to_string(),
                    memory: format_gib(n.memory_gb),
                    requested: n
                        .utilization
                        .as_ref()
                        .map(|u| format!("{:.2} / {}", u.cpu_requested, format_gib(u.memory_requested_gb)))
                        .unwrap_or_else(|| "-".to_string()),
                    state: color_state(&n.state),
                })
                .collect();
            println!("{}", render_table(rows));
            println!(
                "\nTotal: {} nodes ({} spot, {} on-demand), {} vCPU, {}",
                result.total_nodes,
                result.spot_nodes,
                result.on_demand_nodes,
                result.total_cpu,
                format_gib(result.total_memory)
            );
        }
    }

    Ok(())
}

/// List pods and their requests
pub async fn list_pods(client: &ApiClient, namespace: Option<&str>, format: OutputFormat) -> Result<()> {
    let result = client.cluster_pods().await?;
    let pods: Vec<_> = result
        .pods
        .iter()
        .filter(|p| namespace.map_or(true, |ns| p.namespace == ns))
        .collect();

    match format {
        OutputFormat::Json => print_json(&pods)?,
        OutputFormat::Table => {
            if pods.is_empty() {
                print_warning("No pods found");
                return Ok(());
            }

            let rows: Vec<PodRow> = pods
                .iter()
                .map(|p| PodRow {
                    namespace: p.namespace.clone(),
                    name: p.name.clone(),
                    node: p.node_name.clone(),
                    cpu: format!("{:.2}", p.cpu_request),
                    memory: format_gib(p.memory_request_gb),
                    status: color_state(&p.status),
                })
                .collect();
            println!("{}", render_table(rows));
            println!("\nTotal: {} pods", pods.len());
        }
    }

    Ok(())
}
