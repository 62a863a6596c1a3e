//! Dry-run application of a rebalancing plan

use super::{cheapest_covering, group_nodes};
use crate::cost::{format_currency, node_monthly_cost, round_cents, savings_percentage, tally};
use crate::error::WizardResult;
use crate::models::{
    NodeInfo, NodeInventorySnapshot, RebalancingAction, RebalancingRecommendations,
    SimulationResult, SimulationSavings,
};
use crate::pricing::{PricingSnapshot, HOURS_PER_MONTH};

const MINUTES_PER_SPOT_MOVE: u64 = 10;
const MINUTES_PER_REPLACEMENT: u64 = 12;
const MINUTES_PER_CONSOLIDATION: u64 = 8;

/// An action as it actually applied to the node list
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAction {
    pub kind: &'static str,
    pub nodes: usize,
    pub description: String,
}

impl AppliedAction {
    fn minutes(&self) -> u64 {
        let per_node = match self.kind {
            "move_to_spot" => MINUTES_PER_SPOT_MOVE,
            "replace_instance_type" => MINUTES_PER_REPLACEMENT,
            _ => MINUTES_PER_CONSOLIDATION,
        };
        per_node * self.nodes as u64
    }
}

fn matches(node: &NodeInfo, region: &str, instance_type: &str) -> bool {
    node.region == region && node.instance_type == instance_type
}

/// Apply `actions` to `nodes` in order.
///
/// Nodes that no longer exist or no longer match what the action expects
/// are skipped; actions that end up touching nothing are dropped.
pub fn apply_actions(
    nodes: &mut Vec<NodeInfo>,
    pricing: &PricingSnapshot,
    actions: &[RebalancingAction],
) -> Vec<AppliedAction> {
    let mut applied = Vec::new();

    for action in actions {
        let (count, description) = match action {
            RebalancingAction::MoveToSpot {
                region,
                instance_type,
                node_names,
            } => {
                let mut count = 0;
                for node in nodes.iter_mut() {
                    if node_names.contains(&node.name)
                        && matches(node, region, instance_type)
                        && !node.is_spot
                    {
                        node.is_spot = true;
                        count += 1;
                    }
                }
                (
                    count,
                    format!(
                        "Move {} {} node(s) in {} from on-demand to Spot",
                        count, instance_type, region
                    ),
                )
            }
            RebalancingAction::ReplaceInstanceType {
                region,
                from,
                to,
                node_names,
            } => {
                let shape = pricing.get(region, to).and_then(|p| p.shape());
                let mut count = 0;
                for node in nodes.iter_mut() {
                    if node_names.contains(&node.name) && matches(node, region, from) && !node.is_spot
                    {
                        node.instance_type = to.clone();
                        if let Some(shape) = shape {
                            node.cpu_cores = shape.vcpu;
                            node.memory_gb = shape.memory_gib;
                        }
                        count += 1;
                    }
                }
                (
                    count,
                    format!("Replace {} {} node(s) in {} with {}", count, from, region, to),
                )
            }
            RebalancingAction::Consolidate {
                region,
                instance_type,
                node_names,
            } => {
                let before = nodes.len();
                nodes.retain(|n| !(node_names.contains(&n.name) && matches(n, region, instance_type)));
                let count = before - nodes.len();
                (
                    count,
                    format!(
                        "Consolidate {} underutilized {} node(s) in {}",
                        count, instance_type, region
                    ),
                )
            }
        };

        if count > 0 {
            applied.push(AppliedAction {
                kind: action.kind(),
                nodes: count,
                description,
            });
        }
    }

    applied
}

/// Fixed-rate estimate of how long the applied actions take
pub fn estimated_time(applied: &[AppliedAction]) -> String {
    let minutes: u64 = applied.iter().map(AppliedAction::minutes).sum();
    if minutes < 60 {
        format!("{} minutes", minutes)
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}

/// Apply a plan to a copy of the inventory and report the cost delta
pub fn simulate(
    inventory: &NodeInventorySnapshot,
    pricing: &PricingSnapshot,
    recommendations: &RebalancingRecommendations,
) -> WizardResult<SimulationResult> {
    inventory.validate()?;

    let mut nodes = inventory.nodes.clone();
    let applied = apply_actions(&mut nodes, pricing, &recommendations.actions);

    let before = tally(&inventory.nodes, pricing).rounded();
    let after = tally(&nodes, pricing).rounded();
    let saved = round_cents(before.total - after.total);

    Ok(SimulationResult {
        savings: SimulationSavings {
            amount: format_currency(saved),
            percentage: savings_percentage(before.total, saved),
        },
        estimated_time: estimated_time(&applied),
        actions: applied.into_iter().map(|a| a.description).collect(),
    })
}

/// Upper bound on monthly savings any plan can reach for this inventory.
///
/// Every on-demand node may fall to the cheaper of its spot price and the
/// cheapest covering on-demand type. Where a group carries utilization data,
/// all but its cheapest node may additionally be drained.
pub fn theoretical_max_savings(inventory: &NodeInventorySnapshot, pricing: &PricingSnapshot) -> f64 {
    let mut bound = 0.0;

    for node in inventory.nodes.iter().filter(|n| !n.is_spot) {
        let price = match pricing.get(&node.region, &node.instance_type) {
            Some(p) => p,
            None => continue,
        };
        let mut floor = price.on_demand;
        if let Some(spot) = price.spot_discount() {
            floor = floor.min(spot);
        }
        if let Some((_, cheaper)) =
            cheapest_covering(pricing, &node.region, &node.instance_type, None)
        {
            floor = floor.min(cheaper.on_demand);
        }
        bound += (price.on_demand - floor) * HOURS_PER_MONTH;
    }

    for indices in group_nodes(&inventory.nodes).values() {
        if indices.len() < 2
            || indices
                .iter()
                .any(|&i| inventory.nodes[i].utilization.is_none())
        {
            continue;
        }
        let costs: Vec<f64> = indices
            .iter()
            .filter_map(|&i| node_monthly_cost(&inventory.nodes[i], pricing))
            .collect();
        let cheapest = costs.iter().copied().fold(f64::INFINITY, f64::min);
        if cheapest.is_finite() {
            bound += costs.iter().sum::<f64>() - cheapest;
        }
    }

    round_cents(bound)
}
