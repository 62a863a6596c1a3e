//! Rebalancing planner and dry-run simulator
//!
//! A plan is an ordered list of [`RebalancingAction`]s built in three passes
//! over a working copy of the inventory: consolidation, spot conversion,
//! instance-type replacement. Each pass sees the nodes left by the previous
//! one, so a node is touched by at most one action.

mod simulate;

pub use simulate::{apply_actions, estimated_time, simulate, theoretical_max_savings, AppliedAction};

use crate::cost::{
    format_currency, round_cents, savings_percentage, select_spot_moves, tally, SpotPolicy,
};
use crate::error::WizardResult;
use crate::models::{
    EstimatedSavings, NodeInfo, NodeInventorySnapshot, RebalancingAction,
    RebalancingRecommendations, RebalancingStrategy,
};
use crate::pricing::{InstancePrice, PricingSnapshot, HOURS_PER_MONTH};
use std::collections::{BTreeMap, BTreeSet};

type GroupKey = (String, String);

/// Node indices grouped by (region, instance type)
pub(crate) fn group_nodes(nodes: &[NodeInfo]) -> BTreeMap<GroupKey, Vec<usize>> {
    let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
    for (index, node) in nodes.iter().enumerate() {
        groups
            .entry((node.region.clone(), node.instance_type.clone()))
            .or_default()
            .push(index);
    }
    groups
}

/// Cheapest on-demand type in the region whose shape covers `instance_type`,
/// with the same architecture. Prices at or above the current one are skipped.
pub(crate) fn cheapest_covering<'a>(
    pricing: &'a PricingSnapshot,
    region: &str,
    instance_type: &str,
    floor: Option<f64>,
) -> Option<(&'a String, &'a InstancePrice)> {
    let current = pricing.get(region, instance_type)?;
    let shape = current.shape()?;

    pricing
        .region_types(region)
        .filter(|(name, _)| name.as_str() != instance_type)
        .filter(|(_, price)| price.on_demand < current.on_demand)
        .filter(|(_, price)| floor.map_or(true, |f| price.on_demand >= f))
        .filter(|(_, price)| {
            price
                .shape()
                .map_or(false, |s| s.arch == shape.arch && s.covers(&shape))
        })
        .min_by(|a, b| a.1.on_demand.total_cmp(&b.1.on_demand).then_with(|| a.0.cmp(b.0)))
}

fn nodes_needed(requested: f64, per_node: f64) -> usize {
    if requested <= 0.0 {
        0
    } else {
        (requested / per_node - 1e-9).ceil().max(0.0) as usize
    }
}

/// Groups where every node reports utilization, with their surplus nodes
/// in drain order (on-demand first, then lowest CPU request, then name)
fn plan_consolidation(nodes: &[NodeInfo], target_utilization: f64) -> Vec<RebalancingAction> {
    let mut actions = Vec::new();

    for ((region, instance_type), indices) in group_nodes(nodes) {
        if indices.len() < 2 {
            continue;
        }
        let utilization: Option<Vec<_>> = indices
            .iter()
            .map(|&i| nodes[i].utilization.as_ref())
            .collect();
        let utilization = match utilization {
            Some(u) => u,
            None => continue,
        };

        let cores = indices.iter().map(|&i| nodes[i].cpu_cores).min().unwrap_or(0);
        let memory = indices
            .iter()
            .map(|&i| nodes[i].memory_gb)
            .fold(f64::INFINITY, f64::min);
        if cores == 0 || !(memory > 0.0) || !memory.is_finite() {
            continue;
        }

        let cpu_requested: f64 = utilization.iter().map(|u| u.cpu_requested).sum();
        let memory_requested: f64 = utilization.iter().map(|u| u.memory_requested_gb).sum();
        let needed = nodes_needed(cpu_requested, cores as f64 * target_utilization)
            .max(nodes_needed(memory_requested, memory * target_utilization))
            .max(1);
        if needed >= indices.len() {
            continue;
        }

        let mut order = indices.clone();
        order.sort_by(|&a, &b| {
            let (a, b) = (&nodes[a], &nodes[b]);
            let a_cpu = a.utilization.as_ref().map_or(0.0, |u| u.cpu_requested);
            let b_cpu = b.utilization.as_ref().map_or(0.0, |u| u.cpu_requested);
            a.is_spot
                .cmp(&b.is_spot)
                .then_with(|| a_cpu.total_cmp(&b_cpu))
                .then_with(|| a.name.cmp(&b.name))
        });

        let drain = indices.len() - needed;
        actions.push(RebalancingAction::Consolidate {
            region,
            instance_type,
            node_names: order[..drain].iter().map(|&i| nodes[i].name.clone()).collect(),
        });
    }

    actions
}

/// Plan rebalancing actions and describe them for the rebalancer view
pub fn recommend(
    inventory: &NodeInventorySnapshot,
    pricing: &PricingSnapshot,
    policy: &SpotPolicy,
    strategy: RebalancingStrategy,
) -> WizardResult<RebalancingRecommendations> {
    inventory.validate()?;

    let mut working = inventory.nodes.clone();
    let mut actions = Vec::new();
    let mut instance_type_optimization = Vec::new();
    let mut spot_instance_strategy = Vec::new();
    let mut consolidation = Vec::new();

    if strategy.allows_consolidation() {
        if !working.iter().any(|n| n.utilization.is_some()) {
            consolidation.push(
                "Node utilization data is unavailable; enable consolidation in the provisioner so Karpenter can bin-pack underutilized nodes"
                    .to_string(),
            );
        } else {
            let planned = plan_consolidation(&working, policy.target_utilization);
            if planned.is_empty() {
                consolidation.push(
                    "Node groups are packed within the utilization target; no consolidation opportunities found"
                        .to_string(),
                );
            }
            for action in planned {
                if let RebalancingAction::Consolidate {
                    region,
                    instance_type,
                    node_names,
                } = &action
                {
                    let freed: f64 = working
                        .iter()
                        .filter(|n| node_names.contains(&n.name))
                        .filter_map(|n| crate::cost::node_monthly_cost(n, pricing))
                        .sum();
                    consolidation.push(format!(
                        "Drain {} {} node(s) in {} ({}); remaining nodes stay under {:.0}% requested CPU and memory, saving {}/month",
                        node_names.len(),
                        instance_type,
                        region,
                        node_names.join(", "),
                        policy.target_utilization * 100.0,
                        format_currency(freed)
                    ));
                }
                working.retain(|n| !action.node_names().contains(&n.name));
                actions.push(action);
            }
        }
    }

    if strategy.allows_spot() {
        let selection = select_spot_moves(&working, pricing, policy);
        let mut per_group: BTreeMap<GroupKey, (Vec<String>, f64)> = BTreeMap::new();
        for candidate in &selection.selected {
            let node = &working[candidate.index];
            let entry = per_group
                .entry((node.region.clone(), node.instance_type.clone()))
                .or_default();
            entry.0.push(node.name.clone());
            entry.1 += candidate.monthly_savings;
        }
        for candidate in &selection.selected {
            working[candidate.index].is_spot = true;
        }

        for ((region, instance_type), (node_names, savings)) in per_group {
            spot_instance_strategy.push(format!(
                "Move {} on-demand {} node(s) in {} to Spot to save {}/month",
                node_names.len(),
                instance_type,
                region,
                format_currency(savings)
            ));
            actions.push(RebalancingAction::MoveToSpot {
                region,
                instance_type,
                node_names,
            });
        }

        if !selection.capped.is_empty() {
            spot_instance_strategy.push(format!(
                "Spot share is capped at {:.0}% of priced nodes; {} node(s) stay on-demand",
                policy.max_spot_fraction * 100.0,
                selection.capped.len()
            ));
        }

        let spot_types: BTreeSet<&str> = working
            .iter()
            .filter(|n| n.is_spot)
            .map(|n| n.instance_type.as_str())
            .collect();
        let spot_count = working.iter().filter(|n| n.is_spot).count();
        if spot_types.len() == 1 && spot_count >= 2 {
            if let Some(only) = spot_types.iter().next() {
                spot_instance_strategy.push(format!(
                    "All {} Spot node(s) run {}; diversify across several instance families to reduce interruption risk",
                    spot_count, only
                ));
            }
        }
    }

    if strategy.allows_instance_types() {
        let groups = group_nodes(&working);
        let mut replacements = Vec::new();
        for ((region, instance_type), indices) in &groups {
            let on_demand: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|&i| !working[i].is_spot)
                .collect();
            if on_demand.is_empty() {
                continue;
            }
            let current = match pricing.get(region, instance_type) {
                Some(p) => p,
                None => continue,
            };
            let floor = current.spot_discount();
            if let Some((to, price)) = cheapest_covering(pricing, region, instance_type, floor) {
                let savings =
                    (current.on_demand - price.on_demand) * HOURS_PER_MONTH * on_demand.len() as f64;
                let node_names: Vec<String> =
                    on_demand.iter().map(|&i| working[i].name.clone()).collect();
                instance_type_optimization.push(format!(
                    "Replace {} on-demand {} node(s) in {} with {} ({}) to save {}/month",
                    node_names.len(),
                    instance_type,
                    region,
                    to,
                    describe_shape(price),
                    format_currency(savings)
                ));
                replacements.push(RebalancingAction::ReplaceInstanceType {
                    region: region.clone(),
                    from: instance_type.clone(),
                    to: to.clone(),
                    node_names,
                });
            }
        }
        if replacements.is_empty() {
            instance_type_optimization.push(
                "On-demand nodes already run the cheapest instance types that fit their shape"
                    .to_string(),
            );
        }
        actions.extend(replacements);
    }

    let before = tally(&inventory.nodes, pricing).rounded();
    let mut after_nodes = inventory.nodes.clone();
    apply_actions(&mut after_nodes, pricing, &actions);
    let after = tally(&after_nodes, pricing).rounded();
    let saved = round_cents(before.total - after.total);

    Ok(RebalancingRecommendations {
        instance_type_optimization,
        spot_instance_strategy,
        consolidation,
        estimated_savings: EstimatedSavings {
            monthly: format_currency(saved),
            percentage: savings_percentage(before.total, saved),
        },
        actions,
    })
}

fn describe_shape(price: &InstancePrice) -> String {
    match price.shape() {
        Some(shape) => format!("{} vCPU, {} GiB", shape.vcpu, shape.memory_gib),
        None => "unknown shape".to_string(),
    }
}
