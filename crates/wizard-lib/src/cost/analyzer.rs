//! Current vs. potential cost and the recommendations derived from it

use super::{
    format_currency, round_cents, savings_percentage, select_spot_moves, tally, PricingGap,
    SpotPolicy, SpotSelection,
};
use crate::error::WizardResult;
use crate::models::{CostSnapshot, NodeInfo, NodeInventorySnapshot, Savings};
use crate::pricing::PricingSnapshot;
use std::collections::{BTreeMap, BTreeSet};

/// Price the inventory as it is and as it would be after moving eligible
/// on-demand nodes to spot, up to the policy's spot ceiling.
///
/// Nodes without a price are left out of every sum and reported through the
/// first recommendation instead of failing the analysis.
pub fn analyze(
    inventory: &NodeInventorySnapshot,
    pricing: &PricingSnapshot,
    policy: &SpotPolicy,
) -> WizardResult<CostSnapshot> {
    inventory.validate()?;
    let nodes = &inventory.nodes;

    let current = tally(nodes, pricing);
    let selection = select_spot_moves(nodes, pricing, policy);

    let mut potential_nodes = nodes.clone();
    for candidate in &selection.selected {
        potential_nodes[candidate.index].is_spot = true;
    }
    let potential = tally(&potential_nodes, pricing);

    let current_rounded = current.rounded();
    let potential_rounded = potential.rounded();
    let amount = round_cents(current_rounded.total - potential_rounded.total);

    Ok(CostSnapshot {
        current: current_rounded,
        potential: potential_rounded,
        savings: Savings {
            amount,
            percentage: savings_percentage(current_rounded.total, amount),
        },
        recommendations: recommendations(nodes, pricing, policy, &current.gaps, &selection),
    })
}

fn recommendations(
    nodes: &[NodeInfo],
    pricing: &PricingSnapshot,
    policy: &SpotPolicy,
    gaps: &[PricingGap],
    selection: &SpotSelection,
) -> Vec<String> {
    let mut out = Vec::new();

    if !gaps.is_empty() {
        let types: BTreeSet<String> = gaps
            .iter()
            .map(|g| format!("{} ({}, {})", g.instance_type, g.region, g.capacity_type))
            .collect();
        out.push(format!(
            "Pricing data is missing for {} node(s): {}; they are excluded from cost totals",
            gaps.len(),
            types.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }

    let mut per_type: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for candidate in &selection.selected {
        let entry = per_type
            .entry(nodes[candidate.index].instance_type.as_str())
            .or_default();
        entry.0 += 1;
        entry.1 += candidate.monthly_savings;
    }
    let mut per_type: Vec<_> = per_type.into_iter().collect();
    per_type.sort_by(|(a_type, (_, a)), (b_type, (_, b))| {
        b.total_cmp(a).then_with(|| a_type.cmp(b_type))
    });
    for (instance_type, (count, savings)) in per_type {
        if round_cents(savings) > policy.min_monthly_savings {
            out.push(format!(
                "Move {} on-demand {} node(s) to Spot to save {}/month",
                count,
                instance_type,
                format_currency(savings)
            ));
        }
    }

    if !selection.capped.is_empty() {
        out.push(format!(
            "Spot share is capped at {:.0}% of priced nodes ({} node(s)); {} more on-demand node(s) are Spot-eligible if the policy allows",
            policy.max_spot_fraction * 100.0,
            selection.ceiling,
            selection.capped.len()
        ));
    }

    let no_spot: BTreeSet<&str> = nodes
        .iter()
        .filter(|n| !n.is_spot)
        .filter(|n| {
            pricing
                .get(&n.region, &n.instance_type)
                .map(|p| p.spot_discount().is_none())
                .unwrap_or(false)
        })
        .map(|n| n.instance_type.as_str())
        .collect();
    if !no_spot.is_empty() {
        let count = nodes
            .iter()
            .filter(|n| !n.is_spot && no_spot.contains(n.instance_type.as_str()))
            .filter(|n| pricing.get(&n.region, &n.instance_type).is_some())
            .count();
        out.push(format!(
            "{} on-demand node(s) run instance types without discounted Spot pricing ({}); consider types with Spot availability",
            count,
            no_spot.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WizardError;
    use crate::pricing::InstancePrice;

    fn fleet(count: usize, instance_type: &str) -> Vec<NodeInfo> {
        (0..count)
            .map(|i| {
                NodeInfo::new(format!("node-{:02}", i), instance_type, "us-east-1a", false)
                    .with_capacity(2, 8.0)
            })
            .collect()
    }

    #[test]
    fn test_empty_inventory_is_all_zero() {
        let snapshot = analyze(
            &NodeInventorySnapshot::empty(),
            &PricingSnapshot::builtin(),
            &SpotPolicy::default(),
        )
        .unwrap();
        assert_eq!(snapshot.current.total, 0.0);
        assert_eq!(snapshot.potential.total, 0.0);
        assert_eq!(snapshot.savings.percentage, 0.0);
        assert!(snapshot.recommendations.is_empty());
    }

    #[test]
    fn test_ten_on_demand_m5_large() {
        let inventory = NodeInventorySnapshot::from_nodes(fleet(10, "m5.large"));
        let snapshot =
            analyze(&inventory, &PricingSnapshot::builtin(), &SpotPolicy::default()).unwrap();

        assert!((snapshot.current.total - 700.8).abs() < 0.01);
        assert_eq!(snapshot.current.spot, 0.0);
        assert!(snapshot.potential.total <= snapshot.current.total);
        assert!(snapshot.savings.amount >= 0.0);
        // 7 of 10 may move under the default 0.7 ceiling
        assert!((snapshot.potential.spot - 7.0 * 21.024).abs() < 0.01);
        assert!((snapshot.potential.ondemand - 3.0 * 70.08).abs() < 0.01);
        assert_eq!(
            snapshot.savings.amount,
            round_cents(snapshot.current.total - snapshot.potential.total)
        );

        assert!(snapshot.recommendations[0].starts_with("Move 7 on-demand m5.large"));
        assert!(snapshot.recommendations[1].contains("3 more on-demand"));
        assert_eq!(snapshot.recommendations.len(), 2);
    }

    #[test]
    fn test_preset_ceiling_zero_means_no_moves() {
        let inventory = NodeInventorySnapshot::from_nodes(fleet(4, "m5.large"));
        let policy = SpotPolicy::default().with_max_spot_fraction(0.0);
        let snapshot = analyze(&inventory, &PricingSnapshot::builtin(), &policy).unwrap();
        assert_eq!(snapshot.savings.amount, 0.0);
        assert_eq!(snapshot.potential, snapshot.current);
        assert!(snapshot.recommendations[0].contains("capped at 0%"));
    }

    #[test]
    fn test_missing_price_is_excluded_and_reported_first() {
        let mut nodes = fleet(2, "m5.large");
        nodes.push(NodeInfo::new("mystery", "z9.huge", "us-east-1a", false));
        let inventory = NodeInventorySnapshot::from_nodes(nodes);
        let policy = SpotPolicy::default().with_max_spot_fraction(1.0);
        let snapshot = analyze(&inventory, &PricingSnapshot::builtin(), &policy).unwrap();

        assert!((snapshot.current.total - 140.16).abs() < 0.01);
        assert!(snapshot.recommendations[0].contains("z9.huge"));
        assert!(snapshot.recommendations[1].starts_with("Move 2 on-demand m5.large"));
    }

    #[test]
    fn test_rule_order_and_threshold() {
        let pricing = PricingSnapshot::builtin()
            .with_price("us-east-1", "r5.large", InstancePrice::new(0.126, None));
        let mut nodes = fleet(1, "m5.xlarge");
        nodes.extend(fleet(1, "t3.medium").into_iter().map(|mut n| {
            n.name = "small".into();
            n
        }));
        nodes.push(NodeInfo::new("mem", "r5.large", "us-east-1a", false));
        let inventory = NodeInventorySnapshot::from_nodes(nodes);

        let policy = SpotPolicy {
            max_spot_fraction: 1.0,
            min_monthly_savings: 50.0,
            target_utilization: 0.8,
        };
        let snapshot = analyze(&inventory, &pricing, &policy).unwrap();

        // t3.medium saves ~$21/month, below the threshold
        assert_eq!(snapshot.recommendations.len(), 2);
        assert!(snapshot.recommendations[0].contains("m5.xlarge"));
        assert!(snapshot.recommendations[1].contains("r5.large"));
        // potential still counts the small move
        assert!(snapshot.potential.spot > 0.0);
    }

    #[test]
    fn test_savings_must_exceed_threshold() {
        // $0.25/h difference is exactly $182.50/month
        let pricing = PricingSnapshot::new().with_price(
            "us-east-1",
            "x1.test",
            InstancePrice::new(0.5, Some(0.25)),
        );
        let inventory = NodeInventorySnapshot::from_nodes(fleet(1, "x1.test"));
        let policy = |min_monthly_savings| SpotPolicy {
            max_spot_fraction: 1.0,
            min_monthly_savings,
            target_utilization: 0.8,
        };

        let at_threshold = analyze(&inventory, &pricing, &policy(182.5)).unwrap();
        assert!(at_threshold.recommendations.is_empty());
        assert_eq!(at_threshold.savings.amount, 182.5);

        let below = analyze(&inventory, &pricing, &policy(182.49)).unwrap();
        assert_eq!(below.recommendations.len(), 1);
        assert!(below.recommendations[0].contains("$182.50"));
    }

    #[test]
    fn test_invalid_inventory_rejected() {
        let mut inventory = NodeInventorySnapshot::from_nodes(fleet(3, "m5.large"));
        inventory.on_demand_nodes = 5;
        let err = analyze(&inventory, &PricingSnapshot::builtin(), &SpotPolicy::default())
            .unwrap_err();
        assert!(matches!(err, WizardError::InvalidInventory(_)));
    }

    #[test]
    fn test_spot_nodes_are_unchanged_in_potential() {
        let mut nodes = fleet(1, "m5.large");
        nodes.push(NodeInfo::new("s", "m5.large", "us-east-1b", true));
        let inventory = NodeInventorySnapshot::from_nodes(nodes);
        let snapshot =
            analyze(&inventory, &PricingSnapshot::builtin(), &SpotPolicy::default()).unwrap();
        // ceiling floor(0.7 * 2) = 1 is already used by the existing spot node
        assert_eq!(snapshot.current, snapshot.potential);
        assert_eq!(snapshot.savings.amount, 0.0);
    }
}
