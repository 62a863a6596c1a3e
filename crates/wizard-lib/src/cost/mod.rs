//! Shared cost model
//!
//! Both the cost analyzer and the rebalancing simulator price node lists
//! through [`tally`] and pick spot candidates through [`select_spot_moves`],
//! so the dashboard and the rebalancer never disagree on a figure.

mod analyzer;

pub use analyzer::analyze;

use crate::catalog::Preset;
use crate::models::{CostBreakdown, NodeInfo};
use crate::pricing::{PricingSnapshot, HOURS_PER_MONTH};
use serde::{Deserialize, Serialize};

/// Round a money value to cents
pub fn round_cents(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // avoid "-0.00"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Render a monthly figure as "$1,234.56"
pub fn format_currency(value: f64) -> String {
    let cents = (round_cents(value).abs() * 100.0).round() as u64;
    let dollars = cents / 100;
    let digits = dollars.to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Savings percentage of `current`, 0 when nothing is spent
pub fn savings_percentage(current: f64, savings: f64) -> f64 {
    if current > 0.0 {
        round_cents(100.0 * savings / current)
    } else {
        0.0
    }
}

/// A node that could not be priced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingGap {
    pub node_name: String,
    pub region: String,
    pub instance_type: String,
    pub capacity_type: String,
}

/// Monthly spend of a node list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostTally {
    /// Unrounded monthly figures
    pub breakdown: CostBreakdown,
    pub priced_nodes: usize,
    pub priced_spot_nodes: usize,
    pub gaps: Vec<PricingGap>,
}

impl CostTally {
    /// Breakdown rounded to cents for presentation
    pub fn rounded(&self) -> CostBreakdown {
        CostBreakdown {
            total: round_cents(self.breakdown.total),
            ondemand: round_cents(self.breakdown.ondemand),
            spot: round_cents(self.breakdown.spot),
        }
    }
}

/// Monthly price of a node at its current capacity type
pub fn node_monthly_cost(node: &NodeInfo, pricing: &PricingSnapshot) -> Option<f64> {
    pricing
        .get(&node.region, &node.instance_type)?
        .hourly(node.is_spot)
        .map(|hourly| hourly * HOURS_PER_MONTH)
}

/// Price every node; unpriced nodes are reported as gaps and left out
pub fn tally(nodes: &[NodeInfo], pricing: &PricingSnapshot) -> CostTally {
    let mut result = CostTally::default();

    for node in nodes {
        match node_monthly_cost(node, pricing) {
            Some(monthly) => {
                result.priced_nodes += 1;
                if node.is_spot {
                    result.priced_spot_nodes += 1;
                    result.breakdown.spot += monthly;
                } else {
                    result.breakdown.ondemand += monthly;
                }
            }
            None => result.gaps.push(PricingGap {
                node_name: node.name.clone(),
                region: node.region.clone(),
                instance_type: node.instance_type.clone(),
                capacity_type: node.capacity_type().to_string(),
            }),
        }
    }

    result.breakdown.total = result.breakdown.ondemand + result.breakdown.spot;
    result
}

/// How far spot adoption may go and which savings are worth reporting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotPolicy {
    /// Upper bound on the spot share of priced nodes, 0.0..=1.0
    pub max_spot_fraction: f64,
    /// Per-instance-type monthly savings must exceed this to be recommended
    pub min_monthly_savings: f64,
    /// Requested-to-capacity ratio consolidation packs nodes up to
    pub target_utilization: f64,
}

impl Default for SpotPolicy {
    fn default() -> Self {
        Self {
            max_spot_fraction: 0.7,
            min_monthly_savings: 1.0,
            target_utilization: 0.8,
        }
    }
}

impl SpotPolicy {
    pub fn with_max_spot_fraction(mut self, fraction: f64) -> Self {
        self.max_spot_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Use the preset's spot ratio as the ceiling
    pub fn for_preset(self, preset: &Preset) -> Self {
        self.with_max_spot_fraction(preset.spot_ratio as f64 / 100.0)
    }

    /// Maximum number of spot nodes among `priced_nodes`
    pub fn spot_ceiling(&self, priced_nodes: usize) -> usize {
        (self.max_spot_fraction * priced_nodes as f64 + 1e-9).floor() as usize
    }
}

/// An on-demand node that has a cheaper spot price available
#[derive(Debug, Clone, PartialEq)]
pub struct SpotCandidate {
    /// Position in the node list the candidate was taken from
    pub index: usize,
    pub monthly_savings: f64,
}

/// Every on-demand node with a spot discount, most savings first, ties by name
pub fn spot_candidates(nodes: &[NodeInfo], pricing: &PricingSnapshot) -> Vec<SpotCandidate> {
    let mut candidates: Vec<SpotCandidate> = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| !node.is_spot)
        .filter_map(|(index, node)| {
            let price = pricing.get(&node.region, &node.instance_type)?;
            let spot = price.spot_discount()?;
            Some(SpotCandidate {
                index,
                monthly_savings: (price.on_demand - spot) * HOURS_PER_MONTH,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.monthly_savings
            .total_cmp(&a.monthly_savings)
            .then_with(|| nodes[a.index].name.cmp(&nodes[b.index].name))
    });
    candidates
}

/// Candidates split by whether they fit under the spot ceiling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotSelection {
    pub selected: Vec<SpotCandidate>,
    /// Candidates left on-demand because the ceiling was reached
    pub capped: Vec<SpotCandidate>,
    pub ceiling: usize,
}

/// Pick on-demand nodes to move to spot without exceeding the ceiling
pub fn select_spot_moves(
    nodes: &[NodeInfo],
    pricing: &PricingSnapshot,
    policy: &SpotPolicy,
) -> SpotSelection {
    let priced = tally(nodes, pricing);
    let ceiling = policy.spot_ceiling(priced.priced_nodes);
    let room = ceiling.saturating_sub(priced.priced_spot_nodes);

    let mut selected = spot_candidates(nodes, pricing);
    let capped = if selected.len() > room {
        selected.split_off(room)
    } else {
        Vec::new()
    };

    SpotSelection {
        selected,
        capped,
        ceiling,
    }
}
