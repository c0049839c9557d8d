//! Equipment cost resolution
//!
//! Resolution order, first match wins:
//! 1. phase alias whose base equipment has a cost mapping
//! 2. direct cost mapping
//! 3. keyword estimate from the equipment name
//!
//! Mapped costs are scaled by recognized environment factors and the space
//! operations surcharge. Keyword estimates are flat.

use thiserror::Error;
use tracing::debug;

use crate::knowledge_base::KnowledgeBase;
use crate::models::{CostBreakdownEntry, CostTier, EnvironmentFactors, EquipmentCostMapping};

/// Flat multiplier applied to every mapped cost
pub const SPACE_OPERATIONS_SURCHARGE: f64 = 2.5;

/// Estimate used when no keyword matches
pub const DEFAULT_ESTIMATE_USD: u64 = 1_500_000;

/// Checked in this order against the lowercased equipment id
const KEYWORD_ESTIMATES: [(&str, u64); 6] = [
    ("habitat", 5_000_000),
    ("module", 2_000_000),
    ("system", 3_000_000),
    ("unit", 1_000_000),
    ("facility", 8_000_000),
    ("infrastructure", 10_000_000),
];

/// A cost that cannot be represented in whole dollars
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CostError {
    #[error("cost of `{equipment_id}` is outside the representable dollar range")]
    OutOfRange { equipment_id: String },
    #[error("equipment total overflows when adding `{equipment_id}`")]
    Overflow { equipment_id: String },
}

/// Resolves equipment ids to costs against one knowledge base snapshot
#[derive(Debug, Clone, Copy)]
pub struct CostEngine<'kb> {
    kb: &'kb KnowledgeBase,
}

impl<'kb> CostEngine<'kb> {
    pub fn new(kb: &'kb KnowledgeBase) -> Self {
        Self { kb }
    }

    /// Cost of a single piece of equipment under the given environment
    pub fn resolve_cost(
        &self,
        equipment_id: &str,
        environment: &EnvironmentFactors,
    ) -> Result<CostBreakdownEntry, CostError> {
        let (cost, tier) = self.resolve(equipment_id, environment);
        let cost_usd = whole_dollars(cost).ok_or_else(|| CostError::OutOfRange {
            equipment_id: equipment_id.to_string(),
        })?;
        debug!(equipment = equipment_id, cost_usd, tier = %tier, "resolved equipment cost");
        Ok(CostBreakdownEntry {
            equipment_id: equipment_id.to_string(),
            cost_usd,
            tier,
        })
    }

    fn resolve(&self, equipment_id: &str, environment: &EnvironmentFactors) -> (f64, CostTier) {
        if let Some(alias) = self.kb.phase_mapping(equipment_id) {
            if let Some(mapping) = self.kb.equipment_cost(&alias.base_equipment) {
                let cost = mapped_cost(mapping, alias.quantity_multiplier, environment);
                return (cost, CostTier::Phase);
            }
            debug!(
                equipment = equipment_id,
                base_equipment = %alias.base_equipment,
                "phase alias has no base cost mapping"
            );
        }

        if let Some(mapping) = self.kb.equipment_cost(equipment_id) {
            return (mapped_cost(mapping, 1.0, environment), CostTier::Direct);
        }

        (estimate_equipment_cost(equipment_id) as f64, CostTier::Fallback)
    }

    /// Resolve every item in an equipment list.
    ///
    /// Each item is truncated to whole dollars before it is added to the total.
    pub fn calculate_equipment_cost<S: AsRef<str>>(
        &self,
        equipment: &[S],
        environment: &EnvironmentFactors,
    ) -> Result<EquipmentCost, CostError> {
        let mut total_usd: u64 = 0;
        let mut breakdown = Vec::with_capacity(equipment.len());

        for id in equipment {
            let entry = self.resolve_cost(id.as_ref(), environment)?;
            total_usd = total_usd
                .checked_add(entry.cost_usd)
                .ok_or_else(|| CostError::Overflow {
                    equipment_id: entry.equipment_id.clone(),
                })?;
            breakdown.push(entry);
        }

        Ok(EquipmentCost {
            total_usd,
            breakdown,
        })
    }
}

fn mapped_cost(mapping: &EquipmentCostMapping, quantity: f64, environment: &EnvironmentFactors) -> f64 {
    environment.apply(mapping.scaled_base(quantity)) * SPACE_OPERATIONS_SURCHARGE
}

/// Truncate toward zero. `None` for NaN, negative, or anything at or above 2^64.
fn whole_dollars(cost: f64) -> Option<u64> {
    // u64::MAX rounds up to exactly 2^64 as f64
    (0.0..u64::MAX as f64).contains(&cost).then(|| cost as u64)
}

/// Flat estimate for equipment with no cost mapping
pub fn estimate_equipment_cost(equipment_id: &str) -> u64 {
    let name = equipment_id.to_lowercase();
    KEYWORD_ESTIMATES
        .iter()
        .find(|(keyword, _)| name.contains(keyword))
        .map(|(_, cost)| *cost)
        .unwrap_or(DEFAULT_ESTIMATE_USD)
}

/// Result of costing one equipment list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquipmentCost {
    pub total_usd: u64,
    /// One entry per listed item, in list order
    pub breakdown: Vec<CostBreakdownEntry>,
}

/// Dollar amount with thousands separators, e.g. `$4,500,000`
pub fn format_usd(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    out.push('$');
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
