//! Data models for the cost knowledge base and mission records

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

fn unit_factor() -> f64 {
    1.0
}

/// Authoritative base cost record for one equipment type
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EquipmentCostMapping {
    pub base_cost_usd: f64,
    #[serde(default = "unit_factor")]
    pub complexity_multiplier: f64,
    #[serde(default = "unit_factor")]
    pub labor_factor: f64,
}

impl EquipmentCostMapping {
    /// Base cost scaled by quantity, complexity and labor.
    ///
    /// Environment scaling and the space operations surcharge are applied
    /// on top of this by the cost engine.
    pub fn scaled_base(&self, quantity: f64) -> f64 {
        self.base_cost_usd * quantity * self.complexity_multiplier * self.labor_factor
    }

    /// Name of the first field that breaks the record's numeric constraints
    pub fn invalid_field(&self) -> Option<&'static str> {
        if !self.base_cost_usd.is_finite() || self.base_cost_usd < 0.0 {
            Some("base_cost_usd")
        } else if !self.complexity_multiplier.is_finite() || self.complexity_multiplier < 0.0 {
            Some("complexity_multiplier")
        } else if !self.labor_factor.is_finite() || self.labor_factor < 0.0 {
            Some("labor_factor")
        } else {
            None
        }
    }
}

/// Alias from a phase-specific equipment label to a base equipment type
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhaseEquipmentMapping {
    #[serde(rename = "maps_to")]
    pub base_equipment: String,
    #[serde(default = "unit_factor")]
    pub quantity_multiplier: f64,
}

impl PhaseEquipmentMapping {
    pub fn invalid_field(&self) -> Option<&'static str> {
        if !self.quantity_multiplier.is_finite() || self.quantity_multiplier < 0.0 {
            Some("quantity_multiplier")
        } else {
            None
        }
    }
}

/// Operating environment categories the pricing engine recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentCategory {
    LunarOperations,
    OrbitalOperations,
    DeepSpaceOperations,
    PlanetarySurface,
    ExtremeEnvironment,
    RadiationIntense,
    ThermalExtreme,
}

impl EnvironmentCategory {
    pub const ALL: [EnvironmentCategory; 7] = [
        EnvironmentCategory::LunarOperations,
        EnvironmentCategory::OrbitalOperations,
        EnvironmentCategory::DeepSpaceOperations,
        EnvironmentCategory::PlanetarySurface,
        EnvironmentCategory::ExtremeEnvironment,
        EnvironmentCategory::RadiationIntense,
        EnvironmentCategory::ThermalExtreme,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentCategory::LunarOperations => "lunar_operations",
            EnvironmentCategory::OrbitalOperations => "orbital_operations",
            EnvironmentCategory::DeepSpaceOperations => "deep_space_operations",
            EnvironmentCategory::PlanetarySurface => "planetary_surface",
            EnvironmentCategory::ExtremeEnvironment => "extreme_environment",
            EnvironmentCategory::RadiationIntense => "radiation_intense",
            EnvironmentCategory::ThermalExtreme => "thermal_extreme",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == key)
    }
}

/// Environment multipliers keyed by category name, in insertion order.
///
/// Keys are kept as raw strings because callers may hand in sets with
/// categories the engine does not know; those never scale a cost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentFactors {
    entries: Vec<(String, f64)>,
}

impl EnvironmentFactors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: impl Into<String>, multiplier: f64) -> Self {
        self.insert(category, multiplier);
        self
    }

    /// Set a multiplier, replacing any previous value for the same key in place
    pub fn insert(&mut self, category: impl Into<String>, multiplier: f64) {
        let category = category.into();
        match self.entries.iter_mut().find(|(k, _)| *k == category) {
            Some(entry) => entry.1 = multiplier,
            None => self.entries.push((category, multiplier)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, m)| (k.as_str(), *m))
    }

    /// Multiply `cost` by every recognized category's multiplier, one at a time
    pub fn apply(&self, cost: f64) -> f64 {
        self.entries
            .iter()
            .filter(|(k, _)| EnvironmentCategory::from_key(k).is_some())
            .fold(cost, |acc, (_, multiplier)| acc * multiplier)
    }
}

impl fmt::Display for EnvironmentFactors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "none");
        }
        let parts: Vec<String> = self
            .iter()
            .map(|(k, m)| format!("{}: {}", k, m))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Which resolution tier produced a cost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostTier {
    /// Phase alias resolved through a base equipment mapping
    Phase,
    /// Direct equipment cost mapping
    Direct,
    /// Keyword estimate, no mapping found
    Fallback,
}

impl CostTier {
    pub fn as_str(self) -> &'static str {
        match self {
            CostTier::Phase => "phase",
            CostTier::Direct => "direct",
            CostTier::Fallback => "fallback",
        }
    }
}

impl fmt::Display for CostTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved equipment cost
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostBreakdownEntry {
    pub equipment_id: String,
    pub cost_usd: u64,
    pub tier: CostTier,
}

/// Material or item record, kept as the raw JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub id: String,
    pub body: Value,
}

impl EntityRecord {
    /// `cost_data.purchase_cost.amount`, when the record carries one
    pub fn purchase_cost(&self) -> Option<f64> {
        self.body
            .pointer("/cost_data/purchase_cost/amount")
            .and_then(Value::as_f64)
    }

    /// `game_properties.value`, when the record carries one
    pub fn game_value(&self) -> Option<f64> {
        self.body
            .pointer("/game_properties/value")
            .and_then(Value::as_f64)
    }
}

/// A blueprint record from `blueprints`.
///
/// Built field by field from the raw JSON body, so a list entry with the
/// wrong shape drops only that entry and never the blueprint's id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blueprint {
    pub id: String,
    pub dependencies: Option<Vec<String>>,
    pub material_requirements: Option<Vec<MaterialRequirement>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialRequirement {
    pub material: Option<String>,
}

/// A mission phase record from `missions/phases`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MissionPhase {
    #[serde(default)]
    pub tasks: Vec<PhaseTask>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PhaseTask {
    #[serde(default)]
    pub resources_required: Vec<String>,
}
