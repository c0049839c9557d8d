//! Mission manifest cost updates
//!
//! The manifest is handled as a `serde_json::Value` so that every field the
//! updater does not own survives the rewrite untouched and in its original
//! order.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::info;

use crate::calculator::{CostEngine, CostError};
use crate::models::EnvironmentFactors;

pub const COST_METHODOLOGY: &str = "equipment_based_calculation";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest root must be a JSON object")]
    NotAnObject,
    #[error("`target_environment` must be a string")]
    TargetNotString,
    #[error("`phases` must be an array")]
    PhasesNotArray,
    #[error("phase {index} must be a JSON object")]
    PhaseNotObject { index: usize },
    #[error("phase {index}: `{field}` has an unexpected shape")]
    InvalidPhaseField { index: usize, field: &'static str },
    #[error("`metadata` must be a JSON object")]
    MetadataNotObject,
    #[error("phase {index}: {source}")]
    Cost {
        index: usize,
        #[source]
        source: CostError,
    },
    #[error("total funding exceeds the representable dollar range at phase {index}")]
    FundingOverflow { index: usize },
}

/// Environment factors implied by a mission's declared target.
///
/// Checked case-insensitively in priority order; only the first matching
/// group applies.
pub fn derive_environment_factors(target_environment: &str) -> EnvironmentFactors {
    let target = target_environment.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| target.contains(w));

    if mentions(&["lunar", "luna"]) {
        EnvironmentFactors::new().with("lunar_operations", 1.8)
    } else if mentions(&["orbital", "leo", "l1"]) {
        EnvironmentFactors::new().with("orbital_operations", 2.2)
    } else if mentions(&["deep", "saturn", "titan"]) {
        EnvironmentFactors::new().with("deep_space_operations", 3.0)
    } else if mentions(&["mars", "venus"]) {
        let factors = EnvironmentFactors::new().with("planetary_surface", 2.5);
        if target.contains("venus") {
            factors
                .with("extreme_environment", 4.0)
                .with("thermal_extreme", 2.3)
        } else {
            factors
        }
    } else {
        EnvironmentFactors::new()
    }
}

/// Writes per-phase costs and funding metadata into manifests
#[derive(Debug, Clone, Copy)]
pub struct ManifestUpdater<'kb> {
    engine: CostEngine<'kb>,
    calculation_date: NaiveDate,
}

impl<'kb> ManifestUpdater<'kb> {
    pub fn new(engine: CostEngine<'kb>, calculation_date: NaiveDate) -> Self {
        Self {
            engine,
            calculation_date,
        }
    }

    /// Cost every phase's equipment list in place and return the total funding.
    ///
    /// The total sums `calculated_cost_usd` over all phases, including phases
    /// that already carried a value but list no equipment.
    pub fn update_manifest(&self, manifest: &mut Value) -> Result<u64, ManifestError> {
        let root = manifest.as_object_mut().ok_or(ManifestError::NotAnObject)?;

        let target = match root.get("target_environment") {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ManifestError::TargetNotString),
        };
        let environment = derive_environment_factors(&target);

        let mut total_funding: u64 = 0;
        if let Some(phases) = root.get_mut("phases") {
            let phases = phases.as_array_mut().ok_or(ManifestError::PhasesNotArray)?;
            for (index, phase) in phases.iter_mut().enumerate() {
                let phase_cost = self.update_phase(index, phase, &environment)?;
                total_funding = total_funding
                    .checked_add(phase_cost)
                    .ok_or(ManifestError::FundingOverflow { index })?;
            }
        }

        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or(ManifestError::MetadataNotObject)?;
        metadata.insert("calculated_total_funding_usd".into(), json!(total_funding));
        metadata.insert(
            "cost_calculation_date".into(),
            json!(self.calculation_date.format("%Y-%m-%d").to_string()),
        );
        metadata.insert("cost_methodology".into(), json!(COST_METHODOLOGY));

        Ok(total_funding)
    }

    /// Update one phase and return its `calculated_cost_usd`, or 0 if it has none
    fn update_phase(
        &self,
        index: usize,
        phase: &mut Value,
        environment: &EnvironmentFactors,
    ) -> Result<u64, ManifestError> {
        let phase = phase
            .as_object_mut()
            .ok_or(ManifestError::PhaseNotObject { index })?;
        let Some(requirements) = phase.get_mut("resource_requirements") else {
            return Ok(0);
        };
        let requirements = requirements
            .as_object_mut()
            .ok_or(ManifestError::InvalidPhaseField {
                index,
                field: "resource_requirements",
            })?;

        if let Some(equipment) = requirements.get("equipment") {
            let equipment = equipment_ids(equipment).ok_or(ManifestError::InvalidPhaseField {
                index,
                field: "equipment",
            })?;
            let cost = self
                .engine
                .calculate_equipment_cost(&equipment, environment)
                .map_err(|source| ManifestError::Cost { index, source })?;

            let mut breakdown = Map::new();
            let mut tiers = Map::new();
            for entry in &cost.breakdown {
                breakdown.insert(entry.equipment_id.clone(), json!(entry.cost_usd));
                tiers.insert(entry.equipment_id.clone(), json!(entry.tier.as_str()));
            }

            requirements.insert("calculated_cost_usd".into(), json!(cost.total_usd));
            requirements.insert("cost_breakdown".into(), Value::Object(breakdown));
            requirements.insert("cost_tiers".into(), Value::Object(tiers));
        }

        match requirements.get("calculated_cost_usd") {
            None => Ok(0),
            Some(value) => whole_dollars(value).ok_or(ManifestError::InvalidPhaseField {
                index,
                field: "calculated_cost_usd",
            }),
        }
    }
}

fn equipment_ids(value: &Value) -> Option<Vec<&str>> {
    value.as_array()?.iter().map(Value::as_str).collect()
}

fn whole_dollars(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| (0.0..u64::MAX as f64).contains(v))
            .map(|v| v as u64)
    })
}

pub fn read_manifest(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
}

/// Rewrite the manifest as two-space indented JSON. Not atomic.
pub fn write_manifest(path: &Path, manifest: &Value) -> Result<()> {
    let content = serde_json::to_string_pretty(manifest)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write manifest {}", path.display()))
}

/// Read, cost and rewrite a manifest file, returning its total funding
pub fn update_manifest_file(path: &Path, engine: CostEngine<'_>) -> Result<u64> {
    let mut manifest = read_manifest(path)?;
    let updater = ManifestUpdater::new(engine, Local::now().date_naive());
    let total = updater
        .update_manifest(&mut manifest)
        .with_context(|| format!("Malformed manifest {}", path.display()))?;
    write_manifest(path, &manifest)?;

    info!(path = %path.display(), total_funding_usd = total, "manifest updated");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::knowledge_base::{KnowledgeBase, scratch_dir};

    fn sample_kb() -> KnowledgeBase {
        KnowledgeBase::default()
            .with_equipment_cost("power_bus", 1_000_000.0, 1.0, 1.0)
            .with_equipment_cost("regolith_excavator", 2_000_000.0, 1.5, 1.2)
            .with_phase_mapping("excavator_fleet", "regolith_excavator", 4.0)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 3).unwrap()
    }

    fn lunar_manifest() -> Value {
        json!({
            "name": "Shackleton Rim Outpost",
            "target_environment": "Lunar South Pole",
            "phases": [
                {
                    "name": "Site preparation",
                    "resource_requirements": {
                        "equipment": ["excavator_fleet", "power_bus"],
                        "crew": 4
                    }
                },
                { "name": "Survey" },
                {
                    "name": "Habitation",
                    "resource_requirements": {
                        "equipment": ["pressurized_habitat", "power_bus", "power_bus"]
                    }
                }
            ]
        })
    }

    #[test]
    fn derives_environment_from_target() {
        assert_eq!(
            derive_environment_factors("Lunar Base Alpha"),
            EnvironmentFactors::new().with("lunar_operations", 1.8)
        );
        assert_eq!(
            derive_environment_factors("Venus Cloud City"),
            EnvironmentFactors::new()
                .with("planetary_surface", 2.5)
                .with("extreme_environment", 4.0)
                .with("thermal_extreme", 2.3)
        );
        assert_eq!(
            derive_environment_factors("Deep Space Relay (Titan)"),
            EnvironmentFactors::new().with("deep_space_operations", 3.0)
        );
        assert_eq!(
            derive_environment_factors("Mars Jezero Crater"),
            EnvironmentFactors::new().with("planetary_surface", 2.5)
        );
        assert_eq!(
            derive_environment_factors("LEO Fuel Depot"),
            EnvironmentFactors::new().with("orbital_operations", 2.2)
        );
        assert_eq!(derive_environment_factors("Ceres Mining Camp"), EnvironmentFactors::new());
        assert_eq!(derive_environment_factors(""), EnvironmentFactors::new());
    }

    #[test]
    fn lunar_takes_priority_over_orbital() {
        assert_eq!(
            derive_environment_factors("Lunar Orbital Gateway"),
            EnvironmentFactors::new().with("lunar_operations", 1.8)
        );
    }

    #[test]
    fn writes_phase_costs_and_metadata() {
        let kb = sample_kb();
        let updater = ManifestUpdater::new(CostEngine::new(&kb), date());
        let mut manifest = lunar_manifest();

        let total = updater.update_manifest(&mut manifest).unwrap();

        let fleet = (2_000_000.0 * 4.0 * 1.5 * 1.2 * 1.8 * 2.5) as u64;
        let site = &manifest["phases"][0]["resource_requirements"];
        assert_eq!(site["calculated_cost_usd"], json!(fleet + 4_500_000));
        assert_eq!(site["cost_breakdown"]["excavator_fleet"], json!(fleet));
        assert_eq!(site["cost_breakdown"]["power_bus"], json!(4_500_000));
        assert_eq!(site["cost_tiers"]["excavator_fleet"], json!("phase"));
        assert_eq!(site["cost_tiers"]["power_bus"], json!("direct"));
        assert_eq!(site["crew"], json!(4));

        let habitation = &manifest["phases"][2]["resource_requirements"];
        // power_bus is listed twice: counted twice, one breakdown key
        assert_eq!(habitation["calculated_cost_usd"], json!(5_000_000 + 2 * 4_500_000));
        assert_eq!(habitation["cost_breakdown"].as_object().unwrap().len(), 2);
        assert_eq!(habitation["cost_tiers"]["pressurized_habitat"], json!("fallback"));

        assert!(manifest["phases"][1].get("resource_requirements").is_none());

        assert_eq!(total, fleet + 4_500_000 + 5_000_000 + 9_000_000);
        let metadata = &manifest["metadata"];
        assert_eq!(metadata["calculated_total_funding_usd"], json!(total));
        assert_eq!(metadata["cost_calculation_date"], json!("2026-02-03"));
        assert_eq!(metadata["cost_methodology"], json!(COST_METHODOLOGY));
    }

    #[test]
    fn total_matches_sum_of_phases() {
        let kb = sample_kb();
        let updater = ManifestUpdater::new(CostEngine::new(&kb), date());
        let mut manifest = lunar_manifest();
        // a phase with a carried-over cost and no equipment still counts
        manifest["phases"][1]["resource_requirements"] = json!({ "calculated_cost_usd": 250_000 });

        let total = updater.update_manifest(&mut manifest).unwrap();

        let sum: u64 = manifest["phases"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p.pointer("/resource_requirements/calculated_cost_usd"))
            .map(|v| v.as_u64().unwrap())
            .sum();
        assert_eq!(total, sum);
        assert_eq!(manifest["metadata"]["calculated_total_funding_usd"], json!(sum));
    }

    #[test]
    fn rerun_produces_same_total() {
        let kb = sample_kb();
        let mut manifest = lunar_manifest();

        let first = ManifestUpdater::new(CostEngine::new(&kb), date())
            .update_manifest(&mut manifest)
            .unwrap();
        let later = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let second = ManifestUpdater::new(CostEngine::new(&kb), later)
            .update_manifest(&mut manifest)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(manifest["metadata"]["cost_calculation_date"], json!("2026-03-01"));
    }

    #[test]
    fn keeps_existing_metadata_fields() {
        let kb = sample_kb();
        let updater = ManifestUpdater::new(CostEngine::new(&kb), date());
        let mut manifest = json!({
            "target_environment": "Venus Cloud City",
            "phases": [],
            "metadata": { "author": "logistics", "calculated_total_funding_usd": 42 }
        });

        let total = updater.update_manifest(&mut manifest).unwrap();

        assert_eq!(total, 0);
        assert_eq!(manifest["metadata"]["author"], json!("logistics"));
        assert_eq!(manifest["metadata"]["calculated_total_funding_usd"], json!(0));
    }

    #[test]
    fn venus_scaling_reaches_direct_costs() {
        let kb = KnowledgeBase::default().with_equipment_cost("aerostat", 1_000.0, 1.0, 1.0);
        let updater = ManifestUpdater::new(CostEngine::new(&kb), date());
        let mut manifest = json!({
            "target_environment": "Venus Cloud City",
            "phases": [ { "resource_requirements": { "equipment": ["aerostat"] } } ]
        });

        let total = updater.update_manifest(&mut manifest).unwrap();
        assert_eq!(total, (1_000.0 * 2.5 * 4.0 * 2.3 * 2.5) as u64);
    }

    #[test]
    fn rejects_malformed_structure() {
        let kb = sample_kb();
        let updater = ManifestUpdater::new(CostEngine::new(&kb), date());

        let mut not_object = json!(["phases"]);
        assert!(matches!(
            updater.update_manifest(&mut not_object),
            Err(ManifestError::NotAnObject)
        ));

        let mut bad_phases = json!({ "phases": { "one": {} } });
        assert!(matches!(
            updater.update_manifest(&mut bad_phases),
            Err(ManifestError::PhasesNotArray)
        ));

        let mut bad_equipment = json!({
            "phases": [ { "resource_requirements": { "equipment": ["drill", 7] } } ]
        });
        assert!(matches!(
            updater.update_manifest(&mut bad_equipment),
            Err(ManifestError::InvalidPhaseField { index: 0, field: "equipment" })
        ));

        let mut bad_target = json!({ "target_environment": 3, "phases": [] });
        assert!(matches!(
            updater.update_manifest(&mut bad_target),
            Err(ManifestError::TargetNotString)
        ));

        let mut bad_metadata = json!({ "phases": [], "metadata": "none" });
        assert!(matches!(
            updater.update_manifest(&mut bad_metadata),
            Err(ManifestError::MetadataNotObject)
        ));
    }

    #[test]
    fn phase_cost_overflow_is_an_error() {
        let kb = KnowledgeBase::default().with_equipment_cost("mega_station", 5e18, 1.0, 1.0);
        let updater = ManifestUpdater::new(CostEngine::new(&kb), date());
        let mut manifest = json!({
            "phases": [
                { "resource_requirements": { "equipment": ["power_bus"] } },
                { "resource_requirements": { "equipment": ["mega_station", "mega_station"] } }
            ]
        });

        assert!(matches!(
            updater.update_manifest(&mut manifest),
            Err(ManifestError::Cost {
                index: 1,
                source: CostError::Overflow { .. }
            })
        ));
    }

    #[test]
    fn funding_overflow_across_phases_is_an_error() {
        let kb = KnowledgeBase::default().with_equipment_cost("mega_station", 5e18, 1.0, 1.0);
        let updater = ManifestUpdater::new(CostEngine::new(&kb), date());
        let mut manifest = json!({
            "phases": [
                { "resource_requirements": { "equipment": ["mega_station"] } },
                { "resource_requirements": { "equipment": ["mega_station"] } }
            ]
        });

        assert!(matches!(
            updater.update_manifest(&mut manifest),
            Err(ManifestError::FundingOverflow { index: 1 })
        ));
        assert!(manifest.get("metadata").is_none());
    }

    #[test]
    fn oversized_stored_cost_is_rejected() {
        let kb = sample_kb();
        let updater = ManifestUpdater::new(CostEngine::new(&kb), date());
        let mut manifest = json!({
            "phases": [ { "resource_requirements": { "calculated_cost_usd": 1e30 } } ]
        });

        assert!(matches!(
            updater.update_manifest(&mut manifest),
            Err(ManifestError::InvalidPhaseField { index: 0, field: "calculated_cost_usd" })
        ));
    }

    #[test]
    fn rewrites_manifest_file() {
        let dir = scratch_dir("manifest-rewrite");
        let path: PathBuf = dir.join("lunar_outpost.json");
        fs::write(&path, serde_json::to_string(&lunar_manifest()).unwrap()).unwrap();

        let kb = sample_kb();
        let total = update_manifest_file(&path, CostEngine::new(&kb)).unwrap();

        let written = read_manifest(&path).unwrap();
        assert_eq!(written["metadata"]["calculated_total_funding_usd"], json!(total));
        assert_eq!(written["name"], json!("Shackleton Rim Outpost"));
        let keys: Vec<&String> = written.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["name", "target_environment", "phases", "metadata"]);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("{\n  \"name\""));
    }

    #[test]
    fn missing_manifest_file_is_an_error() {
        let kb = sample_kb();
        let path = Path::new("/nonexistent/mission-cost/manifest.json");
        assert!(update_manifest_file(path, CostEngine::new(&kb)).is_err());
    }
}
