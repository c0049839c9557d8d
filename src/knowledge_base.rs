//! Knowledge base loading
//!
//! Walks the JSON data tree and builds an immutable snapshot of equipment cost
//! mappings, materials, items, blueprints and mission phase records. A single
//! unreadable or malformed record is logged and skipped; it never fails the
//! whole load.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::{
    Blueprint, EntityRecord, EquipmentCostMapping, MaterialRequirement, MissionPhase,
    PhaseEquipmentMapping,
};

pub const COST_SYSTEM_FILE: &str = "cost_calculation_system.json";
pub const MATERIALS_DIR: &str = "resources/materials";
pub const ITEMS_DIR: &str = "items";
pub const BLUEPRINTS_DIR: &str = "blueprints";
pub const PHASES_DIR: &str = "missions/phases";

/// Why a single knowledge base file was skipped
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} does not match the {kind} schema: {source}", .path.display())]
    Schema {
        path: PathBuf,
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only snapshot of everything loaded from the data directory
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    equipment_costs: BTreeMap<String, EquipmentCostMapping>,
    phase_equipment: BTreeMap<String, PhaseEquipmentMapping>,
    materials: BTreeMap<String, EntityRecord>,
    items: BTreeMap<String, EntityRecord>,
    blueprints: BTreeMap<String, Blueprint>,
    mission_phases: BTreeMap<String, MissionPhase>,
}

impl KnowledgeBase {
    pub fn equipment_cost(&self, id: &str) -> Option<&EquipmentCostMapping> {
        self.equipment_costs.get(id)
    }

    pub fn phase_mapping(&self, id: &str) -> Option<&PhaseEquipmentMapping> {
        self.phase_equipment.get(id)
    }

    pub fn equipment_costs(&self) -> &BTreeMap<String, EquipmentCostMapping> {
        &self.equipment_costs
    }

    pub fn phase_mappings(&self) -> &BTreeMap<String, PhaseEquipmentMapping> {
        &self.phase_equipment
    }

    pub fn materials(&self) -> &BTreeMap<String, EntityRecord> {
        &self.materials
    }

    pub fn items(&self) -> &BTreeMap<String, EntityRecord> {
        &self.items
    }

    pub fn blueprints(&self) -> &BTreeMap<String, Blueprint> {
        &self.blueprints
    }

    pub fn mission_phases(&self) -> &BTreeMap<String, MissionPhase> {
        &self.mission_phases
    }

    /// True if the id has a direct cost mapping or a phase alias
    pub fn has_cost_mapping(&self, id: &str) -> bool {
        self.equipment_costs.contains_key(id) || self.phase_equipment.contains_key(id)
    }
}

/// Counts gathered while loading
#[derive(Debug, Default)]
pub struct LoadStats {
    pub cost_mappings: usize,
    pub phase_mappings: usize,
    pub materials: usize,
    pub items: usize,
    pub blueprints: usize,
    pub phases: usize,
    pub skipped: usize,
    pub collisions: usize,
}

impl std::fmt::Display for LoadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Loaded {} cost mappings, {} phase mappings, {} materials, {} items, {} blueprints, {} phases. Skipped: {}, Duplicate ids: {}",
            self.cost_mappings,
            self.phase_mappings,
            self.materials,
            self.items,
            self.blueprints,
            self.phases,
            self.skipped,
            self.collisions
        )
    }
}

/// Load the knowledge base rooted at `data_dir`.
///
/// Only a cost system file that exists but cannot be read or parsed is fatal.
pub fn load(data_dir: &Path) -> Result<(KnowledgeBase, LoadStats)> {
    let mut kb = KnowledgeBase::default();
    let mut stats = LoadStats::default();

    load_cost_system(&data_dir.join(COST_SYSTEM_FILE), &mut kb, &mut stats)?;

    for (path, id, body) in scan_records(&data_dir.join(MATERIALS_DIR), &mut stats) {
        let record = EntityRecord { id: id.clone(), body };
        register(&mut kb.materials, id, record, "material", &path, &mut stats);
    }

    for (path, id, body) in scan_records(&data_dir.join(ITEMS_DIR), &mut stats) {
        let record = EntityRecord { id: id.clone(), body };
        register(&mut kb.items, id, record, "item", &path, &mut stats);
    }

    for (path, id, body) in scan_records(&data_dir.join(BLUEPRINTS_DIR), &mut stats) {
        let blueprint = blueprint_record(&path, id.clone(), &body);
        register(&mut kb.blueprints, id, blueprint, "blueprint", &path, &mut stats);
    }

    for (path, id, body) in scan_records(&data_dir.join(PHASES_DIR), &mut stats) {
        match typed_record::<MissionPhase>(&path, body, "mission phase") {
            Ok(phase) => {
                register(&mut kb.mission_phases, id, phase, "mission phase", &path, &mut stats);
            }
            Err(e) => skip(e, &mut stats),
        }
    }

    stats.cost_mappings = kb.equipment_costs.len();
    stats.phase_mappings = kb.phase_equipment.len();
    stats.materials = kb.materials.len();
    stats.items = kb.items.len();
    stats.blueprints = kb.blueprints.len();
    stats.phases = kb.mission_phases.len();

    Ok((kb, stats))
}

fn load_cost_system(path: &Path, kb: &mut KnowledgeBase, stats: &mut LoadStats) -> Result<()> {
    if !path.exists() {
        warn!(path = %path.display(), "cost system file not found; no equipment mappings loaded");
        return Ok(());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let data: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    kb.equipment_costs = parse_table(
        &data,
        "equipment_cost_mappings",
        stats,
        EquipmentCostMapping::invalid_field,
    );
    kb.phase_equipment = parse_table(
        &data,
        "phase_equipment_mappings",
        stats,
        PhaseEquipmentMapping::invalid_field,
    );

    Ok(())
}

/// Parse one id-keyed table, dropping entries that do not fit the record type
fn parse_table<T, F>(
    data: &Value,
    key: &str,
    stats: &mut LoadStats,
    invalid_field: F,
) -> BTreeMap<String, T>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Option<&'static str>,
{
    let Some(table) = data.get(key).and_then(Value::as_object) else {
        debug!(table = key, "mapping table absent");
        return BTreeMap::new();
    };

    let mut entries = BTreeMap::new();
    for (id, entry) in table {
        match serde_json::from_value::<T>(entry.clone()) {
            Ok(mapping) => {
                if let Some(field) = invalid_field(&mapping) {
                    warn!(table = key, id = %id, field, "skipping mapping with out-of-range value");
                    stats.skipped += 1;
                    continue;
                }
                entries.insert(id.clone(), mapping);
            }
            Err(e) => {
                warn!(table = key, id = %id, error = %e, "skipping malformed mapping");
                stats.skipped += 1;
            }
        }
    }
    entries
}

/// Find every `.json` file under `dir` and parse it, in file name order.
///
/// A missing directory yields nothing.
fn scan_records(dir: &Path, stats: &mut LoadStats) -> Vec<(PathBuf, String, Value)> {
    let mut records = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !path.extension().map_or(false, |ext| ext == "json") {
            continue;
        }

        match read_record(path) {
            Ok(body) => {
                let id = record_id(path, &body);
                records.push((path.to_path_buf(), id, body));
            }
            Err(e) => skip(e, stats),
        }
    }

    records
}

fn read_record(path: &Path) -> Result<Value, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn typed_record<T: DeserializeOwned>(path: &Path, body: Value, kind: &'static str) -> Result<T, LoadError> {
    serde_json::from_value(body).map_err(|source| LoadError::Schema {
        path: path.to_path_buf(),
        kind,
        source,
    })
}

/// Blueprint from a parsed body. Entries with the wrong shape are logged and
/// dropped; the record itself is always kept.
fn blueprint_record(path: &Path, id: String, body: &Value) -> Blueprint {
    let dependencies = lenient_list(path, body, "dependencies", |entry| {
        entry.as_str().map(str::to_string)
    });
    let material_requirements = lenient_list(path, body, "material_requirements", |entry| {
        entry.as_object().map(|req| MaterialRequirement {
            material: req.get("material").and_then(Value::as_str).map(str::to_string),
        })
    });

    Blueprint {
        id,
        dependencies,
        material_requirements,
    }
}

/// Convert each entry of the list under `field`, skipping entries `convert` rejects.
///
/// An absent or null field is `None`, as is one that is not a list.
fn lenient_list<T>(
    path: &Path,
    body: &Value,
    field: &'static str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<Vec<T>> {
    let value = body.get(field).filter(|v| !v.is_null())?;
    let Some(entries) = value.as_array() else {
        warn!(path = %path.display(), field, "ignoring field that is not a list");
        return None;
    };

    let mut kept = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match convert(entry) {
            Some(converted) => kept.push(converted),
            None => warn!(
                path = %path.display(),
                field,
                index,
                entry = %entry,
                "ignoring list entry with unexpected shape"
            ),
        }
    }
    Some(kept)
}

/// Declared `id`, or the file name without its `.json` extension.
///
/// Numeric and boolean ids are used as their JSON text.
fn record_id(path: &Path, body: &Value) -> String {
    match body.get("id") {
        Some(Value::String(id)) => return id.clone(),
        Some(id @ (Value::Number(_) | Value::Bool(_))) => return id.to_string(),
        Some(other) => {
            warn!(path = %path.display(), id = %other, "record id is not a scalar; using file name");
        }
        None => {}
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Insert under `id`. A later record with the same id replaces the earlier one.
fn register<T>(
    map: &mut BTreeMap<String, T>,
    id: String,
    value: T,
    kind: &str,
    path: &Path,
    stats: &mut LoadStats,
) {
    if map.contains_key(&id) {
        warn!(kind, id = %id, path = %path.display(), "duplicate id; replacing earlier record");
        stats.collisions += 1;
    }
    map.insert(id, value);
}

fn skip(error: LoadError, stats: &mut LoadStats) {
    warn!(error = %error, "skipping knowledge base record");
    stats.skipped += 1;
}

/// Empty per-process scratch directory under the system temp dir.
/// Leftovers from an earlier run are removed first.
#[cfg(test)]
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mission-cost-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[cfg(test)]
impl KnowledgeBase {
    pub fn with_equipment_cost(mut self, id: &str, base_cost_usd: f64, complexity: f64, labor: f64) -> Self {
        self.equipment_costs.insert(
            id.to_string(),
            EquipmentCostMapping {
                base_cost_usd,
                complexity_multiplier: complexity,
                labor_factor: labor,
            },
        );
        self
    }

    pub fn with_phase_mapping(mut self, id: &str, base_equipment: &str, quantity: f64) -> Self {
        self.phase_equipment.insert(
            id.to_string(),
            PhaseEquipmentMapping {
                base_equipment: base_equipment.to_string(),
                quantity_multiplier: quantity,
            },
        );
        self
    }

    pub fn with_material(mut self, id: &str) -> Self {
        self.materials.insert(
            id.to_string(),
            EntityRecord {
                id: id.to_string(),
                body: serde_json::json!({ "id": id }),
            },
        );
        self
    }

    pub fn with_blueprint(mut self, id: &str, dependencies: &[&str], materials: &[&str]) -> Self {
        let blueprint = Blueprint {
            id: id.to_string(),
            dependencies: (!dependencies.is_empty())
                .then(|| dependencies.iter().map(|d| d.to_string()).collect()),
            material_requirements: (!materials.is_empty()).then(|| {
                materials
                    .iter()
                    .map(|m| MaterialRequirement {
                        material: Some(m.to_string()),
                    })
                    .collect()
            }),
        };
        self.blueprints.insert(id.to_string(), blueprint);
        self
    }

    pub fn with_phase_tasks(mut self, id: &str, tasks: &[&[&str]]) -> Self {
        use crate::models::PhaseTask;

        let phase = MissionPhase {
            tasks: tasks
                .iter()
                .map(|equipment| PhaseTask {
                    resources_required: equipment.iter().map(|e| e.to_string()).collect(),
                })
                .collect(),
        };
        self.mission_phases.insert(id.to_string(), phase);
        self
    }
}
