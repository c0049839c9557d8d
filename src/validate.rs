//! Referential integrity checks over a loaded knowledge base

use std::collections::BTreeSet;
use std::fmt;

use tracing::info;

use crate::knowledge_base::KnowledgeBase;

/// The three coverage checks, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    EquipmentCoverage,
    BlueprintDependencies,
    MaterialAvailability,
}

impl CheckKind {
    fn progress_label(self) -> &'static str {
        match self {
            CheckKind::EquipmentCoverage => "equipment coverage",
            CheckKind::BlueprintDependencies => "blueprint dependencies",
            CheckKind::MaterialAvailability => "material availability",
        }
    }

    fn title(self) -> &'static str {
        match self {
            CheckKind::EquipmentCoverage => "Equipment Coverage",
            CheckKind::BlueprintDependencies => "Blueprint Dependencies",
            CheckKind::MaterialAvailability => "Material Availability",
        }
    }

    fn satisfied_label(self) -> &'static str {
        match self {
            CheckKind::EquipmentCoverage => "mapped",
            CheckKind::BlueprintDependencies => "found",
            CheckKind::MaterialAvailability => "available",
        }
    }

    fn missing_heading(self) -> &'static str {
        match self {
            CheckKind::EquipmentCoverage => "Missing equipment mappings:",
            CheckKind::BlueprintDependencies => "Missing blueprint dependencies:",
            CheckKind::MaterialAvailability => "Missing materials:",
        }
    }
}

/// Outcome of one coverage check
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageCheck {
    pub kind: CheckKind,
    pub total: usize,
    pub satisfied: usize,
    pub missing: Vec<String>,
}

impl CoverageCheck {
    fn new(kind: CheckKind) -> Self {
        Self {
            kind,
            total: 0,
            satisfied: 0,
            missing: Vec::new(),
        }
    }

    fn record(&mut self, resolved: bool, describe: impl FnOnce() -> String) {
        self.total += 1;
        if resolved {
            self.satisfied += 1;
        } else {
            self.missing.push(describe());
        }
    }

    /// No unresolved references. A check with nothing to check passes.
    pub fn passed(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.satisfied as f64 / self.total as f64 * 100.0
        }
    }

    /// One-line progress summary, e.g. `Equipment coverage: 4/5 mapped`
    pub fn summary_line(&self) -> String {
        let label = self.kind.progress_label();
        let mut chars = label.chars();
        let capitalized: String = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .into_iter()
            .chain(chars)
            .collect();
        format!(
            "{}: {}/{} {}",
            capitalized,
            self.satisfied,
            self.total,
            self.kind.satisfied_label()
        )
    }
}

/// Results of a full validation run
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub equipment_coverage: CoverageCheck,
    pub blueprint_dependencies: CoverageCheck,
    pub material_availability: CoverageCheck,
}

impl ValidationReport {
    pub fn checks(&self) -> [&CoverageCheck; 3] {
        [
            &self.equipment_coverage,
            &self.blueprint_dependencies,
            &self.material_availability,
        ]
    }

    /// All three checks have zero missing references
    pub fn passed(&self) -> bool {
        self.checks().iter().all(|check| check.passed())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{}", rule)?;
        writeln!(f, "MISSION REQUIREMENTS VALIDATION REPORT")?;
        writeln!(f, "{}", rule)?;

        for check in self.checks() {
            if check.total == 0 {
                continue;
            }
            writeln!(f)?;
            writeln!(
                f,
                "{}: {}/{} ({:.1}%)",
                check.kind.title(),
                check.satisfied,
                check.total,
                check.percent()
            )?;
            if !check.missing.is_empty() {
                writeln!(f, "{}", check.kind.missing_heading())?;
                for item in &check.missing {
                    writeln!(f, "  - {}", item)?;
                }
            }
        }

        writeln!(f)?;
        if self.passed() {
            write!(f, "Overall Status: ✓ ALL REQUIREMENTS VALIDATED")
        } else {
            write!(f, "Overall Status: ⚠ ISSUES FOUND - REVIEW REQUIRED")
        }
    }
}

/// Cross-checks references within one knowledge base snapshot
#[derive(Debug, Clone, Copy)]
pub struct Validator<'kb> {
    kb: &'kb KnowledgeBase,
}

impl<'kb> Validator<'kb> {
    pub fn new(kb: &'kb KnowledgeBase) -> Self {
        Self { kb }
    }

    /// Every distinct equipment id required by a phase task must have a
    /// direct cost mapping or a phase alias
    pub fn validate_equipment_coverage(&self) -> CoverageCheck {
        let referenced: BTreeSet<&str> = self
            .kb
            .mission_phases()
            .values()
            .flat_map(|phase| &phase.tasks)
            .flat_map(|task| &task.resources_required)
            .map(String::as_str)
            .collect();

        let mut check = CoverageCheck::new(CheckKind::EquipmentCoverage);
        for equipment in referenced {
            check.record(self.kb.has_cost_mapping(equipment), || equipment.to_string());
        }
        check
    }

    /// Every declared blueprint dependency must be a loaded blueprint.
    /// Counts dependency edges.
    pub fn validate_blueprint_dependencies(&self) -> CoverageCheck {
        let blueprints = self.kb.blueprints();
        let mut check = CoverageCheck::new(CheckKind::BlueprintDependencies);

        for blueprint in blueprints.values() {
            for dependency in blueprint.dependencies.iter().flatten() {
                check.record(blueprints.contains_key(dependency), || {
                    format!("{} -> {}", blueprint.id, dependency)
                });
            }
        }
        check
    }

    /// Every material named in a blueprint's requirements must be a loaded material
    pub fn validate_material_availability(&self) -> CoverageCheck {
        let materials = self.kb.materials();
        let mut check = CoverageCheck::new(CheckKind::MaterialAvailability);

        for blueprint in self.kb.blueprints().values() {
            let required = blueprint
                .material_requirements
                .iter()
                .flatten()
                .filter_map(|req| req.material.as_deref())
                .filter(|material| !material.is_empty());
            for material in required {
                check.record(materials.contains_key(material), || {
                    format!("{} -> {}", blueprint.id, material)
                });
            }
        }
        check
    }

    /// Run all three checks, printing progress as each one completes
    pub fn run(&self) -> ValidationReport {
        let equipment_coverage = self.run_check(CheckKind::EquipmentCoverage);
        let blueprint_dependencies = self.run_check(CheckKind::BlueprintDependencies);
        let material_availability = self.run_check(CheckKind::MaterialAvailability);

        ValidationReport {
            equipment_coverage,
            blueprint_dependencies,
            material_availability,
        }
    }

    fn run_check(&self, kind: CheckKind) -> CoverageCheck {
        println!("Validating {}...", kind.progress_label());
        let check = match kind {
            CheckKind::EquipmentCoverage => self.validate_equipment_coverage(),
            CheckKind::BlueprintDependencies => self.validate_blueprint_dependencies(),
            CheckKind::MaterialAvailability => self.validate_material_availability(),
        };
        println!("{}", check.summary_line());
        info!(
            check = kind.progress_label(),
            total = check.total,
            satisfied = check.satisfied,
            missing = check.missing.len(),
            "check complete"
        );
        check
    }
}
