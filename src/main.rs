//! Mission cost calculator
//!
//! Prices the equipment in mission manifests from a JSON knowledge base of
//! equipment cost mappings, and checks that the knowledge base's cross
//! references resolve.

mod calculator;
mod knowledge_base;
mod manifest;
mod models;
mod validate;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::calculator::{CostEngine, format_usd};
use crate::knowledge_base::KnowledgeBase;
use crate::models::EnvironmentFactors;
use crate::validate::{ValidationReport, Validator};

#[derive(Parser)]
#[command(name = "mission-cost")]
#[command(version)]
#[command(about = "Equipment cost calculator and requirements validator for mission manifests")]
struct Cli {
    /// Root of the JSON knowledge base
    #[arg(
        short,
        long,
        global = true,
        env = "MISSION_COST_DATA_DIR",
        default_value = "data/json-data"
    )]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate equipment costs for a mission manifest and rewrite it in place
    Calc {
        /// Path to the mission manifest JSON file
        manifest: PathBuf,
    },

    /// Check equipment, blueprint and material references in the knowledge base
    Validate,

    /// Show the resolved cost of a single piece of equipment
    Quote {
        /// Equipment id (direct mapping, phase alias, or free-form name)
        equipment_id: String,

        /// Target environment text used to derive environment factors (e.g., "Lunar Base Alpha")
        #[arg(short, long)]
        target: Option<String>,
    },

    /// List equipment cost mappings and phase aliases
    ListEquipment,

    /// List materials and items with their recorded costs
    ListMaterials,
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print()?;
            process::exit(parse_exit_code(&err));
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (kb, stats) = knowledge_base::load(&cli.data_dir)?;
    info!(data_dir = %cli.data_dir.display(), "{}", stats);

    match cli.command {
        Commands::Calc {
            manifest: manifest_path,
        } => {
            println!("Calculating costs for {}...", manifest_path.display());
            let total = manifest::update_manifest_file(&manifest_path, CostEngine::new(&kb))?;
            println!(
                "Updated manifest with total calculated cost: {} USD",
                format_usd(total)
            );
        }

        Commands::Validate => {
            let report = Validator::new(&kb).run();
            println!("\n{}", report);
            let code = validation_exit_code(&report);
            if code != 0 {
                process::exit(code);
            }
        }

        Commands::Quote {
            equipment_id,
            target,
        } => {
            let environment = target
                .as_deref()
                .map(manifest::derive_environment_factors)
                .unwrap_or_default();
            print_quote(&kb, &equipment_id, &environment)?;
        }

        Commands::ListEquipment => list_equipment(&kb),

        Commands::ListMaterials => list_materials(&kb),
    }

    Ok(())
}

/// Exit status for an argument error. Help and version go to stdout and are not failures.
fn parse_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() { 1 } else { 0 }
}

fn validation_exit_code(report: &ValidationReport) -> i32 {
    if report.passed() { 0 } else { 1 }
}

fn print_quote(kb: &KnowledgeBase, equipment_id: &str, environment: &EnvironmentFactors) -> Result<()> {
    let entry = CostEngine::new(kb).resolve_cost(equipment_id, environment)?;

    println!("Equipment: {}", entry.equipment_id);
    if let Some(alias) = kb.phase_mapping(equipment_id) {
        println!(
            "  Alias of: {} (x{})",
            alias.base_equipment, alias.quantity_multiplier
        );
    }
    println!("  Tier: {}", entry.tier);
    println!("  Environment: {}", environment);
    println!("  Cost: {} USD", format_usd(entry.cost_usd));
    Ok(())
}

fn list_equipment(kb: &KnowledgeBase) {
    if kb.equipment_costs().is_empty() && kb.phase_mappings().is_empty() {
        println!("No equipment mappings loaded. Check --data-dir.");
        return;
    }

    println!(
        "{:<40} {:>16} {:>10} {:>10}",
        "Equipment", "Base (USD)", "Complexity", "Labor"
    );
    println!("{}", "-".repeat(79));
    for (id, mapping) in kb.equipment_costs() {
        println!(
            "{:<40} {:>16.0} {:>10.2} {:>10.2}",
            id, mapping.base_cost_usd, mapping.complexity_multiplier, mapping.labor_factor
        );
    }

    if !kb.phase_mappings().is_empty() {
        println!();
        println!("Phase aliases:");
        for (id, alias) in kb.phase_mappings() {
            let marker = if kb.equipment_cost(&alias.base_equipment).is_some() {
                ""
            } else {
                "  (unresolved)"
            };
            println!(
                "  {} -> {} x{}{}",
                id, alias.base_equipment, alias.quantity_multiplier, marker
            );
        }
    }
}

fn list_materials(kb: &KnowledgeBase) {
    if kb.materials().is_empty() && kb.items().is_empty() {
        println!("No materials or items loaded. Check --data-dir.");
        return;
    }

    println!("{:<40} {:>16}", "Material", "Purchase cost");
    println!("{}", "-".repeat(57));
    for material in kb.materials().values() {
        let cost = material
            .purchase_cost()
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<40} {:>16}", material.id, cost);
    }

    println!();
    println!("{:<40} {:>16}", "Item", "Value");
    println!("{}", "-".repeat(57));
    for item in kb.items().values() {
        let value = item
            .game_value()
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<40} {:>16}", item.id, value);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    use super::*;

    fn parse_error(args: &[&str]) -> clap::Error {
        match Cli::try_parse_from(args.iter().copied()) {
            Ok(_) => panic!("expected {:?} to be rejected", args),
            Err(err) => err,
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn calc_without_manifest_exits_with_usage() {
        let err = parse_error(&["mission-cost", "calc"]);

        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(parse_exit_code(&err), 1);
        assert!(err.render().to_string().contains("Usage:"));
    }

    #[test]
    fn unknown_subcommand_exits_nonzero() {
        let err = parse_error(&["mission-cost", "estimate"]);
        assert_eq!(parse_exit_code(&err), 1);
    }

    #[test]
    fn help_and_version_exit_cleanly() {
        let help = parse_error(&["mission-cost", "--help"]);
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse_exit_code(&help), 0);

        let version = parse_error(&["mission-cost", "--version"]);
        assert_eq!(version.kind(), ErrorKind::DisplayVersion);
        assert_eq!(parse_exit_code(&version), 0);
    }

    #[test]
    fn data_dir_is_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from(["mission-cost", "calc", "outpost.json", "-d", "/srv/kb"]).unwrap();

        assert_eq!(cli.data_dir, PathBuf::from("/srv/kb"));
        assert!(matches!(
            &cli.command,
            Commands::Calc { manifest } if *manifest == PathBuf::from("outpost.json")
        ));
    }

    #[test]
    fn validation_exit_code_follows_report() {
        let fixtures = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/json-data");
        let (kb, _) = knowledge_base::load(&fixtures).unwrap();
        assert_eq!(validation_exit_code(&Validator::new(&kb).run()), 1);

        let empty = KnowledgeBase::default();
        assert_eq!(validation_exit_code(&Validator::new(&empty).run()), 0);
    }
}
