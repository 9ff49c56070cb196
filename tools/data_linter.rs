/// Data Linter — validates interaction, bonding and trick tables.
///
/// Usage: data_linter [--interactions <file>] [--bonding <file>] [--tricks <file>]
///
/// Tables not given on the command line are checked from the built-in data.

use std::path::Path;
use std::process;
use taming_engine::core::validate::{self, LintReport};
use taming_engine::schema::bond::BondingTable;
use taming_engine::schema::interaction::InteractionTable;
use taming_engine::schema::trick::TrickTable;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Usage: data_linter [--interactions <file>] [--bonding <file>] [--tricks <file>]");
        process::exit(0);
    }

    let mut interactions_path = None;
    let mut bonding_path = None;
    let mut tricks_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--interactions" if i + 1 < args.len() => {
                i += 1;
                interactions_path = Some(args[i].clone());
            }
            "--bonding" if i + 1 < args.len() => {
                i += 1;
                bonding_path = Some(args[i].clone());
            }
            "--tricks" if i + 1 < args.len() => {
                i += 1;
                tricks_path = Some(args[i].clone());
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let interactions = load(
        "interactions",
        interactions_path.as_deref(),
        InteractionTable::load_from_ron,
        InteractionTable::builtin,
    );
    let bonding = load(
        "bonding",
        bonding_path.as_deref(),
        BondingTable::load_from_ron,
        BondingTable::builtin,
    );
    let tricks = load(
        "tricks",
        tricks_path.as_deref(),
        TrickTable::load_from_ron,
        TrickTable::builtin,
    );

    println!(
        "Loaded {} interactions, {} bond levels, {} milestones, {} abilities, {} tricks",
        interactions.interactions.len(),
        bonding.levels.len(),
        bonding.milestones.len(),
        bonding.abilities.len(),
        tricks.tricks.len()
    );

    let report = validate::lint_all(&interactions, &bonding, &tricks);
    print_report(&report);

    if report.has_errors() {
        process::exit(1);
    }
}

fn load<T, E: std::fmt::Display>(
    label: &str,
    path: Option<&str>,
    from_file: impl Fn(&Path) -> Result<T, E>,
    builtin: impl Fn() -> Result<T, E>,
) -> T {
    let loaded = match path {
        Some(p) => {
            println!("  Loading {}: {}", label, p);
            from_file(Path::new(p))
        }
        None => builtin(),
    };
    match loaded {
        Ok(table) => table,
        Err(e) => {
            eprintln!("ERROR: Failed to load {} table: {}", label, e);
            process::exit(1);
        }
    }
}

fn print_report(report: &LintReport) {
    println!("\n=== Data Lint Report ===\n");

    if report.is_clean() {
        println!("All checks passed!");
    }

    for warning in &report.warnings {
        println!("WARNING: {}", warning);
    }

    for error in &report.errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        report.errors.len(),
        report.warnings.len()
    );
}
