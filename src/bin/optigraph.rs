//! Optigraph CLI: replay mutation scenarios and inspect the relationship schema.
//!
//! Usage:
//!   optigraph replay <scenario.json> [--pretty] [--strict] [--config path]
//!   optigraph schema [--entity type]

use clap::{Parser, Subcommand};
use optigraph::schema::{relation_fields, Cardinality};
use optigraph::scenario::{run_scenario, Scenario};
use optigraph::{EngineConfig, EntityType};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "optigraph",
    version,
    about = "Optimistic mutation engine for cached entity graphs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to a YAML engine config
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted scenario and print the report as JSON
    Replay {
        /// Scenario file
        scenario: PathBuf,
        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
        /// Exit non-zero if any step failed
        #[arg(long)]
        strict: bool,
    },
    /// Print the relationship fields of one or all entity types
    Schema {
        /// Entity type to show
        #[arg(long)]
        entity: Option<EntityType>,
    },
}

fn init_logging(level: &str, verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        level.parse().unwrap_or(tracing::Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => EngineConfig::from_yaml_file(&path).map_err(|e| e.to_string()),
        None => Ok(EngineConfig::default()),
    }
}

fn cmd_replay(config: EngineConfig, path: &PathBuf, pretty: bool, strict: bool) -> i32 {
    let scenario = match Scenario::from_file(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };

    let report = rt.block_on(run_scenario(&scenario, config));
    let rendered = if pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    };
    match rendered {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    if strict && report.failures() > 0 {
        eprintln!("{} of {} steps failed", report.failures(), report.steps.len());
        return 2;
    }
    0
}

fn cmd_schema(entity: Option<EntityType>) -> i32 {
    let types: Vec<EntityType> = match entity {
        Some(t) => vec![t],
        None => EntityType::ALL.to_vec(),
    };
    println!("{:<10}  {:<22}  {:<6}  {:<10}  {:<22}  {}", "TYPE", "FIELD", "CARD", "TARGET", "INVERSE", "EDGE");
    println!("{}", "-".repeat(88));
    for entity_type in types {
        for field in relation_fields(entity_type) {
            let card = match field.cardinality {
                Cardinality::Single => "single",
                Cardinality::Many => "many",
            };
            let edge = field.edge.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
            println!(
                "{:<10}  {:<22}  {:<6}  {:<10}  {:<22}  {}",
                entity_type,
                field.name,
                card,
                field.target,
                field.inverse.unwrap_or("-"),
                edge
            );
        }
    }
    0
}

fn main() {
    let cli = Cli::parse();
    let config = match load_config(cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config.log_level, cli.verbose);

    let code = match cli.command {
        Commands::Replay {
            scenario,
            pretty,
            strict,
        } => cmd_replay(config, &scenario, pretty, strict),
        Commands::Schema { entity } => cmd_schema(entity),
    };
    std::process::exit(code);
}
