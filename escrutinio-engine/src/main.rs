//! escrutinio - operator CLI for the electoral data-collection core
//!
//! Bootstrap and batch entry points: initialise the database, run a
//! consolidation for a municipality, print witness coverage. The web
//! front-end is a separate process that consumes this crate as a
//! library.

use anyhow::Result;
use clap::{Parser, Subcommand};
use escrutinio_common::config::Config;
use escrutinio_common::events::EventBus;
use escrutinio_engine::Engine;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "escrutinio", about = "Electoral data-collection core", version)]
struct Cli {
    /// Explicit config file path (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema and data directories
    InitDb,
    /// Begin and run a consolidation, printing the summary
    Consolidate {
        #[arg(long)]
        municipality: i64,
        #[arg(long)]
        election_type: i64,
        #[arg(long)]
        process: i64,
        /// Acting user id recorded on the consolidation
        #[arg(long, default_value_t = 0)]
        user: i64,
        /// Also render the E-24 artifact after the run
        #[arg(long)]
        generate_e24: bool,
        /// Print the summary as JSON instead of a human-readable line
        #[arg(long)]
        json: bool,
    },
    /// Print witness coverage for a municipality
    Coverage {
        #[arg(long)]
        municipality: i64,
        #[arg(long)]
        process: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("escrutinio {}", env!("CARGO_PKG_VERSION"));
    config.ensure_directories()?;

    info!("Database: {}", config.database_path.display());
    let db = escrutinio_common::db::init_database_pool(&config.database_path).await?;

    let engine = Engine::new(db, EventBus::new(256), config);

    match cli.command {
        Command::InitDb => {
            // Pool initialisation already created the schema
            info!("database initialised");
        }
        Command::Consolidate {
            municipality,
            election_type,
            process,
            user,
            generate_e24,
            json,
        } => {
            let consolidation = engine.consolidation_engine();
            let id = consolidation
                .begin(municipality, election_type, process, user)
                .await?;
            let summary = consolidation.run(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "consolidation {}: {}/{} tables, valid {}, blank {}, null {}, ballots {}{}",
                    summary.consolidation_id,
                    summary.tables_processed,
                    summary.total_tables_expected,
                    summary.total_valid_votes,
                    summary.total_blank_votes,
                    summary.total_null_votes,
                    summary.total_ballots,
                    if summary.completed { " [completed]" } else { "" },
                );
            }
            if generate_e24 {
                let artifact = consolidation.generate_e24(id, user).await?;
                println!("E-24 artifact: {}", artifact);
            }
        }
        Command::Coverage {
            municipality,
            process,
        } => {
            let report = engine.witness_assigner().coverage(municipality, process).await?;
            println!(
                "coverage: {}/{} tables ({:.1}%)",
                report.covered_tables,
                report.total_tables,
                report.coverage_percent()
            );
            for place in &report.places {
                println!(
                    "  {}: {}/{}",
                    place.polling_place_name, place.covered_tables, place.total_tables
                );
            }
            for table in report.uncovered() {
                println!(
                    "  uncovered: mesa {} ({})",
                    table.table_number, table.polling_place_name
                );
            }
        }
    }

    Ok(())
}
