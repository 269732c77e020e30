#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the flood panel toolchain.
//!
//! Provides a unified binary that runs pipeline steps from subcommands or,
//! with no subcommand, drops into an interactive menu.
//!
//! Uses `indicatif-log-bridge` (via [`flood_panel_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dialoguer::Select;
use flood_panel_cli_utils::IndicatifProgress;
use flood_panel_ingest::config::PipelineConfig;

#[derive(Parser)]
#[command(name = "flood_panel_cli", about = "Flood disaster panel pipeline")]
struct Cli {
    /// Path to a TOML configuration file; embedded defaults if omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline steps end to end with progress bars
    Run,
    /// Disaggregate the raw archive into region-month sub-events
    Disaggregate,
    /// Write sub-event id batch lists for external severity array jobs
    SplitBatches {
        /// Sub-event ids per batch file (overrides the configured size)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Merge per-sub-event severity artifacts into the combined table
    MergeMetrics,
    /// Join severity estimates onto sub-events and allocate reported impacts
    Allocate,
    /// Build the balanced region-month panel
    BuildPanel,
    /// Export the quality-flag catalog
    FlagCatalog,
}

/// Interactive modes offered when no subcommand is given.
enum Tool {
    RunPipeline,
    SingleStep,
}

impl Tool {
    const ALL: &[Self] = &[Self::RunPipeline, Self::SingleStep];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::RunPipeline => "Run full pipeline",
            Self::SingleStep => "Run a single step",
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = flood_panel_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Flood Panel Toolchain");
        println!();

        let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();

        let idx = Select::new()
            .with_prompt("What would you like to do?")
            .items(&labels)
            .default(0)
            .interact()?;

        return match Tool::ALL[idx] {
            Tool::RunPipeline => {
                let config = PipelineConfig::load(cli.config.as_deref())?;
                pipeline::run(&multi, &config)
            }
            Tool::SingleStep => flood_panel_ingest::interactive::run(&multi),
        };
    };

    let config = PipelineConfig::load(cli.config.as_deref())?;

    match command {
        Commands::Run => pipeline::run(&multi, &config)?,
        Commands::Disaggregate => {
            flood_panel_ingest::disaggregate(&config)?;
        }
        Commands::SplitBatches { batch_size } => {
            flood_panel_ingest::split_batches(&config, batch_size)?;
        }
        Commands::MergeMetrics => {
            let bar = IndicatifProgress::records_bar(&multi, "Merging severity artifacts");
            flood_panel_ingest::merge_metrics(&config, Some(bar))?;
        }
        Commands::Allocate => {
            let bar = IndicatifProgress::records_bar(&multi, "Allocating impacts");
            flood_panel_ingest::allocate(&config, Some(bar))?;
        }
        Commands::BuildPanel => {
            flood_panel_ingest::build_panel(&config)?;
        }
        Commands::FlagCatalog => flood_panel_ingest::export_flag_catalog(&config)?,
    }

    Ok(())
}
