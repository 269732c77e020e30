#![allow(clippy::module_name_repetitions)]

//! Interactive TUI for the flood panel pipeline.
//!
//! Provides a menu-driven interface using `dialoguer` for running single
//! pipeline steps without memorizing CLI flags.

use std::path::PathBuf;

use dialoguer::{Input, Select};
use flood_panel_cli_utils::{IndicatifProgress, MultiProgress};

use crate::config::PipelineConfig;

/// Steps available in the interactive menu.
enum PipelineAction {
    Disaggregate,
    SplitBatches,
    MergeMetrics,
    Allocate,
    BuildPanel,
    FlagCatalog,
}

impl PipelineAction {
    const ALL: &[Self] = &[
        Self::Disaggregate,
        Self::SplitBatches,
        Self::MergeMetrics,
        Self::Allocate,
        Self::BuildPanel,
        Self::FlagCatalog,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Disaggregate => "Disaggregate raw archive",
            Self::SplitBatches => "Write severity batch lists",
            Self::MergeMetrics => "Merge severity artifacts",
            Self::Allocate => "Allocate reported impacts",
            Self::BuildPanel => "Build balanced panel",
            Self::FlagCatalog => "Export flag catalog",
        }
    }
}

/// Runs the interactive menu, prompting the user to select and configure a
/// pipeline step.
///
/// The `multi` parameter is the shared [`MultiProgress`] that is also
/// registered with the log bridge, so all `log::info!` output is
/// automatically suspended while progress bars redraw.
///
/// # Errors
///
/// Returns an error if configuration loading, a user prompt, or the
/// selected step fails.
pub fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let config = prompt_config()?;

    let labels: Vec<&str> = PipelineAction::ALL
        .iter()
        .map(PipelineAction::label)
        .collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match PipelineAction::ALL[idx] {
        PipelineAction::Disaggregate => {
            crate::disaggregate(&config)?;
        }
        PipelineAction::SplitBatches => split_batches_interactive(&config)?,
        PipelineAction::MergeMetrics => {
            let bar = IndicatifProgress::records_bar(multi, "Merging severity artifacts");
            crate::merge_metrics(&config, Some(bar))?;
        }
        PipelineAction::Allocate => {
            let bar = IndicatifProgress::records_bar(multi, "Allocating impacts");
            crate::allocate(&config, Some(bar))?;
        }
        PipelineAction::BuildPanel => {
            crate::build_panel(&config)?;
        }
        PipelineAction::FlagCatalog => crate::export_flag_catalog(&config)?,
    }

    Ok(())
}

/// Prompts for a batch size and writes the severity batch lists.
fn split_batches_interactive(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let batch_size = prompt_optional_usize(&format!(
        "Batch size (empty for configured {})",
        config.pipeline.batch_size
    ))?;
    crate::split_batches(config, batch_size)?;
    Ok(())
}

/// Prompts for a configuration file path. Empty input keeps the embedded
/// defaults.
fn prompt_config() -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let input: String = Input::new()
        .with_prompt("Config file path (empty for embedded defaults)")
        .allow_empty(true)
        .interact_text()?;

    let trimmed = input.trim();
    let path = (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
    PipelineConfig::load(path.as_deref())
}

/// Prompts the user for an optional `usize` value. Returns `None` if the
/// input is empty.
fn prompt_optional_usize(prompt: &str) -> Result<Option<usize>, Box<dyn std::error::Error>> {
    let input: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;

    if input.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(input.trim().parse()?))
    }
}
