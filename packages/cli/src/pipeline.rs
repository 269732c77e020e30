//! Full pipeline orchestrator for the flood panel toolchain.
//!
//! Chains disaggregate -> batch lists -> merge -> allocate -> panel ->
//! catalog in a single interactive flow, prompting for steps and optional
//! advanced parameters. Uses `indicatif` progress bars for real-time visual
//! feedback.

use std::time::Instant;

use dialoguer::{Confirm, Input, MultiSelect};
use flood_panel_cli_utils::{IndicatifProgress, MultiProgress};
use flood_panel_ingest::config::PipelineConfig;

/// Steps available in the pipeline.
enum PipelineStep {
    Disaggregate,
    SplitBatches,
    MergeMetrics,
    Allocate,
    BuildPanel,
    FlagCatalog,
}

impl PipelineStep {
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

    /// Whether the step is preselected in the menu. Batch lists are only
    /// needed when scheduling external estimator jobs.
    #[must_use]
    const fn preselected(&self) -> bool {
        !matches!(self, Self::SplitBatches)
    }
}

/// Runs the full pipeline orchestrator.
///
/// Prompts the user for pipeline steps and optional advanced configuration,
/// then executes each selected step in catalog order.
///
/// The `multi` parameter is the shared [`MultiProgress`] that is also
/// registered with the log bridge, so all `log::info!` output is
/// automatically suspended while progress bars redraw.
///
/// # Errors
///
/// Returns an error if a user prompt fails. A failed step asks whether to
/// continue instead of aborting the run.
pub fn run(
    multi: &MultiProgress,
    config: &PipelineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline_start = Instant::now();

    // --- 1. Select pipeline steps ---
    let step_labels: Vec<&str> = PipelineStep::ALL.iter().map(PipelineStep::label).collect();
    let defaults: Vec<bool> = PipelineStep::ALL
        .iter()
        .map(PipelineStep::preselected)
        .collect();

    let selected_steps = MultiSelect::new()
        .with_prompt("Pipeline steps (space=toggle, a=all, enter=confirm)")
        .items(&step_labels)
        .defaults(&defaults)
        .interact()?;

    if selected_steps.is_empty() {
        println!("No steps selected.");
        return Ok(());
    }

    let has_split = selected_steps
        .iter()
        .any(|&i| matches!(PipelineStep::ALL[i], PipelineStep::SplitBatches));

    // --- 2. Advanced options gate ---
    let mut batch_size: Option<usize> = None;

    let advanced = Confirm::new()
        .with_prompt("Configure advanced options?")
        .default(false)
        .interact()?;

    if advanced && has_split {
        batch_size = prompt_optional_usize(&format!(
            "Batch size (empty for configured {})",
            config.pipeline.batch_size
        ))?;
    }

    // --- 3. Execute pipeline ---
    println!();
    log::info!("Starting pipeline ({} steps)...", selected_steps.len());

    let total_steps = selected_steps.len();
    let mut current_step = 0usize;

    let steps_bar = IndicatifProgress::steps_bar(multi, "Pipeline", total_steps as u64);

    for &idx in &selected_steps {
        let step = &PipelineStep::ALL[idx];
        current_step += 1;
        steps_bar.set_message(format!(
            "[{current_step}/{total_steps}] {}",
            step.label()
        ));

        let result = match step {
            PipelineStep::Disaggregate => flood_panel_ingest::disaggregate(config).map(|_| ()),
            PipelineStep::SplitBatches => {
                flood_panel_ingest::split_batches(config, batch_size).map(|_| ())
            }
            PipelineStep::MergeMetrics => {
                // Per-step record bar -- cleared when the step finishes so
                // completed bars don't accumulate.
                let bar = IndicatifProgress::records_bar(
                    multi,
                    &format!("[{current_step}/{total_steps}] Merging artifacts"),
                );
                flood_panel_ingest::merge_metrics(config, Some(bar)).map(|_| ())
            }
            PipelineStep::Allocate => {
                let bar = IndicatifProgress::records_bar(
                    multi,
                    &format!("[{current_step}/{total_steps}] Allocating"),
                );
                flood_panel_ingest::allocate(config, Some(bar)).map(|_| ())
            }
            PipelineStep::BuildPanel => flood_panel_ingest::build_panel(config).map(|_| ()),
            PipelineStep::FlagCatalog => flood_panel_ingest::export_flag_catalog(config),
        };

        if let Err(e) = result {
            log::error!("{} failed: {e}", step.label());
            if !ask_continue()? {
                return Ok(());
            }
        }

        steps_bar.inc(1);
    }

    steps_bar.finish(format!("Pipeline: {total_steps} step(s) complete"));

    let elapsed = pipeline_start.elapsed();
    log::info!("Pipeline complete in {:.1}s", elapsed.as_secs_f64());

    Ok(())
}

/// Asks the user whether to continue after an error.
fn ask_continue() -> Result<bool, Box<dyn std::error::Error>> {
    Ok(Confirm::new()
        .with_prompt("Continue to next step?")
        .default(true)
        .interact()?)
}

/// Prompts the user for an optional `usize` value.
///
/// Returns `None` if the input is empty.
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
