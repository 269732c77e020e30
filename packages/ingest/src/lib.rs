#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Orchestration for the flood panel pipeline.
//!
//! Each public function here is one pipeline step: disaggregate the raw
//! archive, write severity batch lists, merge severity artifacts, allocate
//! reported impacts, build the balanced panel, export the flag catalog.
//! Steps communicate through the CSV files named in [`config::PipelineConfig`]
//! so they can run in separate processes, in any order that respects their
//! inputs.

pub mod config;
pub mod interactive;
pub mod io;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use flood_panel_allocate::{GdpTable, PopulationTable};
use flood_panel_climate::ClimateSeries;
use flood_panel_events_models::SubEvent;
use flood_panel_gazetteer::{AliasConfig, Gazetteer};
use flood_panel_panel::{FillLevels, FillTable, PanelRegion};
use flood_panel_severity::ArtifactStore;
use flood_panel_severity::progress::{ProgressCallback, null_progress};

use crate::config::PipelineConfig;

/// Counts reported by the disaggregation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisaggregateSummary {
    /// Raw events kept by archive preprocessing.
    pub raw_events: usize,
    /// Sub-events written to the event table.
    pub sub_events: usize,
    /// Raw events routed to the exclusion log.
    pub excluded: usize,
}

/// Loads the gazetteer named by the configuration, with the embedded alias
/// table unless an override file is configured.
///
/// # Errors
///
/// Returns an error if a catalog or alias file cannot be read or parsed.
pub fn load_gazetteer(config: &PipelineConfig) -> Result<Gazetteer, Box<dyn std::error::Error>> {
    let aliases = match &config.paths.region_aliases {
        Some(path) => AliasConfig::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => AliasConfig::embedded()?,
    };
    Ok(Gazetteer::from_paths(
        &config.paths.admin1_regions,
        config.paths.admin2_regions.as_deref(),
        aliases,
    )?)
}

/// Disaggregates the raw archive into region-month sub-events.
///
/// Reads the archive and the gazetteer, expands every matchable event, and
/// writes the event table plus the exclusion log. Severity and allocation
/// fields stay null until the later steps fill them.
///
/// # Errors
///
/// Returns an error if an input cannot be read or an output cannot be
/// written. Unmatchable or undatable events are exclusions, not errors.
pub fn disaggregate(
    config: &PipelineConfig,
) -> Result<DisaggregateSummary, Box<dyn std::error::Error>> {
    let start = Instant::now();

    let events = io::read_raw_events_path(&config.paths.raw_archive, &config.pipeline)?;
    let gazetteer = load_gazetteer(config)?;
    let expansion = flood_panel_disaggregate::expand_events(
        &events,
        &gazetteer,
        config.pipeline.satellite_era_start,
    )?;

    io::write_event_table(&config.paths.event_table, &expansion.sub_events)?;
    io::write_exclusion_log(&config.paths.exclusion_log, &expansion.excluded)?;

    let summary = DisaggregateSummary {
        raw_events: events.len(),
        sub_events: expansion.sub_events.len(),
        excluded: expansion.excluded.len(),
    };
    let elapsed = start.elapsed();
    log::info!(
        "Disaggregation complete: {} raw events -> {} sub-events, {} excluded in {:.1}s",
        summary.raw_events,
        summary.sub_events,
        summary.excluded,
        elapsed.as_secs_f64(),
    );
    Ok(summary)
}

/// Writes sub-event id batch lists for external severity array jobs.
///
/// Ids come from the event table; `batch_size` overrides the configured
/// size when given. Returns the number of batch files written.
///
/// # Errors
///
/// Returns an error if the event table cannot be read, the batch size is
/// zero, or a list file cannot be written.
pub fn split_batches(
    config: &PipelineConfig,
    batch_size: Option<usize>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let sub_events = io::read_event_table(&config.paths.event_table)?;
    let ids: Vec<String> = sub_events
        .iter()
        .map(|sub| sub.sub_event_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let size = batch_size.unwrap_or(config.pipeline.batch_size);
    let paths = flood_panel_severity::write_batches(
        &config.paths.batch_dir,
        &config.pipeline.batch_prefix,
        &ids,
        size,
    )?;

    log::info!(
        "Wrote {} batch list(s) covering {} sub-events to {}",
        paths.len(),
        ids.len(),
        config.paths.batch_dir.display(),
    );
    Ok(paths.len())
}

/// Merges per-sub-event severity artifacts into the combined table.
///
/// Returns the number of merged records.
///
/// # Errors
///
/// Returns an error if the artifact directory cannot be listed, an artifact
/// fails to parse, or the merged table cannot be written.
pub fn merge_metrics(
    config: &PipelineConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let progress = progress.unwrap_or_else(null_progress);

    let store = ArtifactStore::new(&config.paths.severity_dir);
    let records = store.load_merged(&progress)?;
    flood_panel_severity::write_merged(&config.paths.severity_table, &records)?;

    let elapsed = start.elapsed();
    log::info!(
        "Merged {} severity record(s) into {} in {:.1}s",
        records.len(),
        config.paths.severity_table.display(),
        elapsed.as_secs_f64(),
    );
    Ok(records.len())
}

/// Joins severity estimates onto sub-events, allocates reported impacts,
/// and derives normalized impacts.
///
/// Rewrites the event table in place and logs a per-flag summary. Returns
/// the number of sub-events written.
///
/// # Errors
///
/// Returns an error if any input table cannot be read or the event table
/// cannot be rewritten. Estimator failures are flags on the affected
/// sub-events, never errors.
pub fn allocate(
    config: &PipelineConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<usize, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let progress = progress.unwrap_or_else(null_progress);

    let mut sub_events = io::read_event_table(&config.paths.event_table)?;
    let events = io::read_raw_events_path(&config.paths.raw_archive, &config.pipeline)?;
    let records = flood_panel_severity::read_merged(&config.paths.severity_table)?;

    flood_panel_severity::apply_severity(
        &mut sub_events,
        &records,
        config.pipeline.clear_fraction_threshold,
        &progress,
    );
    let mut sub_events = flood_panel_allocate::allocate_impacts(&events, sub_events, &progress);

    let gazetteer = load_gazetteer(config)?;
    let region_countries: BTreeMap<i64, i64> = gazetteer
        .regions()
        .map(|region| (region.code, region.country_code))
        .collect();
    let mut gdp = GdpTable::from_path(&config.paths.gdp_table)?;
    gdp.fill_country_means(&region_countries);
    let population = PopulationTable::from_path(&config.paths.population_table)?;
    flood_panel_allocate::apply_normalized_impacts(&mut sub_events, &gdp, &population);

    log_flag_summary(&sub_events);
    io::write_event_table(&config.paths.event_table, &sub_events)?;

    let elapsed = start.elapsed();
    log::info!(
        "Allocation complete: {} sub-events in {:.1}s",
        sub_events.len(),
        elapsed.as_secs_f64(),
    );
    Ok(sub_events.len())
}

/// Builds the balanced region-month panel and writes it.
///
/// The region universe is the full gazetteer catalog; regions without any
/// flood history still get their complement of rows. Returns the number of
/// panel cells written.
///
/// # Errors
///
/// Returns an error if an input cannot be read, the configured year range
/// is inverted, or the panel cannot be written.
pub fn build_panel(config: &PipelineConfig) -> Result<usize, Box<dyn std::error::Error>> {
    let start = Instant::now();

    let sub_events = io::read_event_table(&config.paths.event_table)?;
    let gazetteer = load_gazetteer(config)?;
    let regions: Vec<PanelRegion> = gazetteer
        .regions()
        .map(|region| PanelRegion {
            code: region.code,
            name: region.name.clone(),
            country: region.country_name.clone(),
            iso3: region.iso3.clone(),
        })
        .collect();

    let climate = ClimateSeries::from_daily_path(&config.paths.climate_daily)?;
    let levels = FillLevels {
        event_missing: config.fills.event_missing_quantile,
        no_event: config.fills.no_event_quantile,
    };
    let fills = FillTable::compute(&sub_events, levels, config.fills.min_region_samples);

    let cells = flood_panel_panel::build_panel(
        &regions,
        (config.pipeline.start_year, config.pipeline.end_year),
        &sub_events,
        &climate,
        &fills,
    )?;
    io::write_panel_table(&config.paths.panel_table, &cells)?;

    let elapsed = start.elapsed();
    log::info!(
        "Panel complete: {} cells in {:.1}s",
        cells.len(),
        elapsed.as_secs_f64(),
    );
    Ok(cells.len())
}

/// Exports the quality-flag catalog CSV.
///
/// # Errors
///
/// Returns an error if the catalog file cannot be written.
pub fn export_flag_catalog(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    io::write_flag_catalog(&config.paths.flag_catalog)
}

/// Logs how many sub-events and raw events carry each quality flag.
#[allow(clippy::cast_precision_loss)]
fn log_flag_summary(sub_events: &[SubEvent]) {
    if sub_events.is_empty() {
        return;
    }
    let total_subs = sub_events.len();
    let total_raws = sub_events
        .iter()
        .map(|sub| sub.raw_event_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    let counts = flood_panel_flags::summarize(
        sub_events
            .iter()
            .map(|sub| (&sub.flags, sub.raw_event_id.as_str())),
    );

    log::info!("Quality flag summary over {total_subs} sub-events / {total_raws} raw events:");
    for (flag, count) in counts {
        log::info!(
            "  [{:2}] {flag}: {} sub-events ({:.1}%), {} raw events ({:.1}%)",
            flag.code(),
            count.sub_events,
            count.sub_events as f64 / total_subs as f64 * 100.0,
            count.raw_events,
            count.raw_events as f64 / total_raws as f64 * 100.0,
        );
    }
}
