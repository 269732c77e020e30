//! Pipeline configuration, loaded from TOML.
//!
//! A default configuration ships embedded in the binary via
//! [`include_str!`]; a user-supplied file overrides it key by key, so a
//! config only needs to spell out what differs from the defaults.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

/// Default configuration TOML embedded at compile time.
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Everything the pipeline steps need to know: input and output locations
/// plus the tunable parameters of disaggregation, severity, and imputation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input and output file locations.
    pub paths: PathsConfig,
    /// Year range, era boundary, and allocation tunables.
    pub pipeline: PipelineParams,
    /// Percentile imputation tunables.
    pub fills: FillParams,
}

/// File and directory locations for every pipeline boundary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw disaster archive export (EM-DAT style CSV).
    pub raw_archive: PathBuf,
    /// Level-1 region catalog CSV.
    pub admin1_regions: PathBuf,
    /// Level-2 → level-1 parent CSV; resolution falls back to names when
    /// absent.
    pub admin2_regions: Option<PathBuf>,
    /// Region alias TOML overriding the embedded alias table.
    pub region_aliases: Option<PathBuf>,
    /// Daily precipitation CSV from the climate collaborator.
    pub climate_daily: PathBuf,
    /// Per-region annual GDP CSV.
    pub gdp_table: PathBuf,
    /// Per-region five-yearly population CSV.
    pub population_table: PathBuf,
    /// Directory of per-sub-event severity artifacts.
    pub severity_dir: PathBuf,
    /// Merged severity table written by the merge step.
    pub severity_table: PathBuf,
    /// Directory receiving sub-event id batch lists.
    pub batch_dir: PathBuf,
    /// Event-level output table, one row per sub-event.
    pub event_table: PathBuf,
    /// Exclusion log, one row per excluded raw event.
    pub exclusion_log: PathBuf,
    /// Balanced panel output table.
    pub panel_table: PathBuf,
    /// Quality-flag catalog export.
    pub flag_catalog: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_archive: PathBuf::from("data/emdat_floods.csv"),
            admin1_regions: PathBuf::from("data/admin1_regions.csv"),
            admin2_regions: Some(PathBuf::from("data/admin2_regions.csv")),
            region_aliases: None,
            climate_daily: PathBuf::from("data/precipitation_daily.csv"),
            gdp_table: PathBuf::from("data/region_gdp.csv"),
            population_table: PathBuf::from("data/region_population.csv"),
            severity_dir: PathBuf::from("artifacts/severity"),
            severity_table: PathBuf::from("output/severity_merged.csv"),
            batch_dir: PathBuf::from("output/batches"),
            event_table: PathBuf::from("output/flood_events.csv"),
            exclusion_log: PathBuf::from("output/excluded_events.csv"),
            panel_table: PathBuf::from("output/flood_panel.csv"),
            flag_catalog: PathBuf::from("output/flag_catalog.csv"),
        }
    }
}

/// Tunables shared across pipeline steps.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// First panel year; archive rows starting earlier are dropped on load.
    pub start_year: i32,
    /// Last panel year, also the final archive year for CPI derivation.
    pub end_year: i32,
    /// First date with usable satellite coverage; earlier slices are
    /// flagged.
    pub satellite_era_start: NaiveDate,
    /// CPI ratio dividing nominal damage into adjusted damage for events
    /// starting in the final archive year.
    pub cpi_ratio: f64,
    /// Clear-observation fraction below which a severity estimate is
    /// flagged.
    pub clear_fraction_threshold: f64,
    /// Sub-event ids per batch list file.
    pub batch_size: usize,
    /// File name prefix for batch list files.
    pub batch_prefix: String,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            start_year: 2000,
            end_year: 2024,
            satellite_era_start: NaiveDate::from_ymd_opt(2000, 2, 25).expect("valid date"),
            cpi_ratio: 1.029_495_111,
            clear_fraction_threshold: 0.5,
            batch_size: 250,
            batch_prefix: "batch".to_string(),
        }
    }
}

/// Percentile imputation tunables for the panel builder.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FillParams {
    /// Quantile filled into event cells with missing normalized impacts.
    pub event_missing_quantile: f64,
    /// Quantile filled into cells with no recorded flood.
    pub no_event_quantile: f64,
    /// Minimum observations before a region's own distribution is used.
    pub min_region_samples: usize,
}

impl Default for FillParams {
    fn default() -> Self {
        Self {
            event_missing_quantile: 0.05,
            no_event_quantile: 0.02,
            min_region_samples: 4,
        }
    }
}

impl PipelineConfig {
    /// Parses the embedded default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded TOML fails to parse.
    pub fn embedded() -> Result<Self, toml::de::Error> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Parses a configuration from a TOML string. Missing keys keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML fails to parse.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        log::info!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Loads a configuration from the given path, or the embedded defaults
    /// when no path is supplied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or either TOML fails to
    /// parse.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::embedded()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_config_matches_defaults() {
        let embedded = PipelineConfig::embedded().unwrap();
        assert_eq!(embedded, PipelineConfig::default());
    }

    #[test]
    fn partial_config_keeps_defaults_for_omitted_keys() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [paths]
            event_table = "elsewhere/events.csv"

            [pipeline]
            end_year = 2020
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.event_table, PathBuf::from("elsewhere/events.csv"));
        assert_eq!(config.paths.raw_archive, PathBuf::from("data/emdat_floods.csv"));
        assert_eq!(config.pipeline.end_year, 2020);
        assert_eq!(config.pipeline.start_year, 2000);
        assert_eq!(config.fills.min_region_samples, 4);
    }

    #[test]
    fn satellite_era_start_parses_iso_date() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [pipeline]
            satellite_era_start = "2001-06-01"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.pipeline.satellite_era_start,
            NaiveDate::from_ymd_opt(2001, 6, 1).unwrap()
        );
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(PipelineConfig::from_toml_str("[pipeline\nstart_year = ").is_err());
    }

    #[test]
    fn load_reads_a_config_file() {
        let dir = std::env::temp_dir().join("flood_panel_ingest_config_load_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[pipeline]\nbatch_size = 10\n").unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.pipeline.batch_size, 10);

        let fallback = PipelineConfig::load(None).unwrap();
        assert_eq!(fallback, PipelineConfig::default());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
