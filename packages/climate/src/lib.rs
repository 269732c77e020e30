#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Monthly precipitation anomalies from the daily climate artifact.
//!
//! The extraction collaborator produces a daily CSV of per-region
//! precipitation means. This crate folds it into calendar-month means and
//! standardizes each region's monthly series against its own history
//! ((x − mean) / std). The result is a pure lookup keyed exactly like
//! sub-events and panel cells; a missing key is a data outcome the panel
//! records with its missing-climate marker.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use flood_panel_events_models::MonthKey;
use serde::Deserialize;
use thiserror::Error;

/// Error type for climate artifact loading.
#[derive(Debug, Error)]
pub enum ClimateError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// One row of the daily climate artifact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyPrecipRow {
    /// Level-1 region code.
    pub adm1_code: i64,
    /// Observation date.
    pub date: NaiveDate,
    /// Daily precipitation mean over the region; empty cells are skipped.
    pub precipitation_mean: Option<f64>,
}

/// Per-region standardized monthly precipitation series.
#[derive(Debug, Clone, Default)]
pub struct ClimateSeries {
    anomalies: BTreeMap<(i64, MonthKey), f64>,
}

impl ClimateSeries {
    /// Builds the series from a daily artifact reader.
    ///
    /// Daily values are averaged per (region, month); each region's monthly
    /// means are then standardized against that region's full series using
    /// the sample standard deviation. Regions with fewer than two months of
    /// data, or a degenerate (zero-variance) series, produce no anomalies
    /// and are logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSV fails to read or deserialize.
    pub fn from_daily_reader<R: Read>(reader: R) -> Result<Self, ClimateError> {
        // (region, month) -> (sum, day count)
        let mut sums: BTreeMap<(i64, MonthKey), (f64, u32)> = BTreeMap::new();
        let mut reader = csv::Reader::from_reader(reader);
        for row in reader.deserialize() {
            let row: DailyPrecipRow = row?;
            let Some(value) = row.precipitation_mean else {
                continue;
            };
            let key = (
                row.adm1_code,
                MonthKey::new(row.date.year(), row.date.month()),
            );
            let entry = sums.entry(key).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        let mut monthly: BTreeMap<i64, Vec<(MonthKey, f64)>> = BTreeMap::new();
        for ((region, month), (sum, count)) in sums {
            monthly
                .entry(region)
                .or_default()
                .push((month, sum / f64::from(count)));
        }

        let mut anomalies: BTreeMap<(i64, MonthKey), f64> = BTreeMap::new();
        let mut degenerate = 0_usize;
        for (region, series) in &monthly {
            let Some((mean, std)) = series_stats(series) else {
                degenerate += 1;
                log::debug!("Region {region} has a degenerate precipitation series; no anomalies");
                continue;
            };
            for &(month, value) in series {
                anomalies.insert((*region, month), (value - mean) / std);
            }
        }

        if degenerate > 0 {
            log::warn!("{degenerate} regions had too little climate history to standardize");
        }
        log::info!(
            "Built climate series: {} region-months across {} regions",
            anomalies.len(),
            monthly.len()
        );

        Ok(Self { anomalies })
    }

    /// Builds the series from a daily artifact file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn from_daily_path(path: &Path) -> Result<Self, ClimateError> {
        Self::from_daily_reader(std::fs::File::open(path)?)
    }

    /// Looks up the standardized anomaly for a region-month.
    #[must_use]
    pub fn anomaly(&self, region_code: i64, month: MonthKey) -> Option<f64> {
        self.anomalies.get(&(region_code, month)).copied()
    }

    /// Returns the number of keyed anomalies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    /// Returns whether the series is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Mean and sample standard deviation of a monthly series; `None` when the
/// series cannot be standardized.
fn series_stats(series: &[(MonthKey, f64)]) -> Option<(f64, f64)> {
    if series.len() < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = series.len() as f64;
    let mean = series.iter().map(|(_, value)| value).sum::<f64>() / n;
    let variance = series
        .iter()
        .map(|(_, value)| (value - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let std = variance.sqrt();
    if std > 0.0 { Some((mean, std)) } else { None }
}
