#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Satellite severity boundary.
//!
//! The flood-extent estimator is an external collaborator: it consumes
//! sub-event identifiers (via batch lists) and produces one small CSV per
//! sub-event. This crate owns that contract end to end: the artifact store
//! and merge ([`artifact`]), the record schema, the documented-failure
//! classification, and the enrichment step that copies estimates onto
//! sub-events with the flags the estimate implies.
//!
//! Estimator unavailability is never an error here. A missing or failed
//! artifact nulls the severity fields and flags the sub-event; the row
//! proceeds.

pub mod artifact;
pub mod progress;

use std::collections::BTreeMap;
use std::sync::Arc;

use flood_panel_events_models::SubEvent;
use flood_panel_flags::QualityFlag;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use artifact::{ArtifactStore, read_merged, write_batches, write_merged};
pub use progress::{NullProgress, ProgressCallback, null_progress};

/// Error type for severity artifact I/O.
#[derive(Debug, Error)]
pub enum SeverityError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("batch size must be positive")]
    InvalidBatchSize,
}

/// One row of the severity artifact CSV.
///
/// Field names match the artifact columns exactly. `error` is empty on
/// success and carries the estimator's failure message otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRecord {
    /// Sub-event identifier the estimate belongs to.
    pub sub_event_id: String,
    /// Level-1 region code the estimator ran against.
    pub adm1_code: i64,
    /// Total population on the estimator's grid for the region.
    pub total_population: Option<f64>,
    /// Population inside the detected flood extent.
    pub flooded_population: Option<f64>,
    /// Detected flood extent in km².
    pub flooded_area: Option<f64>,
    /// Mean flood duration over flooded pixels, in days.
    pub mean_duration_days: Option<f64>,
    /// Mean count of clear observations over flooded pixels.
    pub mean_clear_views: Option<f64>,
    /// Mean clear-observation fraction over flooded pixels, 0-1.
    pub clear_fraction: Option<f64>,
    /// Estimator failure message; empty or absent on success.
    #[serde(default)]
    pub error: Option<String>,
}

impl SeverityRecord {
    /// Returns whether the estimator reported success for this row.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.as_deref().is_none_or(|message| message.trim().is_empty())
    }

    /// Classifies a failed row into its documented failure kind.
    ///
    /// Returns `None` for successful rows.
    #[must_use]
    pub fn failure(&self) -> Option<SeverityFailure> {
        if self.is_success() {
            return None;
        }
        let message = self.error.as_deref().unwrap_or_default();
        Some(SeverityFailure::classify(message))
    }
}

/// Documented estimator failure kinds, each mapped to a catalog flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SeverityFailure {
    /// No usable satellite image for the region-month.
    ImageUnavailable,
    /// The population grid had no coverage for the region.
    PopulationGridUnavailable,
    /// The image and population grids could not be aligned.
    GridMismatch,
}

impl SeverityFailure {
    /// Classifies an estimator failure message.
    ///
    /// Messages come from an external tool, so matching is substring-based
    /// and deliberately loose. Unrecognized messages are treated as a
    /// missing image, the dominant failure in practice, and logged.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("population") {
            return Self::PopulationGridUnavailable;
        }
        if lower.contains("grid") || lower.contains("align") || lower.contains("resolution") {
            return Self::GridMismatch;
        }
        if !lower.contains("image") && !lower.contains("no data") {
            log::debug!("Unclassified estimator failure treated as missing image: {message:?}");
        }
        Self::ImageUnavailable
    }

    /// Returns the catalog flag recording this failure.
    #[must_use]
    pub const fn flag(self) -> QualityFlag {
        match self {
            Self::ImageUnavailable => QualityFlag::ImageUnavailable,
            Self::PopulationGridUnavailable => QualityFlag::PopulationGridUnavailable,
            Self::GridMismatch => QualityFlag::GridMismatch,
        }
    }
}

/// Copies severity estimates onto sub-events, flagging as it goes.
///
/// Per sub-event: a missing artifact row flags IMAGE_UNAVAILABLE and leaves
/// the fields null; a failed row flags its classified failure; a successful
/// row copies the four severity fields and adds LOW_CLEAR_FRACTION when the
/// clear fraction is below `clear_fraction_threshold` and ZERO_FLOOD_EXTENT
/// when the detected area is zero. A zero-extent estimate is still an
/// available estimate.
pub fn apply_severity(
    sub_events: &mut [SubEvent],
    records: &BTreeMap<String, SeverityRecord>,
    clear_fraction_threshold: f64,
    progress: &Arc<dyn ProgressCallback>,
) {
    progress.set_total(sub_events.len() as u64);
    let mut unavailable = 0_usize;
    let mut failed = 0_usize;

    for sub in sub_events.iter_mut() {
        match records.get(&sub.sub_event_id) {
            None => {
                unavailable += 1;
                sub.flags.insert(QualityFlag::ImageUnavailable);
            }
            Some(record) => match record.failure() {
                Some(failure) => {
                    failed += 1;
                    sub.flags.insert(failure.flag());
                }
                None => {
                    sub.flooded_area_km2 = record.flooded_area;
                    sub.flooded_population = record.flooded_population;
                    sub.total_population = record.total_population;
                    sub.clear_fraction = record.clear_fraction;

                    if record
                        .clear_fraction
                        .is_some_and(|fraction| fraction < clear_fraction_threshold)
                    {
                        sub.flags.insert(QualityFlag::LowClearFraction);
                    }
                    if record.flooded_area.is_some_and(|area| area <= 0.0) {
                        sub.flags.insert(QualityFlag::ZeroFloodExtent);
                    }
                }
            },
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    log::info!(
        "Applied severity estimates to {} sub-events ({unavailable} missing artifacts, {failed} estimator failures)",
        sub_events.len()
    );
}
