#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Flood event domain types shared across the flood panel pipeline.
//!
//! A [`RawEvent`] is one aggregate disaster report as archived. Disaggregation
//! splits it into [`SubEvent`]s, one per administrative-region × month slice,
//! which later stages enrich with satellite severity fields, allocated
//! impacts, and quality flags from [`flood_panel_flags`]. Events that cannot
//! be disaggregated become [`ExcludedEvent`] records instead of disappearing.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use flood_panel_flags::{FlagSet, QualityFlag};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// A calendar month key, the temporal unit of disaggregation and the panel.
///
/// Orders chronologically and renders in the historical `MM-YYYY` wire format
/// (e.g. `"05-2011"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 1-12.
    pub month: u32,
}

impl MonthKey {
    /// Creates a month key without validation; `month` must be 1-12.
    #[must_use]
    pub const fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Returns the month containing the given date.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Returns the chronologically next month.
    #[must_use]
    pub const fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{}", self.month, self.year)
    }
}

/// Error returned when parsing a [`MonthKey`] from its `MM-YYYY` form fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMonthKeyError {
    /// The unparseable input.
    pub input: String,
}

impl std::fmt::Display for ParseMonthKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid month key {:?}: expected MM-YYYY", self.input)
    }
}

impl std::error::Error for ParseMonthKeyError {}

impl FromStr for MonthKey {
    type Err = ParseMonthKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMonthKeyError {
            input: s.to_string(),
        };
        let (month, year) = s.split_once('-').ok_or_else(err)?;
        let month: u32 = month.trim().parse().map_err(|_| err())?;
        let year: i32 = year.trim().parse().map_err(|_| err())?;
        if !(1..=12).contains(&month) {
            return Err(err());
        }
        Ok(Self { year, month })
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One aggregate disaster report as archived, immutable once loaded.
///
/// Dates arrive as separate year/month/day fields because the archive records
/// them with independent completeness; damage figures are already scaled to
/// US$ (not thousands) and CPI-corrected by preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// External archive identifier, e.g. `"2011-0131-CAN"`.
    pub id: String,
    /// Event name if the archive recorded one.
    pub event_name: Option<String>,
    /// Country name as archived.
    pub country: String,
    /// ISO3 country code.
    pub iso3: String,
    /// Free-text location description; `None` when absent.
    pub location: Option<String>,
    /// Structured admin-units JSON string as archived; `None` when absent.
    pub admin_units: Option<String>,
    /// Disaster type, e.g. `"Flood"`.
    pub disaster_type: String,
    /// Disaster subtype, e.g. `"Riverine flood"`.
    pub disaster_subtype: Option<String>,
    /// Start date components; day (and in defective rows, month) may be absent.
    pub start_year: Option<i32>,
    /// Start month, 1-12 when present.
    pub start_month: Option<u32>,
    /// Start day of month when present.
    pub start_day: Option<u32>,
    /// End date components.
    pub end_year: Option<i32>,
    /// End month, 1-12 when present.
    pub end_month: Option<u32>,
    /// End day of month when present.
    pub end_day: Option<u32>,
    /// Reported total damage, inflation-adjusted US$.
    pub total_damage_usd: Option<f64>,
    /// Reported total affected population.
    pub total_affected: Option<f64>,
}

/// Unique key of a sub-event: original event × region × calendar month.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubEventKey {
    /// Raw event identifier.
    pub raw_event_id: String,
    /// Administrative level-1 region code.
    pub region_code: i64,
    /// Calendar month of the slice.
    pub month: MonthKey,
}

/// One region-month slice of a raw event.
///
/// Created by the disaggregator with severity, allocation, and normalized
/// fields unset; enriched stage by stage; one row of the event-level output.
/// A `None` in any enriched field is always accompanied by a flag explaining
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubEvent {
    /// Minted identifier, `{MM}-{rawEventId}-{regionCode}`.
    pub sub_event_id: String,
    /// Identifier of the originating raw event.
    pub raw_event_id: String,
    /// Administrative level-1 region code.
    pub region_code: i64,
    /// Region name from the gazetteer.
    pub region_name: String,
    /// Country name inherited from the raw event.
    pub country: String,
    /// ISO3 country code inherited from the raw event.
    pub iso3: String,
    /// Disaster subtype inherited from the raw event.
    pub disaster_subtype: Option<String>,
    /// Calendar month of this slice.
    pub month: MonthKey,
    /// First day of the slice, clipped to the month and the event range.
    pub slice_start: NaiveDate,
    /// Last day of the slice, clipped likewise.
    pub slice_end: NaiveDate,
    /// Inclusive day count of the slice.
    pub duration_days: i64,
    /// Satellite-estimated flooded area in km²; `None` until enriched or when
    /// the estimate was unavailable.
    pub flooded_area_km2: Option<f64>,
    /// Satellite-estimated population inside the flood extent.
    pub flooded_population: Option<f64>,
    /// Total regional population from the same grid.
    pub total_population: Option<f64>,
    /// Mean clear-observation fraction over flooded pixels, 0-1.
    pub clear_fraction: Option<f64>,
    /// This sub-event's share of the reported impacts; `None` outside the
    /// population-weighted path.
    pub allocation_weight: Option<f64>,
    /// Allocated damage in US$.
    pub allocated_damage_usd: Option<f64>,
    /// Allocated affected population.
    pub allocated_affected: Option<f64>,
    /// Allocated damage as a percentage of region-year GDP.
    pub damage_gdp_pct: Option<f64>,
    /// Allocated affected as a percentage of region population.
    pub affected_pop_pct: Option<f64>,
    /// Flooded area as a percentage of region area.
    pub flooded_area_pct: Option<f64>,
    /// Accumulated quality flags.
    pub flags: FlagSet,
}

impl SubEvent {
    /// Returns this sub-event's unique key.
    #[must_use]
    pub fn key(&self) -> SubEventKey {
        SubEventKey {
            raw_event_id: self.raw_event_id.clone(),
            region_code: self.region_code,
            month: self.month,
        }
    }

    /// Returns the panel key this sub-event maps to.
    #[must_use]
    pub const fn panel_key(&self) -> (i64, MonthKey) {
        (self.region_code, self.month)
    }
}

/// How an aggregate reported impact was distributed across sub-events.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationMethod {
    /// Single sub-event; reported values carried over unchanged.
    Passthrough,
    /// Distributed in proportion to flooded-population estimates.
    PopulationWeighted,
    /// Distributed equally because no usable weights existed.
    EqualSplit,
}

impl AllocationMethod {
    /// Returns the quality flag recording this allocation path.
    #[must_use]
    pub const fn flag(self) -> QualityFlag {
        match self {
            Self::Passthrough => QualityFlag::ReportedPassthrough,
            Self::PopulationWeighted => QualityFlag::PopulationWeightedAllocation,
            Self::EqualSplit => QualityFlag::EqualSplitAllocation,
        }
    }
}

/// Why a raw event was excluded before disaggregation output.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionReason {
    /// Start or end year/month absent from the raw record.
    MissingDates,
    /// End date precedes start date after imputation.
    InvertedDateRange,
    /// Neither structured admin units nor location text resolved to a region.
    UnmatchedLocation,
    /// Any other cause.
    Other,
}

impl ExclusionReason {
    /// Returns the catalog flag recording this exclusion.
    #[must_use]
    pub const fn flag(self) -> QualityFlag {
        match self {
            Self::MissingDates | Self::InvertedDateRange => QualityFlag::MissingDates,
            Self::UnmatchedLocation => QualityFlag::UnmatchedRegion,
            Self::Other => QualityFlag::ExcludedOther,
        }
    }
}

/// One row of the exclusion log: a raw event that produced no sub-events.
///
/// Exclusions are data outcomes, not errors; every raw event that vanishes
/// from the event-level table is accounted for here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedEvent {
    /// Identifier of the excluded raw event.
    pub raw_event_id: String,
    /// Why it was excluded.
    pub reason: ExclusionReason,
    /// Human-readable context, e.g. the unmatched location text.
    pub detail: String,
    /// Catalog flags applying to the exclusion (9, 10, or 11).
    pub flags: FlagSet,
}

impl ExcludedEvent {
    /// Builds an exclusion record with the flag implied by the reason.
    #[must_use]
    pub fn new(raw_event_id: impl Into<String>, reason: ExclusionReason, detail: impl Into<String>) -> Self {
        let mut flags = FlagSet::new();
        flags.insert(reason.flag());
        Self {
            raw_event_id: raw_event_id.into(),
            reason,
            detail: detail.into(),
            flags,
        }
    }
}
