#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Data-quality flag catalog for the flood panel pipeline.
//!
//! Every row of the event-level dataset carries a set of flags recording the
//! data limitations and processing paths that applied to it (imputed dates,
//! missing satellite imagery, the allocation rule used, and so on). The
//! catalog is closed: codes outside 1-15 are rejected everywhere, so a typo
//! in an upstream artifact surfaces as an error instead of an invented flag.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// One entry in the closed data-quality flag catalog.
///
/// Codes 1-2 originate in temporal expansion, 7 in location matching, 9-11 on
/// the exclusion path, 3-6, 8 and 12 from the satellite severity estimate,
/// and 13-15 from impact allocation.
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
pub enum QualityFlag {
    /// Code 1: start day absent in the raw record, imputed to day 1
    StartDayImputed = 1,
    /// Code 2: end day absent in the raw record, imputed to the last day of
    /// the month
    EndDayImputed = 2,
    /// Code 3: slice starts before satellite coverage begins
    PreSatelliteEra = 3,
    /// Code 4: no satellite image product for the region-month
    ImageUnavailable = 4,
    /// Code 5: no population grid for the region-year
    PopulationGridUnavailable = 5,
    /// Code 6: satellite and population grids failed to align
    GridMismatch = 6,
    /// Code 7: location text matched more than one region
    RegionAmbiguous = 7,
    /// Code 8: clear-observation fraction below the configured threshold
    LowClearFraction = 8,
    /// Code 9: excluded, start/end year or month missing or range invalid
    MissingDates = 9,
    /// Code 10: excluded, no administrative region could be resolved
    UnmatchedRegion = 10,
    /// Code 11: excluded for a reason outside codes 9 and 10
    ExcludedOther = 11,
    /// Code 12: severity estimate present with zero flooded area
    ZeroFloodExtent = 12,
    /// Code 13: impacts distributed by equal split
    EqualSplitAllocation = 13,
    /// Code 14: impacts distributed by flooded-population weights
    PopulationWeightedAllocation = 14,
    /// Code 15: single sub-event, reported impacts passed through unchanged
    ReportedPassthrough = 15,
}

impl QualityFlag {
    /// Returns the numeric catalog code of this flag.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Creates a flag from its numeric catalog code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not in the range 1-15.
    pub const fn from_code(code: u8) -> Result<Self, InvalidFlagCodeError> {
        match code {
            1 => Ok(Self::StartDayImputed),
            2 => Ok(Self::EndDayImputed),
            3 => Ok(Self::PreSatelliteEra),
            4 => Ok(Self::ImageUnavailable),
            5 => Ok(Self::PopulationGridUnavailable),
            6 => Ok(Self::GridMismatch),
            7 => Ok(Self::RegionAmbiguous),
            8 => Ok(Self::LowClearFraction),
            9 => Ok(Self::MissingDates),
            10 => Ok(Self::UnmatchedRegion),
            11 => Ok(Self::ExcludedOther),
            12 => Ok(Self::ZeroFloodExtent),
            13 => Ok(Self::EqualSplitAllocation),
            14 => Ok(Self::PopulationWeightedAllocation),
            15 => Ok(Self::ReportedPassthrough),
            _ => Err(InvalidFlagCodeError { code }),
        }
    }

    /// Returns the human-readable definition recorded in the flag catalog.
    #[must_use]
    pub const fn definition(self) -> &'static str {
        match self {
            Self::StartDayImputed => "Start day missing from the raw record; imputed to the first day of the start month",
            Self::EndDayImputed => "End day missing from the raw record; imputed to the last day of the end month",
            Self::PreSatelliteEra => "Sub-event begins before the start of satellite coverage (2000-02-25); no imagery can exist",
            Self::ImageUnavailable => "No satellite image product was available for this region-month",
            Self::PopulationGridUnavailable => "No gridded population file was available for this region-year",
            Self::GridMismatch => "Satellite image and population grids had mismatched coordinates and could not be combined",
            Self::RegionAmbiguous => "A location name in the raw record matched more than one administrative region; all matches kept",
            Self::LowClearFraction => "Mean clear-observation fraction over flooded pixels fell below the configured threshold",
            Self::MissingDates => "Event excluded: start or end year/month absent, or the date range was invalid",
            Self::UnmatchedRegion => "Event excluded: no administrative region could be resolved from the raw record",
            Self::ExcludedOther => "Event excluded for a reason not covered by the missing-dates or unmatched-region codes",
            Self::ZeroFloodExtent => "Severity estimate succeeded but detected zero flooded area",
            Self::EqualSplitAllocation => "Reported impacts divided equally because no usable severity weights existed",
            Self::PopulationWeightedAllocation => "Reported impacts distributed in proportion to flooded-population estimates",
            Self::ReportedPassthrough => "Event covers a single region-month; reported impacts carried over without allocation",
        }
    }

    /// Returns all flags in catalog-code order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::StartDayImputed,
            Self::EndDayImputed,
            Self::PreSatelliteEra,
            Self::ImageUnavailable,
            Self::PopulationGridUnavailable,
            Self::GridMismatch,
            Self::RegionAmbiguous,
            Self::LowClearFraction,
            Self::MissingDates,
            Self::UnmatchedRegion,
            Self::ExcludedOther,
            Self::ZeroFloodExtent,
            Self::EqualSplitAllocation,
            Self::PopulationWeightedAllocation,
            Self::ReportedPassthrough,
        ]
    }
}

/// Error returned when attempting to create a [`QualityFlag`] from a code
/// outside the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidFlagCodeError {
    /// The invalid flag code that was provided.
    pub code: u8,
}

impl std::fmt::Display for InvalidFlagCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid flag code {}: expected 1-15", self.code)
    }
}

impl std::error::Error for InvalidFlagCodeError {}

/// Error returned when parsing a serialized flag set fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFlagSetError {
    /// A token was not a number.
    NotANumber(String),
    /// A numeric token was outside the catalog.
    InvalidCode(InvalidFlagCodeError),
}

impl std::fmt::Display for ParseFlagSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotANumber(token) => write!(f, "flag token {token:?} is not a number"),
            Self::InvalidCode(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for ParseFlagSetError {}

impl From<InvalidFlagCodeError> for ParseFlagSetError {
    fn from(err: InvalidFlagCodeError) -> Self {
        Self::InvalidCode(err)
    }
}

/// An ordered, duplicate-free set of [`QualityFlag`]s attached to one row.
///
/// Flags accumulate across pipeline stages and are never removed once set.
/// The wire format is the ascending semicolon-separated code list used by the
/// historical datasets, e.g. `"1; 2; 12"`; the empty set serializes to the
/// empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet(BTreeSet<QualityFlag>);

impl FlagSet {
    /// Creates an empty flag set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Adds a flag; returns `true` if it was not already present.
    pub fn insert(&mut self, flag: QualityFlag) -> bool {
        self.0.insert(flag)
    }

    /// Unions another set into this one. Accumulation only; nothing is ever
    /// removed.
    pub fn extend_from(&mut self, other: &Self) {
        self.0.extend(other.0.iter().copied());
    }

    /// Returns whether the given flag is present.
    #[must_use]
    pub fn contains(&self, flag: QualityFlag) -> bool {
        self.0.contains(&flag)
    }

    /// Returns whether no flags are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of flags set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates flags in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = QualityFlag> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<QualityFlag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = QualityFlag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for FlagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for flag in &self.0 {
            if first {
                first = false;
            } else {
                write!(f, "; ")?;
            }
            write!(f, "{}", flag.code())?;
        }
        Ok(())
    }
}

impl FromStr for FlagSet {
    type Err = ParseFlagSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = BTreeSet::new();
        for token in s.split(';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let code: u8 = token
                .parse()
                .map_err(|_| ParseFlagSetError::NotANumber(token.to_string()))?;
            set.insert(QualityFlag::from_code(code)?);
        }
        Ok(Self(set))
    }
}

impl Serialize for FlagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FlagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One row of the exported flag catalog CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCatalogEntry {
    /// Numeric catalog code (1-15).
    pub code: u8,
    /// SCREAMING_SNAKE_CASE flag name.
    pub name: String,
    /// Human-readable definition.
    pub definition: String,
}

/// Returns the full catalog in code order, one entry per flag.
#[must_use]
pub fn catalog() -> Vec<FlagCatalogEntry> {
    QualityFlag::all()
        .iter()
        .map(|flag| FlagCatalogEntry {
            code: flag.code(),
            name: flag.to_string(),
            definition: flag.definition().to_string(),
        })
        .collect()
}

/// Occurrence counts for one flag across a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagCounts {
    /// Distinct sub-events carrying the flag.
    pub sub_events: usize,
    /// Distinct raw events with at least one flagged sub-event.
    pub raw_events: usize,
}

/// Counts flag occurrences over `(flag set, raw event id)` rows.
///
/// Each input row is one sub-event; the raw-event count for a flag is the
/// number of distinct raw identifiers among its flagged rows.
pub fn summarize<'a, I>(rows: I) -> BTreeMap<QualityFlag, FlagCounts>
where
    I: IntoIterator<Item = (&'a FlagSet, &'a str)>,
{
    let mut raw_ids: BTreeMap<QualityFlag, BTreeSet<&str>> = BTreeMap::new();
    let mut counts: BTreeMap<QualityFlag, FlagCounts> = BTreeMap::new();

    for (flags, raw_id) in rows {
        for flag in flags.iter() {
            let entry = counts.entry(flag).or_default();
            entry.sub_events += 1;
            raw_ids.entry(flag).or_default().insert(raw_id);
        }
    }

    for (flag, ids) in raw_ids {
        if let Some(entry) = counts.get_mut(&flag) {
            entry.raw_events = ids.len();
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_from_code_roundtrip() {
        for code in 1..=15u8 {
            let flag = QualityFlag::from_code(code).unwrap();
            assert_eq!(flag.code(), code);
        }
        assert!(QualityFlag::from_code(0).is_err());
        assert!(QualityFlag::from_code(16).is_err());
    }

    #[test]
    fn catalog_covers_every_code_once() {
        let entries = catalog();
        assert_eq!(entries.len(), 15);
        for (idx, entry) in entries.iter().enumerate() {
            assert_eq!(entry.code, u8::try_from(idx).unwrap() + 1);
            assert!(!entry.definition.is_empty());
        }
    }

    #[test]
    fn flag_set_displays_sorted_codes() {
        let mut flags = FlagSet::new();
        flags.insert(QualityFlag::ZeroFloodExtent);
        flags.insert(QualityFlag::StartDayImputed);
        flags.insert(QualityFlag::EndDayImputed);
        assert_eq!(flags.to_string(), "1; 2; 12");
    }

    #[test]
    fn flag_set_parses_historical_format() {
        let flags: FlagSet = "1; 2; 12".parse().unwrap();
        assert!(flags.contains(QualityFlag::StartDayImputed));
        assert!(flags.contains(QualityFlag::EndDayImputed));
        assert!(flags.contains(QualityFlag::ZeroFloodExtent));
        assert_eq!(flags.len(), 3);
    }

    #[test]
    fn flag_set_parses_empty_and_ragged_input() {
        let empty: FlagSet = "".parse().unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.to_string(), "");

        let ragged: FlagSet = " 14 ;; 3".parse().unwrap();
        assert_eq!(ragged.to_string(), "3; 14");
    }

    #[test]
    fn flag_set_rejects_unknown_codes() {
        assert!(matches!(
            "1; 99".parse::<FlagSet>(),
            Err(ParseFlagSetError::InvalidCode(InvalidFlagCodeError { code: 99 }))
        ));
        assert!(matches!(
            "one".parse::<FlagSet>(),
            Err(ParseFlagSetError::NotANumber(_))
        ));
    }

    #[test]
    fn extend_from_accumulates_without_removal() {
        let mut first: FlagSet = "1; 14".parse().unwrap();
        let second: FlagSet = "8; 14".parse().unwrap();
        first.extend_from(&second);
        assert_eq!(first.to_string(), "1; 8; 14");
    }

    #[test]
    fn summarize_counts_sub_and_raw_events() {
        let a: FlagSet = "14".parse().unwrap();
        let b: FlagSet = "14".parse().unwrap();
        let c: FlagSet = "13".parse().unwrap();
        let rows = vec![
            (&a, "2011-0131-CAN"),
            (&b, "2011-0131-CAN"),
            (&c, "2012-0004-IND"),
        ];

        let summary = summarize(rows);
        let pop = summary[&QualityFlag::PopulationWeightedAllocation];
        assert_eq!(pop.sub_events, 2);
        assert_eq!(pop.raw_events, 1);
        let equal = summary[&QualityFlag::EqualSplitAllocation];
        assert_eq!(equal.sub_events, 1);
        assert_eq!(equal.raw_events, 1);
    }
}
