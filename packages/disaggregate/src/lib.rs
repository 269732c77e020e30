#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Expands raw flood events into region-month sub-events.
//!
//! Disaggregation is a pure function of the raw event table and the
//! gazetteer: resolve each event's date window (imputing missing days),
//! resolve its regions, then cross the per-month slices with the matched
//! regions. Every raw event either contributes sub-events or lands in the
//! exclusion log with a reason; nothing is silently dropped.
//!
//! Severity, allocation, and normalized fields are left unset here and
//! filled by later stages.

pub mod dates;
pub mod months;

use std::collections::BTreeSet;

use chrono::NaiveDate;
use flood_panel_events_models::{
    ExcludedEvent, ExclusionReason, MonthKey, RawEvent, SubEvent, SubEventKey,
};
use flood_panel_flags::{FlagSet, QualityFlag};
use flood_panel_gazetteer::Gazetteer;
use thiserror::Error;

use crate::dates::{DateResolution, resolve_dates};
use crate::months::month_span;

/// Error type for disaggregation.
#[derive(Debug, Error)]
pub enum DisaggregateError {
    #[error("invalid calendar month {month} in year {year}")]
    InvalidDate { year: i32, month: u32 },
}

/// Output of expanding a batch of raw events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    /// Sub-events ordered by (raw event, region, month).
    pub sub_events: Vec<SubEvent>,
    /// Raw events that produced no sub-events, with reasons.
    pub excluded: Vec<ExcludedEvent>,
}

/// Mints a sub-event identifier.
///
/// The raw event id already carries year and sequence, so prefixing the
/// month and suffixing the region code yields a globally unique id in the
/// historical shape, e.g. `"06-2011-0131-CAN-825"`.
#[must_use]
pub fn mint_sub_event_id(month: MonthKey, raw_event_id: &str, region_code: i64) -> String {
    format!("{:02}-{raw_event_id}-{region_code}", month.month)
}

/// Expands raw events into region-month sub-events.
///
/// Date or location failures route the event to the exclusion log. Day
/// imputation, ambiguous name matches, and slices starting before
/// `satellite_era_start` are recorded as flags on the affected sub-events.
///
/// # Errors
///
/// Returns an error only if date arithmetic leaves the calendar's
/// representable range.
pub fn expand_events(
    events: &[RawEvent],
    gazetteer: &Gazetteer,
    satellite_era_start: NaiveDate,
) -> Result<Expansion, DisaggregateError> {
    let mut expansion = Expansion::default();
    let mut seen: BTreeSet<SubEventKey> = BTreeSet::new();

    for event in events {
        expand_event(event, gazetteer, satellite_era_start, &mut seen, &mut expansion)?;
    }

    expansion.sub_events.sort_by(|a, b| {
        (a.raw_event_id.as_str(), a.region_code, a.month)
            .cmp(&(b.raw_event_id.as_str(), b.region_code, b.month))
    });

    log::info!(
        "Expanded {} raw events into {} sub-events ({} excluded)",
        events.len(),
        expansion.sub_events.len(),
        expansion.excluded.len()
    );

    Ok(expansion)
}

fn expand_event(
    event: &RawEvent,
    gazetteer: &Gazetteer,
    satellite_era_start: NaiveDate,
    seen: &mut BTreeSet<SubEventKey>,
    expansion: &mut Expansion,
) -> Result<(), DisaggregateError> {
    let dates = match resolve_dates(event)? {
        DateResolution::Resolved(dates) => dates,
        DateResolution::Missing { detail } => {
            expansion.excluded.push(ExcludedEvent::new(
                &event.id,
                ExclusionReason::MissingDates,
                detail,
            ));
            return Ok(());
        }
        DateResolution::Inverted { start, end } => {
            expansion.excluded.push(ExcludedEvent::new(
                &event.id,
                ExclusionReason::InvertedDateRange,
                format!("end {end} precedes start {start}"),
            ));
            return Ok(());
        }
    };

    let matched = gazetteer.match_event(
        &event.country,
        event.admin_units.as_deref(),
        event.location.as_deref(),
    );
    if matched.is_empty() {
        let detail = if matched.unmatched.is_empty() {
            "no location information".to_string()
        } else {
            format!("unresolved: {}", matched.unmatched.join("; "))
        };
        expansion.excluded.push(ExcludedEvent::new(
            &event.id,
            ExclusionReason::UnmatchedLocation,
            detail,
        ));
        return Ok(());
    }

    let mut event_flags = FlagSet::new();
    if dates.start_day_imputed {
        event_flags.insert(QualityFlag::StartDayImputed);
    }
    if dates.end_day_imputed {
        event_flags.insert(QualityFlag::EndDayImputed);
    }
    if matched.ambiguous {
        event_flags.insert(QualityFlag::RegionAmbiguous);
    }

    for slice in month_span(dates.start, dates.end)? {
        let mut slice_flags = event_flags.clone();
        if slice.slice_start < satellite_era_start {
            slice_flags.insert(QualityFlag::PreSatelliteEra);
        }

        for region in &matched.regions {
            let key = SubEventKey {
                raw_event_id: event.id.clone(),
                region_code: region.code,
                month: slice.month,
            };
            if !seen.insert(key) {
                log::warn!(
                    "Duplicate sub-event for event {} region {} month {}; keeping first",
                    event.id,
                    region.code,
                    slice.month
                );
                continue;
            }

            expansion.sub_events.push(SubEvent {
                sub_event_id: mint_sub_event_id(slice.month, &event.id, region.code),
                raw_event_id: event.id.clone(),
                region_code: region.code,
                region_name: region.name.clone(),
                country: event.country.clone(),
                iso3: event.iso3.clone(),
                disaster_subtype: event.disaster_subtype.clone(),
                month: slice.month,
                slice_start: slice.slice_start,
                slice_end: slice.slice_end,
                duration_days: slice.duration_days(),
                flooded_area_km2: None,
                flooded_population: None,
                total_population: None,
                clear_fraction: None,
                allocation_weight: None,
                allocated_damage_usd: None,
                allocated_affected: None,
                damage_gdp_pct: None,
                affected_pop_pct: None,
                flooded_area_pct: None,
                flags: slice_flags.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flood_panel_gazetteer::AliasConfig;

    const ADMIN1: &str = "\
adm1_code,adm1_name,adm0_code,adm0_name,iso3,area_km2
825,Manitoba,46,Canada,CAN,649950.0
838,Saskatchewan,46,Canada,CAN,651900.0
2599,Northern,221,Sierra Leone,SLE,
2600,Northern,221,Sierra Leone,SLE,
";

    fn gazetteer() -> Gazetteer {
        Gazetteer::from_readers(
            ADMIN1.as_bytes(),
            None::<&[u8]>,
            AliasConfig::default(),
        )
        .unwrap()
    }

    fn era() -> NaiveDate {
        NaiveDate::from_ymd_opt(2000, 2, 25).unwrap()
    }

    fn event(id: &str) -> RawEvent {
        RawEvent {
            id: id.to_string(),
            event_name: None,
            country: "Canada".to_string(),
            iso3: "CAN".to_string(),
            location: Some("Manitoba; Saskatchewan".to_string()),
            admin_units: None,
            disaster_type: "Flood".to_string(),
            disaster_subtype: Some("Riverine flood".to_string()),
            start_year: Some(2011),
            start_month: Some(6),
            start_day: Some(25),
            end_year: Some(2011),
            end_month: Some(7),
            end_day: Some(3),
            total_damage_usd: Some(900_000_000.0),
            total_affected: None,
        }
    }

    #[test]
    fn crosses_months_with_regions() {
        let expansion = expand_events(&[event("2011-0131-CAN")], &gazetteer(), era()).unwrap();
        assert!(expansion.excluded.is_empty());
        assert_eq!(expansion.sub_events.len(), 4);

        let ids: Vec<&str> = expansion
            .sub_events
            .iter()
            .map(|sub| sub.sub_event_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec![
                "06-2011-0131-CAN-825",
                "07-2011-0131-CAN-825",
                "06-2011-0131-CAN-838",
                "07-2011-0131-CAN-838",
            ]
        );
    }

    #[test]
    fn slices_carry_clipped_durations() {
        let expansion = expand_events(&[event("2011-0131-CAN")], &gazetteer(), era()).unwrap();
        let june = &expansion.sub_events[0];
        let july = &expansion.sub_events[1];
        assert_eq!(june.duration_days, 6);
        assert_eq!(july.duration_days, 3);
        assert_eq!(june.month, MonthKey::new(2011, 6));
        assert_eq!(july.month, MonthKey::new(2011, 7));
    }

    #[test]
    fn enrichment_fields_start_unset() {
        let expansion = expand_events(&[event("2011-0131-CAN")], &gazetteer(), era()).unwrap();
        let sub = &expansion.sub_events[0];
        assert!(sub.flooded_area_km2.is_none());
        assert!(sub.allocation_weight.is_none());
        assert!(sub.allocated_damage_usd.is_none());
        assert!(sub.flags.is_empty());
    }

    #[test]
    fn imputed_days_flag_every_sub_event() {
        let mut raw = event("2011-0132-CAN");
        raw.start_day = None;
        raw.end_day = None;
        let expansion = expand_events(&[raw], &gazetteer(), era()).unwrap();
        for sub in &expansion.sub_events {
            assert!(sub.flags.contains(QualityFlag::StartDayImputed));
            assert!(sub.flags.contains(QualityFlag::EndDayImputed));
        }
    }

    #[test]
    fn slices_starting_before_satellite_era_are_flagged() {
        let mut raw = event("2000-0001-CAN");
        raw.start_year = Some(2000);
        raw.start_month = Some(2);
        raw.start_day = Some(10);
        raw.end_year = Some(2000);
        raw.end_month = Some(3);
        raw.end_day = Some(5);
        let expansion = expand_events(&[raw], &gazetteer(), era()).unwrap();
        let by_month: Vec<(MonthKey, bool)> = expansion
            .sub_events
            .iter()
            .map(|sub| (sub.month, sub.flags.contains(QualityFlag::PreSatelliteEra)))
            .collect();
        // The February slice starts 2000-02-10, before coverage begins.
        assert!(by_month.contains(&(MonthKey::new(2000, 2), true)));
        assert!(by_month.contains(&(MonthKey::new(2000, 3), false)));
    }

    #[test]
    fn ambiguous_names_flag_every_candidate() {
        let mut raw = event("2011-0200-SLE");
        raw.country = "Sierra Leone".to_string();
        raw.iso3 = "SLE".to_string();
        raw.location = Some("Northern".to_string());
        let expansion = expand_events(&[raw], &gazetteer(), era()).unwrap();
        let codes: BTreeSet<i64> = expansion
            .sub_events
            .iter()
            .map(|sub| sub.region_code)
            .collect();
        assert_eq!(codes, BTreeSet::from([2599, 2600]));
        for sub in &expansion.sub_events {
            assert!(sub.flags.contains(QualityFlag::RegionAmbiguous));
        }
    }

    #[test]
    fn missing_dates_route_to_exclusion_log() {
        let mut raw = event("2011-0133-CAN");
        raw.start_year = None;
        let expansion = expand_events(&[raw], &gazetteer(), era()).unwrap();
        assert!(expansion.sub_events.is_empty());
        assert_eq!(expansion.excluded.len(), 1);
        assert_eq!(expansion.excluded[0].reason, ExclusionReason::MissingDates);
        assert_eq!(expansion.excluded[0].detail, "start year");
    }

    #[test]
    fn unmatched_location_routes_to_exclusion_log() {
        let mut raw = event("2011-0134-CAN");
        raw.location = Some("Atlantis".to_string());
        let expansion = expand_events(&[raw], &gazetteer(), era()).unwrap();
        assert!(expansion.sub_events.is_empty());
        let excluded = &expansion.excluded[0];
        assert_eq!(excluded.reason, ExclusionReason::UnmatchedLocation);
        assert!(excluded.detail.contains("Atlantis"));
    }

    #[test]
    fn inverted_range_routes_to_exclusion_log() {
        let mut raw = event("2011-0135-CAN");
        raw.end_year = Some(2010);
        let expansion = expand_events(&[raw], &gazetteer(), era()).unwrap();
        assert_eq!(
            expansion.excluded[0].reason,
            ExclusionReason::InvertedDateRange
        );
    }

    #[test]
    fn duplicate_raw_events_keep_first() {
        let expansion =
            expand_events(&[event("2011-0131-CAN"), event("2011-0131-CAN")], &gazetteer(), era())
                .unwrap();
        assert_eq!(expansion.sub_events.len(), 4);
    }
}
