#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Balanced region-month panel assembly.
//!
//! The panel is the full Cartesian grid of the region universe × every
//! month of the configured year range. Every region gets exactly
//! `12 × years` rows regardless of flood history; sub-events fold into
//! their matching cells; climate joins identically everywhere; and missing
//! normalized impacts are imputed from the immutable percentile tables in
//! [`fills`], with a marker on every imputed value. No cell carries an
//! unexplained null.

pub mod fills;
pub mod quantile;

use std::collections::{BTreeMap, BTreeSet};

use flood_panel_climate::ClimateSeries;
use flood_panel_events_models::{MonthKey, SubEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fills::{FillKind, FillLevels, FillTable, ImpactField};
pub use quantile::{quantile_linear, round5};

/// Error type for panel assembly.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("invalid year range {start}..={end}")]
    InvalidYearRange { start: i32, end: i32 },
}

/// One region of the panel universe.
///
/// The universe comes from the gazetteer catalog, not from flood history;
/// regions that never flooded still get their full complement of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelRegion {
    /// Level-1 region code.
    pub code: i64,
    /// Region name.
    pub name: String,
    /// Country name, used for the fixed-effect keys.
    pub country: String,
    /// ISO3 country code, used for fill-table fallback.
    pub iso3: Option<String>,
}

/// One row of the balanced panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelCell {
    /// Level-1 region code.
    pub region_code: i64,
    /// Region name.
    pub region_name: String,
    /// Country name.
    pub country: String,
    /// ISO3 country code when the catalog provides one.
    pub iso3: Option<String>,
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 1-12.
    pub month: u32,
    /// Whether any sub-event maps to this cell.
    pub flood_event: bool,
    /// Number of sub-events at this cell.
    pub event_count: u32,
    /// Longest slice duration among the cell's sub-events; 0 without one.
    pub max_duration_days: i64,
    /// Summed allocated damage; no-event cells hold 0 as reported history.
    pub allocated_damage_usd: f64,
    /// Summed allocated affected population; 0 without an event.
    pub allocated_affected: f64,
    /// Damage over GDP, percent; observed sum or imputed.
    pub damage_gdp_pct: Option<f64>,
    /// Affected over population, percent; observed sum or imputed.
    pub affected_pop_pct: Option<f64>,
    /// Flooded area over region area, percent; observed sum or imputed.
    pub flooded_area_pct: Option<f64>,
    /// Whether `damage_gdp_pct` was imputed.
    pub damage_gdp_filled: bool,
    /// Whether `affected_pop_pct` was imputed.
    pub affected_pop_filled: bool,
    /// Whether `flooded_area_pct` was imputed.
    pub flooded_area_filled: bool,
    /// Standardized precipitation anomaly for the cell's region-month.
    pub precip_anomaly: Option<f64>,
    /// Whether the climate series had no record for this key.
    pub climate_missing: bool,
    /// Country × year fixed-effect key, `{country}_{YYYY}`.
    pub country_year: String,
    /// Country × month fixed-effect key, `{country}_{MM}`.
    pub country_month: String,
}

impl PanelCell {
    /// Returns this cell's panel key.
    #[must_use]
    pub const fn key(&self) -> (i64, MonthKey) {
        (self.region_code, MonthKey::new(self.year, self.month))
    }
}

/// Builds the balanced panel.
///
/// Rows come back ordered by (region code, year, month). Sub-events keyed
/// outside the universe or the year range are counted and logged, not
/// silently dropped.
///
/// # Errors
///
/// Returns an error if the year range is inverted.
pub fn build_panel(
    regions: &[PanelRegion],
    year_range: (i32, i32),
    sub_events: &[SubEvent],
    climate: &ClimateSeries,
    fills: &FillTable,
) -> Result<Vec<PanelCell>, PanelError> {
    let (start_year, end_year) = year_range;
    if start_year > end_year {
        return Err(PanelError::InvalidYearRange {
            start: start_year,
            end: end_year,
        });
    }

    let mut by_key: BTreeMap<(i64, MonthKey), Vec<&SubEvent>> = BTreeMap::new();
    for sub in sub_events {
        by_key.entry(sub.panel_key()).or_default().push(sub);
    }

    let universe: BTreeSet<i64> = regions.iter().map(|region| region.code).collect();
    let outside = by_key
        .keys()
        .filter(|(code, month)| {
            !universe.contains(code) || month.year < start_year || month.year > end_year
        })
        .count();
    if outside > 0 {
        log::warn!("{outside} sub-event keys fall outside the panel grid and join no cell");
    }

    let mut ordered: Vec<&PanelRegion> = regions.iter().collect();
    ordered.sort_by_key(|region| region.code);

    let year_count = usize::try_from(end_year - start_year + 1).unwrap_or(0);
    let mut cells = Vec::with_capacity(regions.len() * 12 * year_count);
    let mut unfillable = 0_usize;

    for region in ordered {
        for year in start_year..=end_year {
            for month in 1..=12 {
                let key = (region.code, MonthKey::new(year, month));
                let subs = by_key.get(&key).map_or(&[][..], Vec::as_slice);
                cells.push(build_cell(region, year, month, subs, climate, fills, &mut unfillable));
            }
        }
    }

    if unfillable > 0 {
        log::warn!("{unfillable} panel fields had no fill distribution and stay null");
    }
    log::info!(
        "Built balanced panel: {} cells ({} regions × {} months)",
        cells.len(),
        regions.len(),
        12 * year_count
    );

    Ok(cells)
}

fn build_cell(
    region: &PanelRegion,
    year: i32,
    month: u32,
    subs: &[&SubEvent],
    climate: &ClimateSeries,
    fills: &FillTable,
    unfillable: &mut usize,
) -> PanelCell {
    let flood_event = !subs.is_empty();
    let max_duration_days = subs.iter().map(|sub| sub.duration_days).max().unwrap_or(0);
    let allocated_damage_usd = subs
        .iter()
        .filter_map(|sub| sub.allocated_damage_usd)
        .sum::<f64>();
    let allocated_affected = subs
        .iter()
        .filter_map(|sub| sub.allocated_affected)
        .sum::<f64>();

    let mut resolved: BTreeMap<ImpactField, (Option<f64>, bool)> = BTreeMap::new();
    for field in ImpactField::all() {
        let observed: Vec<f64> = subs.iter().filter_map(|sub| field.observe(sub)).collect();
        let entry = if flood_event && !observed.is_empty() {
            (Some(observed.iter().sum()), false)
        } else {
            let kind = if flood_event {
                FillKind::EventMissing
            } else {
                FillKind::NoEvent
            };
            let fill = fills.fill_value(field, region.code, region.iso3.as_deref(), kind);
            if fill.is_none() {
                *unfillable += 1;
            }
            (fill, fill.is_some())
        };
        resolved.insert(field, entry);
    }

    let anomaly = climate.anomaly(region.code, MonthKey::new(year, month));

    let (damage_gdp_pct, damage_gdp_filled) = resolved[&ImpactField::DamageGdpPct];
    let (affected_pop_pct, affected_pop_filled) = resolved[&ImpactField::AffectedPopPct];
    let (flooded_area_pct, flooded_area_filled) = resolved[&ImpactField::FloodedAreaPct];

    PanelCell {
        region_code: region.code,
        region_name: region.name.clone(),
        country: region.country.clone(),
        iso3: region.iso3.clone(),
        year,
        month,
        flood_event,
        event_count: u32::try_from(subs.len()).unwrap_or(u32::MAX),
        max_duration_days,
        allocated_damage_usd,
        allocated_affected,
        damage_gdp_pct,
        affected_pop_pct,
        flooded_area_pct,
        damage_gdp_filled,
        affected_pop_filled,
        flooded_area_filled,
        precip_anomaly: anomaly,
        climate_missing: anomaly.is_none(),
        country_year: format!("{}_{year}", region.country),
        country_month: format!("{}_{month:02}", region.country),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use flood_panel_flags::FlagSet;

    fn regions() -> Vec<PanelRegion> {
        vec![
            PanelRegion {
                code: 838,
                name: "Saskatchewan".to_string(),
                country: "Canada".to_string(),
                iso3: Some("CAN".to_string()),
            },
            PanelRegion {
                code: 825,
                name: "Manitoba".to_string(),
                country: "Canada".to_string(),
                iso3: Some("CAN".to_string()),
            },
        ]
    }

    fn sub(raw_id: &str, region: i64, year: i32, month: u32) -> SubEvent {
        SubEvent {
            sub_event_id: format!("{month:02}-{raw_id}-{region}"),
            raw_event_id: raw_id.to_string(),
            region_code: region,
            region_name: String::new(),
            country: "Canada".to_string(),
            iso3: "CAN".to_string(),
            disaster_subtype: None,
            month: MonthKey::new(year, month),
            slice_start: NaiveDate::from_ymd_opt(year, month, 1).unwrap(),
            slice_end: NaiveDate::from_ymd_opt(year, month, 28).unwrap(),
            duration_days: 28,
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
            flags: FlagSet::new(),
        }
    }

    /// Four observed damage ratios in region 825, giving it (and Canada)
    /// fill pairs of q05 = 1.15 and q02 = 1.06.
    fn observed_subs() -> Vec<SubEvent> {
        [1.0, 2.0, 3.0, 4.0]
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                #[allow(clippy::cast_possible_truncation)]
                let month = index as u32 + 1;
                let mut sub = sub(&format!("2000-010{index}-CAN"), 825, 2000, month);
                sub.allocated_damage_usd = Some(value * 1000.0);
                sub.damage_gdp_pct = Some(value);
                sub
            })
            .collect()
    }

    fn fills(subs: &[SubEvent]) -> FillTable {
        FillTable::compute(subs, FillLevels::default(), 4)
    }

    #[test]
    fn panel_is_balanced_with_unique_keys() {
        let subs = observed_subs();
        let panel = build_panel(
            &regions(),
            (2000, 2001),
            &subs,
            &ClimateSeries::default(),
            &fills(&subs),
        )
        .unwrap();

        assert_eq!(panel.len(), 2 * 12 * 2);
        let keys: BTreeSet<(i64, MonthKey)> = panel.iter().map(PanelCell::key).collect();
        assert_eq!(keys.len(), panel.len());
        for sub in &subs {
            assert!(keys.contains(&sub.panel_key()));
        }
    }

    #[test]
    fn rows_are_ordered_by_region_then_time() {
        let panel = build_panel(
            &regions(),
            (2000, 2000),
            &[],
            &ClimateSeries::default(),
            &FillTable::default(),
        )
        .unwrap();
        assert_eq!(panel[0].region_code, 825);
        assert_eq!((panel[0].year, panel[0].month), (2000, 1));
        assert_eq!((panel[11].year, panel[11].month), (2000, 12));
        assert_eq!(panel[12].region_code, 825);
        assert_eq!(panel[24].region_code, 838);
    }

    #[test]
    fn event_cells_aggregate_their_sub_events() {
        let mut subs = observed_subs();
        // A second raw event in the same cell as the first.
        let mut extra = sub("2000-0200-CAN", 825, 2000, 1);
        extra.allocated_damage_usd = Some(500.0);
        extra.damage_gdp_pct = Some(0.5);
        extra.duration_days = 3;
        subs.push(extra);

        let table = fills(&subs);
        let panel = build_panel(
            &regions(),
            (2000, 2000),
            &subs,
            &ClimateSeries::default(),
            &table,
        )
        .unwrap();

        let cell = panel
            .iter()
            .find(|c| c.region_code == 825 && c.month == 1)
            .unwrap();
        assert!(cell.flood_event);
        assert_eq!(cell.event_count, 2);
        assert_eq!(cell.max_duration_days, 28);
        assert!((cell.allocated_damage_usd - 1500.0).abs() < 1e-9);
        assert!((cell.damage_gdp_pct.unwrap() - 1.5).abs() < 1e-9);
        assert!(!cell.damage_gdp_filled);
    }

    #[test]
    fn no_event_cells_zero_fill_absolutes_and_impute_normalized() {
        let subs = observed_subs();
        let panel = build_panel(
            &regions(),
            (2000, 2000),
            &subs,
            &ClimateSeries::default(),
            &fills(&subs),
        )
        .unwrap();

        let cell = panel
            .iter()
            .find(|c| c.region_code == 825 && c.month == 6)
            .unwrap();
        assert!(!cell.flood_event);
        assert!((cell.allocated_damage_usd - 0.0).abs() < f64::EPSILON);
        assert_eq!(cell.max_duration_days, 0);
        // 2nd percentile of the region's observed [1,2,3,4].
        assert!((cell.damage_gdp_pct.unwrap() - 1.06).abs() < 1e-9);
        assert!(cell.damage_gdp_filled);
    }

    #[test]
    fn event_cell_with_missing_normalized_uses_event_fill() {
        let mut subs = observed_subs();
        // An event in region 838 with no normalized damage observed.
        subs.push(sub("2000-0300-CAN", 838, 2000, 7));

        let table = fills(&subs);
        let panel = build_panel(
            &regions(),
            (2000, 2000),
            &subs,
            &ClimateSeries::default(),
            &table,
        )
        .unwrap();

        let cell = panel
            .iter()
            .find(|c| c.region_code == 838 && c.month == 7)
            .unwrap();
        assert!(cell.flood_event);
        // Region 838 has no history; falls back to Canada's q05 = 1.15.
        assert!((cell.damage_gdp_pct.unwrap() - 1.15).abs() < 1e-9);
        assert!(cell.damage_gdp_filled);
    }

    #[test]
    fn unobserved_fields_stay_null_without_marker() {
        let subs = observed_subs();
        let panel = build_panel(
            &regions(),
            (2000, 2000),
            &subs,
            &ClimateSeries::default(),
            &fills(&subs),
        )
        .unwrap();
        // affected_pop_pct was never observed anywhere.
        let cell = &panel[0];
        assert!(cell.affected_pop_pct.is_none());
        assert!(!cell.affected_pop_filled);
    }

    #[test]
    fn climate_joins_every_cell_and_marks_misses() {
        let daily = "\
adm1_code,date,precipitation_mean
825,2000-01-10,2.0
825,2000-02-10,6.0
";
        let climate = ClimateSeries::from_daily_reader(daily.as_bytes()).unwrap();
        let panel = build_panel(
            &regions(),
            (2000, 2000),
            &[],
            &climate,
            &FillTable::default(),
        )
        .unwrap();

        let jan = panel
            .iter()
            .find(|c| c.region_code == 825 && c.month == 1)
            .unwrap();
        assert!(jan.precip_anomaly.is_some());
        assert!(!jan.climate_missing);

        let march = panel
            .iter()
            .find(|c| c.region_code == 825 && c.month == 3)
            .unwrap();
        assert!(march.precip_anomaly.is_none());
        assert!(march.climate_missing);
    }

    #[test]
    fn fixed_effect_keys_join_country_and_calendar() {
        let panel = build_panel(
            &regions(),
            (2011, 2011),
            &[],
            &ClimateSeries::default(),
            &FillTable::default(),
        )
        .unwrap();
        let cell = panel
            .iter()
            .find(|c| c.region_code == 825 && c.month == 5)
            .unwrap();
        assert_eq!(cell.country_year, "Canada_2011");
        assert_eq!(cell.country_month, "Canada_05");
    }

    #[test]
    fn inverted_year_range_is_rejected() {
        let result = build_panel(
            &regions(),
            (2010, 2005),
            &[],
            &ClimateSeries::default(),
            &FillTable::default(),
        );
        assert!(matches!(
            result,
            Err(PanelError::InvalidYearRange { start: 2010, end: 2005 })
        ));
    }

    #[test]
    fn out_of_grid_sub_events_join_nothing() {
        let subs = vec![sub("1999-0001-CAN", 825, 1999, 5)];
        let panel = build_panel(
            &regions(),
            (2000, 2000),
            &subs,
            &ClimateSeries::default(),
            &FillTable::default(),
        )
        .unwrap();
        assert!(panel.iter().all(|cell| !cell.flood_event));
    }
}
