//! Immutable percentile fill tables for panel imputation.
//!
//! Fills are computed once, over the observed normalized-impact
//! distributions of the event table, before any panel cell is touched. Each
//! impact field gets a per-region pair of fill values (5th percentile for
//! event cells with missing impacts, 2nd for no-event cells); regions with
//! too little history fall back to their country's distribution and then to
//! the whole dataset. Fill values are deterministic functions of observed
//! data, never tuning constants.

use std::collections::BTreeMap;

use flood_panel_events_models::SubEvent;

use crate::quantile::{quantile_linear, round5};

/// The two percentile levels used by panel imputation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillLevels {
    /// Quantile for event cells whose normalized impact is missing.
    pub event_missing: f64,
    /// Quantile for cells with no recorded flood.
    pub no_event: f64,
}

impl Default for FillLevels {
    fn default() -> Self {
        Self {
            event_missing: 0.05,
            no_event: 0.02,
        }
    }
}

/// Which fill level a lookup wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillKind {
    /// An event happened here but its normalized impact is unobserved.
    EventMissing,
    /// No event at this cell.
    NoEvent,
}

/// The normalized impact fields subject to imputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImpactField {
    /// Allocated damage over region-year GDP, percent.
    DamageGdpPct,
    /// Allocated affected over region population, percent.
    AffectedPopPct,
    /// Flooded area over region area, percent.
    FloodedAreaPct,
}

impl ImpactField {
    /// All fields, in output-column order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::DamageGdpPct, Self::AffectedPopPct, Self::FloodedAreaPct]
    }

    /// Reads this field's observed value off a sub-event.
    #[must_use]
    pub const fn observe(self, sub: &SubEvent) -> Option<f64> {
        match self {
            Self::DamageGdpPct => sub.damage_gdp_pct,
            Self::AffectedPopPct => sub.affected_pop_pct,
            Self::FloodedAreaPct => sub.flooded_area_pct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FillPair {
    event_missing: f64,
    no_event: f64,
}

impl FillPair {
    const fn get(self, kind: FillKind) -> f64 {
        match kind {
            FillKind::EventMissing => self.event_missing,
            FillKind::NoEvent => self.no_event,
        }
    }
}

/// Immutable percentile lookup, one pair per (field, scope).
#[derive(Debug, Clone, Default)]
pub struct FillTable {
    region: BTreeMap<(ImpactField, i64), FillPair>,
    country: BTreeMap<(ImpactField, String), FillPair>,
    global: BTreeMap<ImpactField, FillPair>,
}

impl FillTable {
    /// Computes fill pairs from the event table's observed distributions.
    ///
    /// A region contributes its own pair only when it has at least
    /// `min_region_samples` observations for the field; likewise countries.
    /// The global pair exists whenever the field was observed at all.
    #[must_use]
    pub fn compute(
        sub_events: &[SubEvent],
        levels: FillLevels,
        min_region_samples: usize,
    ) -> Self {
        let mut table = Self::default();

        for field in ImpactField::all() {
            let mut by_region: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
            let mut by_country: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            let mut global: Vec<f64> = Vec::new();

            for sub in sub_events {
                let Some(value) = field.observe(sub) else {
                    continue;
                };
                by_region.entry(sub.region_code).or_default().push(value);
                by_country.entry(sub.iso3.clone()).or_default().push(value);
                global.push(value);
            }

            for (region, values) in by_region {
                if values.len() >= min_region_samples {
                    if let Some(pair) = fill_pair(values, levels) {
                        table.region.insert((field, region), pair);
                    }
                }
            }
            for (country, values) in by_country {
                if values.len() >= min_region_samples {
                    if let Some(pair) = fill_pair(values, levels) {
                        table.country.insert((field, country), pair);
                    }
                }
            }
            if let Some(pair) = fill_pair(global, levels) {
                table.global.insert(field, pair);
            }
        }

        log::info!(
            "Fill table computed: {} region pairs, {} country pairs, {} global pairs",
            table.region.len(),
            table.country.len(),
            table.global.len()
        );
        table
    }

    /// Resolves the fill value for a cell, walking region → country →
    /// whole-dataset scopes. `None` only when the field was never observed
    /// anywhere.
    #[must_use]
    pub fn fill_value(
        &self,
        field: ImpactField,
        region_code: i64,
        iso3: Option<&str>,
        kind: FillKind,
    ) -> Option<f64> {
        if let Some(pair) = self.region.get(&(field, region_code)) {
            return Some(pair.get(kind));
        }
        if let Some(iso3) = iso3 {
            if let Some(pair) = self.country.get(&(field, iso3.to_string())) {
                return Some(pair.get(kind));
            }
        }
        self.global.get(&field).map(|pair| pair.get(kind))
    }
}

fn fill_pair(mut values: Vec<f64>, levels: FillLevels) -> Option<FillPair> {
    values.sort_by(f64::total_cmp);
    let event_missing = quantile_linear(&values, levels.event_missing)?;
    let no_event = quantile_linear(&values, levels.no_event)?;
    Some(FillPair {
        event_missing: round5(event_missing),
        no_event: round5(no_event),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use flood_panel_events_models::MonthKey;
    use flood_panel_flags::FlagSet;

    fn sub(region: i64, iso3: &str, damage_gdp_pct: Option<f64>) -> SubEvent {
        SubEvent {
            sub_event_id: format!("05-2011-0131-{iso3}-{region}"),
            raw_event_id: format!("2011-0131-{iso3}"),
            region_code: region,
            region_name: String::new(),
            country: String::new(),
            iso3: iso3.to_string(),
            disaster_subtype: None,
            month: MonthKey::new(2011, 5),
            slice_start: NaiveDate::from_ymd_opt(2011, 5, 1).unwrap(),
            slice_end: NaiveDate::from_ymd_opt(2011, 5, 31).unwrap(),
            duration_days: 31,
            flooded_area_km2: None,
            flooded_population: None,
            total_population: None,
            clear_fraction: None,
            allocation_weight: None,
            allocated_damage_usd: None,
            allocated_affected: None,
            damage_gdp_pct,
            affected_pop_pct: None,
            flooded_area_pct: None,
            flags: FlagSet::new(),
        }
    }

    #[test]
    fn region_with_enough_history_uses_its_own_distribution() {
        let subs: Vec<SubEvent> = [1.0, 2.0, 3.0, 4.0]
            .into_iter()
            .map(|v| sub(825, "CAN", Some(v)))
            .collect();
        let table = FillTable::compute(&subs, FillLevels::default(), 4);

        let event = table
            .fill_value(ImpactField::DamageGdpPct, 825, Some("CAN"), FillKind::EventMissing)
            .unwrap();
        let no_event = table
            .fill_value(ImpactField::DamageGdpPct, 825, Some("CAN"), FillKind::NoEvent)
            .unwrap();
        assert!((event - 1.15).abs() < 1e-9);
        assert!((no_event - 1.06).abs() < 1e-9);
    }

    #[test]
    fn sparse_region_falls_back_to_country() {
        let mut subs: Vec<SubEvent> = [1.0, 2.0, 3.0, 4.0]
            .into_iter()
            .map(|v| sub(825, "CAN", Some(v)))
            .collect();
        // Region 838 has a single observation, below the minimum.
        subs.push(sub(838, "CAN", Some(100.0)));
        let table = FillTable::compute(&subs, FillLevels::default(), 4);

        let value = table
            .fill_value(ImpactField::DamageGdpPct, 838, Some("CAN"), FillKind::NoEvent)
            .unwrap();
        // Country distribution [1,2,3,4,100], q02 over 5 values:
        // position 4 × 0.02 = 0.08 ⇒ 1 + 0.08 × 1 = 1.08
        assert!((value - 1.08).abs() < 1e-9);
    }

    #[test]
    fn sparse_country_falls_back_to_global() {
        let mut subs: Vec<SubEvent> = [1.0, 2.0, 3.0, 4.0]
            .into_iter()
            .map(|v| sub(825, "CAN", Some(v)))
            .collect();
        subs.push(sub(2246, "PAK", Some(10.0)));
        let table = FillTable::compute(&subs, FillLevels::default(), 4);

        let value = table
            .fill_value(ImpactField::DamageGdpPct, 2246, Some("PAK"), FillKind::NoEvent)
            .unwrap();
        // Global distribution [1,2,3,4,10], q02 ⇒ 1.08.
        assert!((value - 1.08).abs() < 1e-9);
    }

    #[test]
    fn unobserved_field_has_no_fill() {
        let subs = vec![sub(825, "CAN", Some(1.0))];
        let table = FillTable::compute(&subs, FillLevels::default(), 4);
        assert_eq!(
            table.fill_value(ImpactField::AffectedPopPct, 825, Some("CAN"), FillKind::NoEvent),
            None
        );
    }

    #[test]
    fn fill_values_are_rounded_to_five_decimals() {
        let subs: Vec<SubEvent> = [0.000_001, 0.000_002, 0.000_003, 1.0]
            .into_iter()
            .map(|v| sub(825, "CAN", Some(v)))
            .collect();
        let table = FillTable::compute(&subs, FillLevels::default(), 4);
        let value = table
            .fill_value(ImpactField::DamageGdpPct, 825, Some("CAN"), FillKind::NoEvent)
            .unwrap();
        assert!((value - round5(value)).abs() < 1e-15);
    }
}
