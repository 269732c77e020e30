//! Region reference tables and normalized impact enrichment.
//!
//! Allocated impacts are absolute; regressions want them scaled to region
//! denominators. The GDP table is wide (one `gdp_{year}` column per panel
//! year) and may arrive with holes, filled with country means. The
//! population table carries five-yearly census counts plus region area; an
//! event year maps to its reference year as `year − (year % 5)`.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use flood_panel_events_models::SubEvent;

use crate::AllocateError;

/// Per-region annual GDP, wide-format (`adm1_code, gdp_2000..gdp_2024`).
#[derive(Debug, Clone, Default)]
pub struct GdpTable {
    // region -> year -> gdp
    values: BTreeMap<i64, BTreeMap<i32, f64>>,
    years: Vec<i32>,
}

impl GdpTable {
    /// Loads the wide GDP table, discovering `gdp_{year}` columns from the
    /// header row. Rows without a usable region code and cells that fail to
    /// parse are skipped with a warning; malformed numerics are an input
    /// defect, not a fatal error.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSV cannot be read or lacks the
    /// `adm1_code` column.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AllocateError> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();

        let mut id_column = None;
        let mut year_columns: Vec<(usize, i32)> = Vec::new();
        for (index, name) in headers.iter().enumerate() {
            if name == "adm1_code" {
                id_column = Some(index);
            } else if let Some(year) = name.strip_prefix("gdp_") {
                if let Ok(year) = year.parse() {
                    year_columns.push((index, year));
                }
            }
        }
        let Some(id_column) = id_column else {
            return Err(AllocateError::MissingColumn { name: "adm1_code" });
        };

        let mut values: BTreeMap<i64, BTreeMap<i32, f64>> = BTreeMap::new();
        let mut skipped = 0_usize;
        for record in reader.records() {
            let record = record?;
            let Some(code) = record
                .get(id_column)
                .and_then(|cell| cell.trim().parse::<i64>().ok())
            else {
                skipped += 1;
                continue;
            };
            let by_year = values.entry(code).or_default();
            for &(index, year) in &year_columns {
                if let Some(value) = record
                    .get(index)
                    .and_then(|cell| cell.trim().parse::<f64>().ok())
                {
                    by_year.insert(year, value);
                }
            }
        }
        if skipped > 0 {
            log::warn!("Skipped {skipped} GDP rows without a usable adm1_code");
        }

        let mut years: Vec<i32> = year_columns.iter().map(|&(_, year)| year).collect();
        years.sort_unstable();
        Ok(Self { values, years })
    }

    /// Loads the table from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn from_path(path: &Path) -> Result<Self, AllocateError> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    /// Looks up a region's GDP for a year.
    #[must_use]
    pub fn gdp(&self, region_code: i64, year: i32) -> Option<f64> {
        self.values.get(&region_code)?.get(&year).copied()
    }

    /// Fills missing region-year cells with the mean over the region's
    /// country, using the supplied region → country mapping. Returns the
    /// number of cells filled.
    pub fn fill_country_means(&mut self, region_countries: &BTreeMap<i64, i64>) -> usize {
        // (country, year) -> (sum, count)
        let mut sums: BTreeMap<(i64, i32), (f64, u32)> = BTreeMap::new();
        for (region, by_year) in &self.values {
            let Some(&country) = region_countries.get(region) else {
                continue;
            };
            for (&year, &value) in by_year {
                let entry = sums.entry((country, year)).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }

        let mut filled = 0_usize;
        for (&region, &country) in region_countries {
            let by_year = self.values.entry(region).or_default();
            for &year in &self.years {
                if by_year.contains_key(&year) {
                    continue;
                }
                if let Some(&(sum, count)) = sums.get(&(country, year)) {
                    by_year.insert(year, sum / f64::from(count));
                    filled += 1;
                }
            }
        }

        if filled > 0 {
            log::info!("Filled {filled} missing GDP cells with country means");
        }
        filled
    }
}

/// Per-region five-yearly population and area
/// (`adm1_code, area_km2, pop_2000..pop_2020`).
#[derive(Debug, Clone, Default)]
pub struct PopulationTable {
    rows: BTreeMap<i64, PopulationRow>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct PopulationRow {
    adm1_code: i64,
    area_km2: Option<f64>,
    pop_2000: Option<f64>,
    pop_2005: Option<f64>,
    pop_2010: Option<f64>,
    pop_2015: Option<f64>,
    pop_2020: Option<f64>,
}

impl PopulationRow {
    const fn for_reference_year(&self, reference_year: i32) -> Option<f64> {
        match reference_year {
            2000 => self.pop_2000,
            2005 => self.pop_2005,
            2010 => self.pop_2010,
            2015 => self.pop_2015,
            2020 => self.pop_2020,
            _ => None,
        }
    }
}

impl PopulationTable {
    /// Loads the population reference table.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSV cannot be read or deserialized.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AllocateError> {
        let mut rows = BTreeMap::new();
        let mut reader = csv::Reader::from_reader(reader);
        for row in reader.deserialize() {
            let row: PopulationRow = row?;
            rows.insert(row.adm1_code, row);
        }
        Ok(Self { rows })
    }

    /// Loads the table from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsed.
    pub fn from_path(path: &Path) -> Result<Self, AllocateError> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    /// Looks up a region's population for an event year, mapped to its
    /// five-year reference year (`year − (year % 5)`).
    #[must_use]
    pub fn population(&self, region_code: i64, year: i32) -> Option<f64> {
        let reference_year = year - year.rem_euclid(5);
        self.rows
            .get(&region_code)?
            .for_reference_year(reference_year)
    }

    /// Looks up a region's area in km².
    #[must_use]
    pub fn area_km2(&self, region_code: i64) -> Option<f64> {
        self.rows.get(&region_code)?.area_km2
    }
}

/// Scales allocated impacts by region denominators, in place.
///
/// `damage_gdp_pct` = allocated damage / region-year GDP × 100;
/// `affected_pop_pct` = allocated affected / reference-year population × 100;
/// `flooded_area_pct` = flooded area / region area × 100. Null or
/// non-positive denominators leave the normalized field null; the absolute
/// fields already explain themselves through flags.
pub fn apply_normalized_impacts(
    sub_events: &mut [SubEvent],
    gdp: &GdpTable,
    population: &PopulationTable,
) {
    let mut missing_gdp = 0_usize;
    let mut missing_population = 0_usize;
    let mut missing_area = 0_usize;

    for sub in sub_events.iter_mut() {
        let year = sub.month.year;

        if let Some(damage) = sub.allocated_damage_usd {
            match gdp.gdp(sub.region_code, year) {
                Some(denominator) if denominator > 0.0 => {
                    sub.damage_gdp_pct = Some(damage / denominator * 100.0);
                }
                _ => missing_gdp += 1,
            }
        }

        if let Some(affected) = sub.allocated_affected {
            match population.population(sub.region_code, year) {
                Some(denominator) if denominator > 0.0 => {
                    sub.affected_pop_pct = Some(affected / denominator * 100.0);
                }
                _ => missing_population += 1,
            }
        }

        if let Some(flooded_area) = sub.flooded_area_km2 {
            match population.area_km2(sub.region_code) {
                Some(denominator) if denominator > 0.0 => {
                    sub.flooded_area_pct = Some(flooded_area / denominator * 100.0);
                }
                _ => missing_area += 1,
            }
        }
    }

    if missing_gdp + missing_population + missing_area > 0 {
        log::warn!(
            "Normalization skipped cells with missing denominators: {missing_gdp} GDP, {missing_population} population, {missing_area} area"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use flood_panel_events_models::MonthKey;
    use flood_panel_flags::FlagSet;

    const GDP: &str = "\
adm1_code,gdp_2010,gdp_2011
825,50000000000.0,52000000000.0
838,40000000000.0,
2246,9000000000.0,9500000000.0
";

    const POPULATION: &str = "\
adm1_code,area_km2,pop_2000,pop_2005,pop_2010,pop_2015,pop_2020
825,649950.0,1100000,1150000,1200000,1280000,1340000
838,651900.0,980000,990000,1030000,1090000,1130000
";

    fn gdp() -> GdpTable {
        GdpTable::from_reader(GDP.as_bytes()).unwrap()
    }

    fn population() -> PopulationTable {
        PopulationTable::from_reader(POPULATION.as_bytes()).unwrap()
    }

    fn sub(region: i64, year: i32) -> SubEvent {
        SubEvent {
            sub_event_id: format!("05-{year}-0131-CAN-{region}"),
            raw_event_id: format!("{year}-0131-CAN"),
            region_code: region,
            region_name: String::new(),
            country: "Canada".to_string(),
            iso3: "CAN".to_string(),
            disaster_subtype: None,
            month: MonthKey::new(year, 5),
            slice_start: NaiveDate::from_ymd_opt(year, 5, 1).unwrap(),
            slice_end: NaiveDate::from_ymd_opt(year, 5, 31).unwrap(),
            duration_days: 31,
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

    #[test]
    fn gdp_lookup_is_per_year() {
        let table = gdp();
        assert_eq!(table.gdp(825, 2010), Some(50_000_000_000.0));
        assert_eq!(table.gdp(825, 2011), Some(52_000_000_000.0));
        assert_eq!(table.gdp(838, 2011), None);
        assert_eq!(table.gdp(999, 2010), None);
    }

    #[test]
    fn country_means_fill_missing_cells() {
        let mut table = gdp();
        // 825 and 838 share country 46; 2246 sits alone in country 188.
        let region_countries = BTreeMap::from([(825, 46), (838, 46), (2246, 188)]);
        let filled = table.fill_country_means(&region_countries);
        assert_eq!(filled, 1);
        // 838's 2011 hole takes the mean of the country's observed 2011
        // values, which is just 825's.
        assert_eq!(table.gdp(838, 2011), Some(52_000_000_000.0));
    }

    #[test]
    fn population_maps_to_five_year_reference() {
        let table = population();
        assert_eq!(table.population(825, 2011), Some(1_200_000.0));
        assert_eq!(table.population(825, 2024), Some(1_340_000.0));
        assert_eq!(table.population(825, 2000), Some(1_100_000.0));
        assert_eq!(table.population(825, 1999), None);
    }

    #[test]
    fn normalization_scales_by_denominators() {
        let mut subs = vec![sub(825, 2011)];
        subs[0].allocated_damage_usd = Some(520_000_000.0);
        subs[0].allocated_affected = Some(12_000.0);
        subs[0].flooded_area_km2 = Some(6499.5);
        apply_normalized_impacts(&mut subs, &gdp(), &population());

        assert!((subs[0].damage_gdp_pct.unwrap() - 1.0).abs() < 1e-9);
        assert!((subs[0].affected_pop_pct.unwrap() - 1.0).abs() < 1e-9);
        assert!((subs[0].flooded_area_pct.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_denominators_leave_normalized_fields_null() {
        let mut subs = vec![sub(838, 2011)];
        subs[0].allocated_damage_usd = Some(1000.0);
        apply_normalized_impacts(&mut subs, &gdp(), &population());
        assert!(subs[0].damage_gdp_pct.is_none());
    }

    #[test]
    fn null_impacts_stay_null() {
        let mut subs = vec![sub(825, 2011)];
        apply_normalized_impacts(&mut subs, &gdp(), &population());
        assert!(subs[0].damage_gdp_pct.is_none());
        assert!(subs[0].affected_pop_pct.is_none());
        assert!(subs[0].flooded_area_pct.is_none());
    }
}
