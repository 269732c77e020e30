#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Administrative region gazetteer and free-text location matching.
//!
//! The gazetteer is the fixed catalog of level-1 administrative regions the
//! pipeline disaggregates into. Raw records reference regions two ways: a
//! structured admin-units column (level-1 or level-2 codes) and a free-text
//! location string. [`Gazetteer::match_event`] prefers the structured path
//! and falls back to normalized name matching scoped to the event's country.
//!
//! Matching is a data outcome, never an error: zero matches yield an empty
//! [`MatchedRegionSet`] whose `unmatched` list records what failed to
//! resolve, and a name hitting several regions keeps every candidate and
//! marks the set ambiguous.

pub mod normalize;

mod admin_units;

pub use admin_units::{AdminUnitRef, parse_admin_units};

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::normalize::{normalize_country, normalize_name};

/// Splits a free-text location into candidate region names.
static LOCATION_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[;,]|(?i:\s+and\s+)").expect("valid regex"));

/// Error type for gazetteer loading.
#[derive(Debug, Error)]
pub enum GazetteerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// One level-1 administrative region in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Level-1 region code.
    #[serde(rename = "adm1_code")]
    pub code: i64,
    /// Region name.
    #[serde(rename = "adm1_name")]
    pub name: String,
    /// Country (level-0) code.
    #[serde(rename = "adm0_code")]
    pub country_code: i64,
    /// Country name.
    #[serde(rename = "adm0_name")]
    pub country_name: String,
    /// ISO3 country code, when the catalog provides one.
    #[serde(default)]
    pub iso3: Option<String>,
    /// Region area in km², used by impact normalization.
    #[serde(default)]
    pub area_km2: Option<f64>,
}

/// A level-2 → level-1 parent row from the catalog.
#[derive(Debug, Clone, Deserialize)]
struct Admin2Row {
    adm2_code: i64,
    #[allow(dead_code)]
    adm2_name: String,
    adm1_code: i64,
}

/// How a matched region was resolved.
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
pub enum MatchSource {
    /// Structured admin-units column, by level-1 or level-2 code.
    AdminUnitCode,
    /// Structured admin-units column, by unit name.
    AdminUnitName,
    /// Free-text location string.
    LocationText,
}

/// One resolved region with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRegion {
    /// Level-1 region code.
    pub code: i64,
    /// Region name from the catalog.
    pub name: String,
    /// How the region was resolved.
    pub source: MatchSource,
}

/// Result of resolving one raw event's location information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRegionSet {
    /// Resolved regions, de-duplicated, ascending by code.
    pub regions: Vec<MatchedRegion>,
    /// Whether any single name resolved to more than one region.
    pub ambiguous: bool,
    /// Tokens or unit references that resolved to nothing.
    pub unmatched: Vec<String>,
}

impl MatchedRegionSet {
    /// Returns whether no regions were resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Returns the resolved region codes in ascending order.
    #[must_use]
    pub fn codes(&self) -> Vec<i64> {
        self.regions.iter().map(|region| region.code).collect()
    }
}

/// Alias configuration layered over normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AliasConfig {
    /// Normalized archive country name → normalized catalog country name.
    #[serde(default)]
    pub countries: BTreeMap<String, String>,
    /// Extra name-index entries for report spellings.
    #[serde(default)]
    pub region_aliases: Vec<RegionAlias>,
}

/// One extra index entry: `alias` resolves like `name` within `country`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionAlias {
    /// Normalized country name the alias applies in.
    pub country: String,
    /// Normalized alias spelling.
    pub alias: String,
    /// Normalized catalog name the alias points at.
    pub name: String,
}

impl AliasConfig {
    /// Loads the alias table shipped with the crate.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded TOML fails to parse.
    pub fn embedded() -> Result<Self, GazetteerError> {
        Ok(toml::from_str(include_str!("aliases.toml"))?)
    }

    /// Loads an alias table from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML fails to parse.
    pub fn from_toml_str(raw: &str) -> Result<Self, GazetteerError> {
        Ok(toml::from_str(raw)?)
    }
}

/// The region catalog plus its lookup indexes.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    regions: BTreeMap<i64, Region>,
    admin2_parents: BTreeMap<i64, i64>,
    // normalized country name -> normalized region name -> region codes
    name_index: BTreeMap<String, BTreeMap<String, Vec<i64>>>,
    country_synonyms: BTreeMap<String, String>,
}

impl Gazetteer {
    /// Builds a gazetteer from level-1 and level-2 CSV readers.
    ///
    /// Duplicate codes keep the first row, matching the source catalog's
    /// handful of duplicated level-2 entries.
    ///
    /// # Errors
    ///
    /// Returns an error if either CSV fails to read or deserialize.
    pub fn from_readers<R1: Read, R2: Read>(
        admin1: R1,
        admin2: Option<R2>,
        aliases: AliasConfig,
    ) -> Result<Self, GazetteerError> {
        let mut regions: BTreeMap<i64, Region> = BTreeMap::new();
        let mut reader = csv::Reader::from_reader(admin1);
        for row in reader.deserialize() {
            let region: Region = row?;
            if regions.contains_key(&region.code) {
                log::warn!("Duplicate region code {} in catalog; keeping first", region.code);
                continue;
            }
            regions.insert(region.code, region);
        }

        let mut admin2_parents: BTreeMap<i64, i64> = BTreeMap::new();
        if let Some(admin2) = admin2 {
            let mut reader = csv::Reader::from_reader(admin2);
            for row in reader.deserialize() {
                let row: Admin2Row = row?;
                admin2_parents.entry(row.adm2_code).or_insert(row.adm1_code);
            }
        }

        let mut name_index: BTreeMap<String, BTreeMap<String, Vec<i64>>> = BTreeMap::new();
        for region in regions.values() {
            let country = normalize_country(&region.country_name);
            let name = normalize_name(&region.name);
            if name.is_empty() {
                continue;
            }
            let codes = name_index.entry(country).or_default().entry(name).or_default();
            if !codes.contains(&region.code) {
                codes.push(region.code);
            }
        }

        for alias in &aliases.region_aliases {
            let Some(by_name) = name_index.get_mut(&alias.country) else {
                log::debug!("Region alias {:?} references unknown country {:?}", alias.alias, alias.country);
                continue;
            };
            let Some(codes) = by_name.get(&alias.name).cloned() else {
                log::debug!("Region alias {:?} references unknown name {:?}", alias.alias, alias.name);
                continue;
            };
            by_name.entry(alias.alias.clone()).or_insert(codes);
        }

        log::info!(
            "Gazetteer loaded: {} regions, {} level-2 parents, {} country synonyms",
            regions.len(),
            admin2_parents.len(),
            aliases.countries.len()
        );

        Ok(Self {
            regions,
            admin2_parents,
            name_index,
            country_synonyms: aliases.countries,
        })
    }

    /// Builds a gazetteer from CSV files on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be opened or parsed.
    pub fn from_paths(
        admin1: &Path,
        admin2: Option<&Path>,
        aliases: AliasConfig,
    ) -> Result<Self, GazetteerError> {
        let admin1 = std::fs::File::open(admin1)?;
        let admin2 = match admin2 {
            Some(path) => Some(std::fs::File::open(path)?),
            None => None,
        };
        Self::from_readers(admin1, admin2, aliases)
    }

    /// Returns the region with the given level-1 code.
    #[must_use]
    pub fn region(&self, code: i64) -> Option<&Region> {
        self.regions.get(&code)
    }

    /// Returns the number of regions in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Iterates all regions in ascending code order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    /// Normalizes a country name and applies the synonym table.
    #[must_use]
    pub fn canonical_country(&self, country: &str) -> String {
        let normalized = normalize_country(country);
        self.country_synonyms
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    /// Resolves a raw event's location information to regions.
    ///
    /// The structured admin-units column wins when it resolves anything;
    /// free-text matching is the fallback. Unmatched references from both
    /// paths are preserved for the exclusion log.
    #[must_use]
    pub fn match_event(
        &self,
        country: &str,
        admin_units: Option<&str>,
        location: Option<&str>,
    ) -> MatchedRegionSet {
        let mut structured = admin_units
            .map(|raw| self.resolve_admin_units(raw, country))
            .unwrap_or_default();
        if !structured.is_empty() {
            return structured;
        }

        let mut from_text = location
            .map(|text| self.match_location(country, text))
            .unwrap_or_default();
        from_text.unmatched.append(&mut structured.unmatched);
        from_text
    }

    /// Resolves the structured admin-units column.
    ///
    /// Level-1 codes resolve directly; level-2 codes resolve through the
    /// parent table; units carrying only a name fall back to name matching
    /// within the event's country.
    #[must_use]
    pub fn resolve_admin_units(&self, raw_json: &str, country: &str) -> MatchedRegionSet {
        let mut set = MatchedRegionSet::default();
        let mut seen: BTreeSet<i64> = BTreeSet::new();

        for unit in parse_admin_units(raw_json) {
            if let Some(code) = unit.adm1_code {
                if self.push_region(&mut set, &mut seen, code, MatchSource::AdminUnitCode) {
                    continue;
                }
                set.unmatched.push(format!("adm1 code {code}"));
                continue;
            }

            if let Some(adm2) = unit.adm2_code {
                if let Some(&parent) = self.admin2_parents.get(&adm2) {
                    if self.push_region(&mut set, &mut seen, parent, MatchSource::AdminUnitCode) {
                        continue;
                    }
                }
                set.unmatched.push(format!("adm2 code {adm2}"));
                continue;
            }

            if let Some(name) = unit.adm1_name.as_deref().or(unit.adm2_name.as_deref()) {
                self.match_name_into(&mut set, &mut seen, country, name, MatchSource::AdminUnitName);
                continue;
            }

            set.unmatched.push("empty admin unit".to_string());
        }

        set
    }

    /// Matches a free-text location string within the event's country.
    ///
    /// The text is split on `;`, `,` and the word `and`; each token is
    /// normalized and looked up independently.
    #[must_use]
    pub fn match_location(&self, country: &str, location: &str) -> MatchedRegionSet {
        let mut set = MatchedRegionSet::default();
        let mut seen: BTreeSet<i64> = BTreeSet::new();

        for token in LOCATION_SPLIT_RE.split(location) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            self.match_name_into(&mut set, &mut seen, country, token, MatchSource::LocationText);
        }

        set
    }

    fn match_name_into(
        &self,
        set: &mut MatchedRegionSet,
        seen: &mut BTreeSet<i64>,
        country: &str,
        name: &str,
        source: MatchSource,
    ) {
        let canonical_country = self.canonical_country(country);
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return;
        }

        let candidates = self
            .name_index
            .get(&canonical_country)
            .and_then(|by_name| by_name.get(&normalized));

        match candidates {
            Some(codes) if !codes.is_empty() => {
                if codes.len() > 1 {
                    log::debug!(
                        "Location name {name:?} is ambiguous in {canonical_country}: {codes:?}"
                    );
                    set.ambiguous = true;
                }
                for &code in codes {
                    self.push_region(set, seen, code, source);
                }
            }
            _ => set.unmatched.push(name.to_string()),
        }
    }

    fn push_region(
        &self,
        set: &mut MatchedRegionSet,
        seen: &mut BTreeSet<i64>,
        code: i64,
        source: MatchSource,
    ) -> bool {
        let Some(region) = self.regions.get(&code) else {
            return false;
        };
        if seen.insert(code) {
            set.regions.push(MatchedRegion {
                code,
                name: region.name.clone(),
                source,
            });
            set.regions.sort_by_key(|matched| matched.code);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN1: &str = "\
adm1_code,adm1_name,adm0_code,adm0_name,iso3,area_km2
825,Manitoba,46,Canada,CAN,649950.0
838,Saskatchewan,46,Canada,CAN,651900.0
2246,Punjab,188,Pakistan,PAK,205345.0
2599,Northern,221,Sierra Leone,SLE,
2600,Northern,221,Sierra Leone,SLE,
40765,Odisha,115,India,IND,155707.0
";

    const ADMIN2: &str = "\
adm2_code,adm2_name,adm1_code,adm1_name
17722,Dera Ghazi Khan,2246,Punjab
17723,Lahore,2246,Punjab
";

    fn gazetteer() -> Gazetteer {
        let aliases = AliasConfig::from_toml_str(
            r#"
[countries]
"TÜRKIYE" = "TURKEY"

[[region_aliases]]
country = "INDIA"
alias = "ORISSA"
name = "ODISHA"
"#,
        )
        .unwrap();
        Gazetteer::from_readers(ADMIN1.as_bytes(), Some(ADMIN2.as_bytes()), aliases).unwrap()
    }

    #[test]
    fn matches_semicolon_separated_names() {
        let set = gazetteer().match_location("Canada", "Manitoba; Saskatchewan");
        assert_eq!(set.codes(), vec![825, 838]);
        assert!(!set.ambiguous);
        assert!(set.unmatched.is_empty());
    }

    #[test]
    fn matches_and_separated_names() {
        let set = gazetteer().match_location("Canada", "Manitoba and Saskatchewan");
        assert_eq!(set.codes(), vec![825, 838]);
    }

    #[test]
    fn unmatched_token_is_recorded_not_dropped() {
        let set = gazetteer().match_location("Canada", "Manitoba; Atlantis");
        assert_eq!(set.codes(), vec![825]);
        assert_eq!(set.unmatched, vec!["Atlantis".to_string()]);
    }

    #[test]
    fn ambiguous_name_keeps_every_candidate() {
        let set = gazetteer().match_location("Sierra Leone", "Northern");
        assert_eq!(set.codes(), vec![2599, 2600]);
        assert!(set.ambiguous);
    }

    #[test]
    fn matching_is_scoped_to_country() {
        let set = gazetteer().match_location("Pakistan", "Manitoba");
        assert!(set.is_empty());
        assert_eq!(set.unmatched, vec!["Manitoba".to_string()]);
    }

    #[test]
    fn resolves_level1_codes_directly() {
        let set = gazetteer().resolve_admin_units(
            r#"[{"adm1_code": 825, "adm1_name": "Manitoba"}]"#,
            "Canada",
        );
        assert_eq!(set.codes(), vec![825]);
        assert_eq!(set.regions[0].source, MatchSource::AdminUnitCode);
    }

    #[test]
    fn resolves_level2_codes_through_parents() {
        let set = gazetteer().resolve_admin_units(
            r#"[{"adm2_code": 17722, "adm2_name": "Dera Ghazi Khan"}, {"adm2_code": 17723}]"#,
            "Pakistan",
        );
        // Both districts collapse onto the same level-1 parent.
        assert_eq!(set.codes(), vec![2246]);
    }

    #[test]
    fn falls_back_to_unit_names_when_codes_absent() {
        let set = gazetteer().resolve_admin_units(r#"[{"adm1_name": "Punjab"}]"#, "Pakistan");
        assert_eq!(set.codes(), vec![2246]);
        assert_eq!(set.regions[0].source, MatchSource::AdminUnitName);
    }

    #[test]
    fn match_event_prefers_structured_units() {
        let set = gazetteer().match_event(
            "Canada",
            Some(r#"[{"adm1_code": 838}]"#),
            Some("Manitoba"),
        );
        assert_eq!(set.codes(), vec![838]);
    }

    #[test]
    fn match_event_falls_back_to_location_text() {
        let set = gazetteer().match_event("Canada", None, Some("Manitoba"));
        assert_eq!(set.codes(), vec![825]);
        assert_eq!(set.regions[0].source, MatchSource::LocationText);
    }

    #[test]
    fn region_alias_resolves_like_its_target() {
        let set = gazetteer().match_location("India", "Orissa");
        assert_eq!(set.codes(), vec![40765]);
    }

    #[test]
    fn unknown_codes_are_recorded_as_unmatched() {
        let set = gazetteer().resolve_admin_units(r#"[{"adm1_code": 99999}]"#, "Canada");
        assert!(set.is_empty());
        assert_eq!(set.unmatched, vec!["adm1 code 99999".to_string()]);
    }
}
