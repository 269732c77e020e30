//! Parsing of the archive's structured `Admin Units` column.
//!
//! The column holds a JSON list of objects naming level-1 and/or level-2
//! administrative units, e.g.
//! `[{"adm1_code": 825, "adm1_name": "Manitoba"}, {"adm2_code": 17722}]`.
//! Codes occasionally arrive as strings, and names may carry the archive's
//! `"Administrative unit not available"` placeholder; both are tolerated.

use serde::Deserialize;

const UNAVAILABLE_PLACEHOLDER: &str = "Administrative unit not available";

/// A code that may be serialized as a number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CodeValue {
    Number(i64),
    Text(String),
}

impl CodeValue {
    fn as_code(&self) -> Option<i64> {
        match self {
            Self::Number(code) => Some(*code),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAdminUnit {
    #[serde(default)]
    adm1_code: Option<CodeValue>,
    #[serde(default)]
    adm1_name: Option<String>,
    #[serde(default)]
    adm2_code: Option<CodeValue>,
    #[serde(default)]
    adm2_name: Option<String>,
}

/// One structured admin-unit reference from a raw record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminUnitRef {
    /// Level-1 region code, when given.
    pub adm1_code: Option<i64>,
    /// Level-1 region name, when given and not the placeholder.
    pub adm1_name: Option<String>,
    /// Level-2 unit code, when given.
    pub adm2_code: Option<i64>,
    /// Level-2 unit name, when given and not the placeholder.
    pub adm2_name: Option<String>,
}

fn clean_name(name: Option<String>) -> Option<String> {
    name.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != UNAVAILABLE_PLACEHOLDER)
}

/// Parses the `Admin Units` JSON column into unit references.
///
/// Malformed JSON is a data defect, not an error: it yields an empty list
/// (with a warning) so the caller can fall back to free-text matching.
#[must_use]
pub fn parse_admin_units(raw: &str) -> Vec<AdminUnitRef> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let units: Vec<RawAdminUnit> = match serde_json::from_str(trimmed) {
        Ok(units) => units,
        Err(err) => {
            log::warn!("Unparseable admin-units column ({err}): {trimmed:?}");
            return Vec::new();
        }
    };

    units
        .into_iter()
        .map(|unit| AdminUnitRef {
            adm1_code: unit.adm1_code.as_ref().and_then(CodeValue::as_code),
            adm1_name: clean_name(unit.adm1_name),
            adm2_code: unit.adm2_code.as_ref().and_then(CodeValue::as_code),
            adm2_name: clean_name(unit.adm2_name),
        })
        .collect()
}
