//! Region and country name normalization.
//!
//! Provides a deterministic normalization pipeline applied symmetrically at
//! gazetteer load time and match time, so that "Ha Noi" in a report and
//! "Ha-Noi" in the gazetteer produce the same normalized form.

use regex::Regex;
use std::sync::LazyLock;

/// Regex to strip punctuation characters that do not contribute to
/// name matching.
static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.,#'’`´/\\\-()]+").expect("valid regex"));

/// Regex to collapse multiple whitespace characters into a single space.
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Generic administrative descriptors that reports append to region names
/// ("Punjab Province", "Mopti region"). Dropped from the tail of a name as
/// long as something else remains.
const DESCRIPTOR_SUFFIXES: &[&str] = &[
    "PROVINCE",
    "PROVINCES",
    "DISTRICT",
    "DISTRICTS",
    "REGION",
    "REGIONS",
    "STATE",
    "STATES",
    "GOVERNORATE",
    "GOVERNORATES",
    "DEPARTMENT",
    "DEPARTMENTS",
    "PREFECTURE",
    "PREFECTURES",
    "COUNTY",
    "COUNTIES",
    "DIVISION",
    "DIVISIONS",
    "MUNICIPALITY",
    "MUNICIPALITIES",
    "OBLAST",
];

/// Normalizes a region name for index and query use.
///
/// The pipeline:
/// 1. Uppercase
/// 2. Strip punctuation (`.`, `,`, `#`, apostrophes, `/`, `\`, `-`, parens)
/// 3. Drop a trailing generic descriptor ("PROVINCE", "DISTRICT", ...)
/// 4. Collapse whitespace
/// 5. Trim
#[must_use]
pub fn normalize_name(input: &str) -> String {
    let upper = input.to_uppercase();
    let no_punct = PUNCTUATION_RE.replace_all(&upper, " ");
    let mut tokens: Vec<&str> = no_punct.split_whitespace().collect();

    if tokens.len() > 1
        && tokens
            .last()
            .is_some_and(|last| DESCRIPTOR_SUFFIXES.contains(last))
    {
        tokens.pop();
    }

    let joined = tokens.join(" ");
    WHITESPACE_RE.replace_all(&joined, " ").trim().to_string()
}

/// Normalizes a country name.
///
/// Same pipeline as [`normalize_name`] minus descriptor stripping, plus
/// removal of the archive's trailing `"(the)"` article, so that
/// `"Netherlands (the)"` and `"Netherlands"` agree. Synonym substitution
/// (e.g. `TÜRKIYE` → `TURKEY`) happens afterwards, against the gazetteer's
/// configured alias table.
#[must_use]
pub fn normalize_country(input: &str) -> String {
    let upper = input.to_uppercase();
    let no_punct = PUNCTUATION_RE.replace_all(&upper, " ");
    let collapsed = WHITESPACE_RE.replace_all(&no_punct, " ");
    let trimmed = collapsed.trim();
    trimmed.strip_suffix(" THE").unwrap_or(trimmed).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mixed_case() {
        assert_eq!(normalize_name("manitoba"), "MANITOBA");
    }

    #[test]
    fn strips_punctuation() {
        assert_eq!(normalize_name("Ha-Noi"), "HA NOI");
        assert_eq!(normalize_name("Sa'ada"), "SA ADA");
    }

    #[test]
    fn drops_trailing_descriptor() {
        assert_eq!(normalize_name("Punjab Province"), "PUNJAB");
        assert_eq!(normalize_name("Mopti region"), "MOPTI");
        assert_eq!(normalize_name("Sind district"), "SIND");
    }

    #[test]
    fn keeps_descriptor_when_it_is_the_whole_name() {
        // A bare descriptor never collapses to an empty string.
        assert_eq!(normalize_name("Province"), "PROVINCE");
    }

    #[test]
    fn keeps_descriptor_words_inside_names() {
        assert_eq!(normalize_name("Western Province"), "WESTERN");
        assert_eq!(normalize_name("Northern State"), "NORTHERN");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_name("  Nova   Scotia "), "NOVA SCOTIA");
    }

    #[test]
    fn country_strips_trailing_article() {
        assert_eq!(normalize_country("Netherlands (the)"), "NETHERLANDS");
        assert_eq!(normalize_country("Sudan (the)"), "SUDAN");
    }

    #[test]
    fn country_handles_parenthesized_qualifiers() {
        // GAUL's double-spaced variant and the archive's single-spaced one
        // normalize identically.
        assert_eq!(
            normalize_country("Iran  (Islamic Republic of)"),
            normalize_country("Iran (Islamic Republic of)")
        );
        assert_eq!(
            normalize_country("Côte d’Ivoire"),
            normalize_country("Côte d'Ivoire")
        );
    }
}
