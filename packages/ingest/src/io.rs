//! CSV readers and writers for the pipeline's external interfaces.
//!
//! The raw archive reader applies the load-time preprocessing the rest of
//! the pipeline assumes: inland-flood filtering, the configured year range,
//! thousands-to-dollars damage scaling, and CPI derivation for final-year
//! events whose adjusted damage column is not populated upstream.

use std::fs;
use std::io::Read;
use std::path::Path;

use flood_panel_events_models::{ExcludedEvent, RawEvent, SubEvent};
use flood_panel_panel::PanelCell;
use serde::{Deserialize, Serialize};

use crate::config::PipelineParams;

/// One row of the raw disaster archive export, column names as shipped.
#[derive(Debug, Deserialize)]
struct ArchiveRow {
    #[serde(rename = "DisNo.")]
    dis_no: String,
    #[serde(rename = "Event Name")]
    event_name: Option<String>,
    #[serde(rename = "Country")]
    country: String,
    #[serde(rename = "ISO")]
    iso: String,
    #[serde(rename = "Location")]
    location: Option<String>,
    #[serde(rename = "Admin Units")]
    admin_units: Option<String>,
    #[serde(rename = "Disaster Type")]
    disaster_type: String,
    #[serde(rename = "Disaster Subtype")]
    disaster_subtype: Option<String>,
    #[serde(rename = "Start Year")]
    start_year: Option<i32>,
    #[serde(rename = "Start Month")]
    start_month: Option<u32>,
    #[serde(rename = "Start Day")]
    start_day: Option<u32>,
    #[serde(rename = "End Year")]
    end_year: Option<i32>,
    #[serde(rename = "End Month")]
    end_month: Option<u32>,
    #[serde(rename = "End Day")]
    end_day: Option<u32>,
    #[serde(rename = "Total Damage ('000 US$)")]
    total_damage_thousands: Option<f64>,
    #[serde(rename = "Total Damage, Adjusted ('000 US$)")]
    total_damage_adjusted_thousands: Option<f64>,
    #[serde(rename = "Total Affected")]
    total_affected: Option<f64>,
}

/// Reads the raw disaster archive, keeping inland floods within the
/// configured year range.
///
/// Damage columns arrive in thousands of US$ and are scaled to US$. Events
/// starting in the final archive year have no adjusted damage upstream; it
/// is derived as nominal damage divided by the configured CPI ratio. Rows
/// with a missing start year survive the year filter; disaggregation
/// excludes them with a recorded reason instead of a silent drop here.
///
/// # Errors
///
/// Returns an error if the CSV fails to read or deserialize.
pub fn read_raw_events<R: Read>(
    reader: R,
    params: &PipelineParams,
) -> Result<Vec<RawEvent>, csv::Error> {
    let mut events = Vec::new();
    let mut total = 0_usize;
    let mut non_flood = 0_usize;
    let mut coastal = 0_usize;
    let mut out_of_range = 0_usize;
    let mut derived_damage = 0_usize;

    let mut csv_reader = csv::Reader::from_reader(reader);
    for row in csv_reader.deserialize() {
        let row: ArchiveRow = row?;
        total += 1;

        if row.disaster_type != "Flood" {
            non_flood += 1;
            continue;
        }
        if row.disaster_subtype.as_deref() == Some("Coastal flood") {
            coastal += 1;
            continue;
        }
        if let Some(year) = row.start_year {
            if !(params.start_year..=params.end_year).contains(&year) {
                out_of_range += 1;
                continue;
            }
        }

        let adjusted_thousands = match (
            row.total_damage_adjusted_thousands,
            row.total_damage_thousands,
        ) {
            (Some(adjusted), _) => Some(adjusted),
            (None, Some(nominal)) if row.start_year == Some(params.end_year) => {
                derived_damage += 1;
                Some(nominal / params.cpi_ratio)
            }
            _ => None,
        };

        events.push(RawEvent {
            id: row.dis_no,
            event_name: row.event_name,
            country: row.country,
            iso3: row.iso,
            location: row.location,
            admin_units: row.admin_units,
            disaster_type: row.disaster_type,
            disaster_subtype: row.disaster_subtype,
            start_year: row.start_year,
            start_month: row.start_month,
            start_day: row.start_day,
            end_year: row.end_year,
            end_month: row.end_month,
            end_day: row.end_day,
            total_damage_usd: adjusted_thousands.map(|thousands| thousands * 1000.0),
            total_affected: row.total_affected,
        });
    }

    log::info!(
        "Archive: kept {} of {total} rows ({non_flood} non-flood, {coastal} coastal, {out_of_range} outside {}-{}; derived {derived_damage} final-year adjusted damages)",
        events.len(),
        params.start_year,
        params.end_year,
    );

    Ok(events)
}

/// Reads the raw disaster archive from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, read, or deserialized.
pub fn read_raw_events_path(
    path: &Path,
    params: &PipelineParams,
) -> Result<Vec<RawEvent>, csv::Error> {
    let file = fs::File::open(path)?;
    read_raw_events(file, params)
}

/// Serializes rows to a CSV file, creating parent directories. Existing
/// files are fully overwritten so reruns stay idempotent.
fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the event-level table, one row per sub-event.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_event_table(
    path: &Path,
    sub_events: &[SubEvent],
) -> Result<(), Box<dyn std::error::Error>> {
    write_rows(path, sub_events)?;
    log::info!("Wrote {} sub-events to {}", sub_events.len(), path.display());
    Ok(())
}

/// Reads an event-level table back into sub-events.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a row fails to parse,
/// including rows carrying flag codes outside the catalog.
pub fn read_event_table(path: &Path) -> Result<Vec<SubEvent>, Box<dyn std::error::Error>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut sub_events = Vec::new();
    for row in reader.deserialize() {
        let sub: SubEvent = row?;
        sub_events.push(sub);
    }
    log::info!("Read {} sub-events from {}", sub_events.len(), path.display());
    Ok(sub_events)
}

/// Writes the exclusion log, one row per excluded raw event.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_exclusion_log(
    path: &Path,
    excluded: &[ExcludedEvent],
) -> Result<(), Box<dyn std::error::Error>> {
    write_rows(path, excluded)?;
    log::info!("Wrote {} exclusions to {}", excluded.len(), path.display());
    Ok(())
}

/// Writes the balanced panel table.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_panel_table(path: &Path, cells: &[PanelCell]) -> Result<(), Box<dyn std::error::Error>> {
    write_rows(path, cells)?;
    log::info!("Wrote {} panel cells to {}", cells.len(), path.display());
    Ok(())
}

/// Writes the quality-flag catalog, one row per code.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_flag_catalog(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let entries = flood_panel_flags::catalog();
    write_rows(path, &entries)?;
    log::info!("Wrote {} flag catalog entries to {}", entries.len(), path.display());
    Ok(())
}
