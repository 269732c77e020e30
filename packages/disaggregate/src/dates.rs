use chrono::NaiveDate;
use flood_panel_events_models::{MonthKey, RawEvent};

use crate::DisaggregateError;

/// A raw event's resolved date window after day imputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDates {
    /// First day of the event.
    pub start: NaiveDate,
    /// Last day of the event, inclusive.
    pub end: NaiveDate,
    /// Whether the start day was imputed to the first of the month.
    pub start_day_imputed: bool,
    /// Whether the end day was imputed to the last of the month.
    pub end_day_imputed: bool,
}

/// Outcome of resolving a raw event's date fields.
///
/// `Missing` and `Inverted` are exclusion outcomes, not errors; the caller
/// routes them to the exclusion log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateResolution {
    /// Both endpoints resolved to calendar dates.
    Resolved(EventDates),
    /// A year or month component was absent or unusable.
    Missing {
        /// Which component was missing or invalid.
        detail: String,
    },
    /// The resolved end date precedes the resolved start date.
    Inverted {
        /// Resolved start date.
        start: NaiveDate,
        /// Resolved end date.
        end: NaiveDate,
    },
}

/// Returns the last day of the given calendar month.
///
/// # Errors
///
/// Returns an error if the year/month pair cannot form a calendar date.
pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate, DisaggregateError> {
    let next = MonthKey::new(year, month).next();
    NaiveDate::from_ymd_opt(next.year, next.month, 1)
        .and_then(|first| first.pred_opt())
        .ok_or(DisaggregateError::InvalidDate { year, month })
}

/// Resolves a raw event's partial date fields into a date window.
///
/// Year and month are required at both ends. A missing start day is imputed
/// to the 1st; a missing end day is imputed to the last day of the end month.
/// Imputation is recorded so the expansion can flag the sub-events.
///
/// # Errors
///
/// Returns an error only for dates outside the calendar's representable
/// range; absent or inconsistent fields are reported as [`DateResolution`]
/// variants instead.
pub fn resolve_dates(event: &RawEvent) -> Result<DateResolution, DisaggregateError> {
    let mut missing: Vec<&str> = Vec::new();
    if event.start_year.is_none() {
        missing.push("start year");
    }
    if event.start_month.is_none() {
        missing.push("start month");
    }
    if event.end_year.is_none() {
        missing.push("end year");
    }
    if event.end_month.is_none() {
        missing.push("end month");
    }
    let (Some(start_year), Some(start_month), Some(end_year), Some(end_month)) = (
        event.start_year,
        event.start_month,
        event.end_year,
        event.end_month,
    ) else {
        return Ok(DateResolution::Missing {
            detail: missing.join(", "),
        });
    };

    if !(1..=12).contains(&start_month) || !(1..=12).contains(&end_month) {
        return Ok(DateResolution::Missing {
            detail: format!("month out of range (start {start_month}, end {end_month})"),
        });
    }

    let (start, start_day_imputed) = match event.start_day {
        Some(day) => match NaiveDate::from_ymd_opt(start_year, start_month, day) {
            Some(date) => (date, false),
            None => {
                return Ok(DateResolution::Missing {
                    detail: format!("invalid start date {start_year}-{start_month:02}-{day:02}"),
                });
            }
        },
        None => (
            NaiveDate::from_ymd_opt(start_year, start_month, 1).ok_or(
                DisaggregateError::InvalidDate {
                    year: start_year,
                    month: start_month,
                },
            )?,
            true,
        ),
    };

    let (end, end_day_imputed) = match event.end_day {
        Some(day) => match NaiveDate::from_ymd_opt(end_year, end_month, day) {
            Some(date) => (date, false),
            None => {
                return Ok(DateResolution::Missing {
                    detail: format!("invalid end date {end_year}-{end_month:02}-{day:02}"),
                });
            }
        },
        None => (last_day_of_month(end_year, end_month)?, true),
    };

    if end < start {
        return Ok(DateResolution::Inverted { start, end });
    }

    Ok(DateResolution::Resolved(EventDates {
        start,
        end,
        start_day_imputed,
        end_day_imputed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> RawEvent {
        RawEvent {
            id: "2011-0131-CAN".to_string(),
            event_name: None,
            country: "Canada".to_string(),
            iso3: "CAN".to_string(),
            location: None,
            admin_units: None,
            disaster_type: "Flood".to_string(),
            disaster_subtype: Some("Riverine flood".to_string()),
            start_year: Some(2011),
            start_month: Some(5),
            start_day: Some(8),
            end_year: Some(2011),
            end_month: Some(7),
            end_day: Some(15),
            total_damage_usd: None,
            total_affected: None,
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn complete_dates_resolve_without_imputation() {
        let resolution = resolve_dates(&event()).unwrap();
        assert_eq!(
            resolution,
            DateResolution::Resolved(EventDates {
                start: date(2011, 5, 8),
                end: date(2011, 7, 15),
                start_day_imputed: false,
                end_day_imputed: false,
            })
        );
    }

    #[test]
    fn missing_start_day_imputes_first_of_month() {
        let mut raw = event();
        raw.start_day = None;
        let DateResolution::Resolved(dates) = resolve_dates(&raw).unwrap() else {
            panic!("expected resolved dates");
        };
        assert_eq!(dates.start, date(2011, 5, 1));
        assert!(dates.start_day_imputed);
        assert!(!dates.end_day_imputed);
    }

    #[test]
    fn missing_end_day_imputes_last_of_month() {
        let mut raw = event();
        raw.end_day = None;
        raw.end_month = Some(2);
        raw.end_year = Some(2012);
        let DateResolution::Resolved(dates) = resolve_dates(&raw).unwrap() else {
            panic!("expected resolved dates");
        };
        // 2012 is a leap year.
        assert_eq!(dates.end, date(2012, 2, 29));
        assert!(dates.end_day_imputed);
    }

    #[test]
    fn missing_month_is_an_exclusion_outcome() {
        let mut raw = event();
        raw.start_month = None;
        assert_eq!(
            resolve_dates(&raw).unwrap(),
            DateResolution::Missing {
                detail: "start month".to_string()
            }
        );
    }

    #[test]
    fn inverted_range_is_an_exclusion_outcome() {
        let mut raw = event();
        raw.end_year = Some(2010);
        assert_eq!(
            resolve_dates(&raw).unwrap(),
            DateResolution::Inverted {
                start: date(2011, 5, 8),
                end: date(2010, 7, 15),
            }
        );
    }

    #[test]
    fn invalid_calendar_day_is_an_exclusion_outcome() {
        let mut raw = event();
        raw.start_month = Some(2);
        raw.start_day = Some(30);
        assert!(matches!(
            resolve_dates(&raw).unwrap(),
            DateResolution::Missing { .. }
        ));
    }

    #[test]
    fn last_day_handles_year_wrap() {
        assert_eq!(last_day_of_month(2011, 12).unwrap(), date(2011, 12, 31));
        assert_eq!(last_day_of_month(2011, 4).unwrap(), date(2011, 4, 30));
    }
}
