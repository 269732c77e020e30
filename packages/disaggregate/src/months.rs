use chrono::NaiveDate;
use flood_panel_events_models::MonthKey;

use crate::DisaggregateError;
use crate::dates::last_day_of_month;

/// One calendar-month slice of an event's date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthSlice {
    /// The calendar month.
    pub month: MonthKey,
    /// First day of the slice, clipped to the event start.
    pub slice_start: NaiveDate,
    /// Last day of the slice, clipped to the event end.
    pub slice_end: NaiveDate,
}

impl MonthSlice {
    /// Returns the inclusive day count of the slice.
    #[must_use]
    pub fn duration_days(&self) -> i64 {
        (self.slice_end - self.slice_start).num_days() + 1
    }
}

/// Splits an inclusive date window into per-month slices.
///
/// Interior months span their full length; the first and last slices are
/// clipped to the event's endpoints. Slices never overlap and together cover
/// every day of the window exactly once.
///
/// # Errors
///
/// Returns an error if a month boundary cannot form a calendar date.
pub fn month_span(start: NaiveDate, end: NaiveDate) -> Result<Vec<MonthSlice>, DisaggregateError> {
    debug_assert!(start <= end, "caller resolves inverted ranges first");

    let mut slices = Vec::new();
    let mut month = MonthKey::from_date(start);
    let last = MonthKey::from_date(end);

    loop {
        let first_day = NaiveDate::from_ymd_opt(month.year, month.month, 1).ok_or(
            DisaggregateError::InvalidDate {
                year: month.year,
                month: month.month,
            },
        )?;
        let last_day = last_day_of_month(month.year, month.month)?;
        slices.push(MonthSlice {
            month,
            slice_start: first_day.max(start),
            slice_end: last_day.min(end),
        });
        if month == last {
            break;
        }
        month = month.next();
    }

    Ok(slices)
}
