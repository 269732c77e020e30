#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Severity-weighted allocation of reported impacts across sub-events.
//!
//! A raw event reports one damage figure and one affected-population figure
//! for a window that disaggregation has split into many region-month
//! sub-events. This crate reconciles the two: sub-events are regrouped by
//! raw event and each group's reported totals are distributed by the rule
//! in [`weights`], then scaled to region denominators by [`normalize`].
//!
//! Grouping hands each `(RawEvent, Vec<SubEvent>)` fan-out to the allocator
//! wholesale; there are no back-pointers into shared parents.

pub mod normalize;
pub mod weights;

use std::collections::BTreeMap;
use std::sync::Arc;

use flood_panel_events_models::{AllocationMethod, RawEvent, SubEvent};
use flood_panel_severity::ProgressCallback;
use thiserror::Error;

pub use normalize::{GdpTable, PopulationTable, apply_normalized_impacts};
pub use weights::allocate_group;

/// Error type for reference-table loading.
#[derive(Debug, Error)]
pub enum AllocateError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("reference table missing required column {name:?}")]
    MissingColumn { name: &'static str },
}

/// Allocates reported impacts for every raw event's group of sub-events.
///
/// Sub-events are regrouped by raw event id and returned in (raw event,
/// region, month) order. A group whose raw event is absent from `events` is
/// a structural defect: it is logged with its id and passed through
/// unallocated, without aborting the batch.
#[must_use]
pub fn allocate_impacts(
    events: &[RawEvent],
    sub_events: Vec<SubEvent>,
    progress: &Arc<dyn ProgressCallback>,
) -> Vec<SubEvent> {
    let index: BTreeMap<&str, &RawEvent> =
        events.iter().map(|event| (event.id.as_str(), event)).collect();

    let mut groups: BTreeMap<String, Vec<SubEvent>> = BTreeMap::new();
    for sub in sub_events {
        groups.entry(sub.raw_event_id.clone()).or_default().push(sub);
    }

    progress.set_total(groups.len() as u64);
    let mut allocated = Vec::new();
    let mut method_counts: BTreeMap<AllocationMethod, usize> = BTreeMap::new();
    let mut orphaned = 0_usize;

    for (raw_event_id, mut subs) in groups {
        if let Some(event) = index.get(raw_event_id.as_str()) {
            let method = allocate_group(event, &mut subs);
            *method_counts.entry(method).or_default() += 1;
        } else {
            orphaned += 1;
            log::error!("Sub-events reference unknown raw event {raw_event_id}; left unallocated");
        }
        allocated.append(&mut subs);
        progress.inc(1);
    }
    progress.finish_and_clear();

    for (method, count) in &method_counts {
        log::info!("Allocation method {method}: {count} raw events");
    }
    if orphaned > 0 {
        log::error!("{orphaned} sub-event groups had no matching raw event");
    }

    allocated
}
