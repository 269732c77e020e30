//! The allocation rule for one raw event's sub-events.
//!
//! Rules apply in priority order:
//!
//! 1. a single sub-event passes the reported values through unchanged
//!    (flag 15);
//! 2. if flooded-population estimates are available for at least one
//!    sub-event and sum above zero, each available sub-event receives
//!    `reported × (its estimate / sum over available)` (flag 14), while
//!    estimate-less sub-events receive zero — absence of satellite signal
//!    is recorded, never backfilled from a group average;
//! 3. with no estimates at all, the reported values split equally over
//!    every sub-event (flag 13).
//!
//! Edge: estimates exist but sum to exactly zero. The reported values then
//! split equally among the estimate-bearing sub-events only (flag 13 on
//! those); estimate-less sub-events still receive zero.
//!
//! Null reported values propagate as null allocations; the method flags are
//! applied regardless so the path taken stays observable. Damage and
//! affected share the same weights.

use flood_panel_events_models::{AllocationMethod, RawEvent, SubEvent};

/// Allocates one raw event's reported impacts across its sub-events.
///
/// Returns the method applied, for logging. `subs` must be non-empty.
pub fn allocate_group(event: &RawEvent, subs: &mut [SubEvent]) -> AllocationMethod {
    if let [only] = subs {
        only.allocated_damage_usd = event.total_damage_usd;
        only.allocated_affected = event.total_affected;
        only.flags.insert(AllocationMethod::Passthrough.flag());
        return AllocationMethod::Passthrough;
    }

    let available_sum: f64 = subs.iter().filter_map(|sub| sub.flooded_population).sum();
    let available_count = subs
        .iter()
        .filter(|sub| sub.flooded_population.is_some())
        .count();

    if available_count > 0 && available_sum > 0.0 {
        for sub in subs.iter_mut() {
            match sub.flooded_population {
                Some(flooded) => {
                    let weight = flooded / available_sum;
                    sub.allocation_weight = Some(weight);
                    sub.allocated_damage_usd = event.total_damage_usd.map(|d| d * weight);
                    sub.allocated_affected = event.total_affected.map(|a| a * weight);
                    sub.flags.insert(AllocationMethod::PopulationWeighted.flag());
                }
                None => {
                    sub.allocated_damage_usd = event.total_damage_usd.map(|_| 0.0);
                    sub.allocated_affected = event.total_affected.map(|_| 0.0);
                }
            }
        }
        return AllocationMethod::PopulationWeighted;
    }

    if available_count > 0 {
        // Estimates exist but sum to zero: equal split among the
        // estimate-bearing sub-events only.
        #[allow(clippy::cast_precision_loss)]
        let share = available_count as f64;
        for sub in subs.iter_mut() {
            if sub.flooded_population.is_some() {
                sub.allocated_damage_usd = event.total_damage_usd.map(|d| d / share);
                sub.allocated_affected = event.total_affected.map(|a| a / share);
                sub.flags.insert(AllocationMethod::EqualSplit.flag());
            } else {
                sub.allocated_damage_usd = event.total_damage_usd.map(|_| 0.0);
                sub.allocated_affected = event.total_affected.map(|_| 0.0);
            }
        }
        return AllocationMethod::EqualSplit;
    }

    #[allow(clippy::cast_precision_loss)]
    let share = subs.len() as f64;
    for sub in subs.iter_mut() {
        sub.allocated_damage_usd = event.total_damage_usd.map(|d| d / share);
        sub.allocated_affected = event.total_affected.map(|a| a / share);
        sub.flags.insert(AllocationMethod::EqualSplit.flag());
    }
    AllocationMethod::EqualSplit
}
