//! Slot selection for tables that need a place on screen.
//!
//! Candidates are slots whose activity use equals the table's role. Empty slots
//! come first, then stackable slots by occupant count, and ties go to the lower
//! priority value. A table that finds no candidate stays unbound until the next
//! reconciliation pass.

use crate::models::{ActivityUse, Slot, Table};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct SlotAssigner;

impl SlotAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots able to take a table with `role`, best first
    pub fn rank_candidates(slots: &[Arc<Slot>], role: ActivityUse) -> Vec<Arc<Slot>> {
        let mut candidates: Vec<(usize, i32, Arc<Slot>)> = slots
            .iter()
            .filter(|slot| slot.activity_use() == role)
            .filter_map(|slot| {
                let occupants = slot.occupant_count();
                if occupants > 0 && !slot.can_stack() {
                    return None;
                }
                Some((occupants, slot.priority(), Arc::clone(slot)))
            })
            .collect();

        // Stable, so configuration order decides between equal slots
        candidates.sort_by_key(|(occupants, priority, _)| (*occupants, *priority));
        candidates.into_iter().map(|(_, _, slot)| slot).collect()
    }

    pub fn select(slots: &[Arc<Slot>], role: ActivityUse) -> Option<Arc<Slot>> {
        Self::rank_candidates(slots, role).into_iter().next()
    }

    /// Place `table` in one of `slots`.
    ///
    /// A table already sitting in a matching slot of this layout stays there.
    /// Otherwise it is released and bound to the best candidate that still accepts it.
    pub fn assign(&self, slots: &[Arc<Slot>], table: &Arc<Table>) -> Option<Arc<Slot>> {
        let role = table.role();

        if let Some(current) = table.preferred_slot() {
            let in_layout = slots.iter().any(|slot| Arc::ptr_eq(slot, &current));
            if in_layout && current.activity_use() == role {
                return Some(current);
            }
            current.unbind(table);
        }

        for candidate in Self::rank_candidates(slots, role) {
            // Another bind may have filled it since ranking
            if candidate.bind(table) {
                debug!(
                    table = %table.handle(),
                    slot = %candidate.id(),
                    priority = candidate.priority(),
                    "Assigned table to slot"
                );
                return Some(candidate);
            }
        }

        debug!(table = %table.handle(), role = %role, "No slot available");
        None
    }
}
