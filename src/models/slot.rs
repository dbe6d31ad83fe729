//! Slot model for TableManager
//!
//! A slot is a screen rectangle from the active profile that tables are bound to.
//! Each slot owns its occupancy list behind its own lock; a binding is only ever
//! changed while the locks of every slot involved are held, so the slot side and
//! the table side of a binding move together.

use crate::models::table::Table;
use crate::platform::window::{Rect, WindowHandle};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const SLOT_EVENT_CAPACITY: usize = 64;

/// What a slot is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ActivityUse {
    /// Idle layout position, always stackable
    #[default]
    Inactive,
    /// Table that is being played, never stackable
    Active,
    /// Table parked while a decision is pending, never stackable
    Aside,
}

impl ActivityUse {
    pub fn allows_stacking(self) -> bool {
        self == ActivityUse::Inactive
    }
}

impl fmt::Display for ActivityUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityUse::Inactive => "inactive",
            ActivityUse::Active => "active",
            ActivityUse::Aside => "aside",
        };
        f.write_str(name)
    }
}

/// Stable slot identity, assigned once at construction. The ordering fixes the
/// lock order when a table moves between two slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(Uuid);

impl SlotId {
    fn new() -> Self {
        SlotId(Uuid::new_v4())
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic configuration of a slot as it appears in a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotDefinition {
    #[serde(default)]
    pub activity_use: ActivityUse,
    /// Lower priority is used first
    #[serde(default)]
    pub priority: i32,
    #[serde(flatten)]
    pub frame: Rect,
}

impl SlotDefinition {
    pub fn new(activity_use: ActivityUse, priority: i32, frame: Rect) -> Self {
        Self {
            activity_use,
            priority,
            frame,
        }
    }

    pub fn can_stack(&self) -> bool {
        self.activity_use.allows_stacking()
    }
}

/// Change notifications raised by slot configuration edits
#[derive(Debug, Clone, PartialEq)]
pub enum SlotEvent {
    PriorityChanged {
        slot: SlotId,
        old: i32,
        new: i32,
    },
    ActivityUseChanged {
        slot: SlotId,
        old: ActivityUse,
        new: ActivityUse,
    },
}

#[derive(Debug)]
struct SlotState {
    activity_use: ActivityUse,
    priority: i32,
    frame: Rect,
    can_stack: bool,
}

#[derive(Debug)]
pub struct Slot {
    id: SlotId,
    state: RwLock<SlotState>,
    occupied_by: Mutex<Vec<Arc<Table>>>,
    events: broadcast::Sender<SlotEvent>,
}

impl Slot {
    /// Create a slot with its own event channel
    pub fn new(definition: SlotDefinition) -> Self {
        let (events, _) = broadcast::channel(SLOT_EVENT_CAPACITY);
        Self::with_events(definition, events)
    }

    /// Create a slot publishing on a channel shared with its sibling slots
    pub fn with_events(definition: SlotDefinition, events: broadcast::Sender<SlotEvent>) -> Self {
        Self {
            id: SlotId::new(),
            state: RwLock::new(SlotState {
                activity_use: definition.activity_use,
                priority: definition.priority,
                frame: definition.frame,
                can_stack: definition.can_stack(),
            }),
            occupied_by: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn definition(&self) -> SlotDefinition {
        let state = self.state.read();
        SlotDefinition {
            activity_use: state.activity_use,
            priority: state.priority,
            frame: state.frame,
        }
    }

    pub fn priority(&self) -> i32 {
        self.state.read().priority
    }

    pub fn activity_use(&self) -> ActivityUse {
        self.state.read().activity_use
    }

    pub fn can_stack(&self) -> bool {
        self.state.read().can_stack
    }

    pub fn frame(&self) -> Rect {
        self.state.read().frame
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SlotEvent> {
        self.events.subscribe()
    }

    pub fn set_priority(&self, priority: i32) {
        let old = {
            let mut state = self.state.write();
            std::mem::replace(&mut state.priority, priority)
        };
        self.publish(SlotEvent::PriorityChanged {
            slot: self.id,
            old,
            new: priority,
        });
    }

    /// Change the activity use. Stacking is recomputed in the same step.
    pub fn set_activity_use(&self, activity_use: ActivityUse) {
        let old = {
            let mut state = self.state.write();
            state.can_stack = activity_use.allows_stacking();
            std::mem::replace(&mut state.activity_use, activity_use)
        };
        self.publish(SlotEvent::ActivityUseChanged {
            slot: self.id,
            old,
            new: activity_use,
        });
    }

    pub fn occupants(&self) -> Vec<Arc<Table>> {
        self.occupied_by.lock().clone()
    }

    pub fn occupant_count(&self) -> usize {
        self.occupied_by.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied_by.lock().is_empty()
    }

    pub fn is_occupied_by(&self, handle: WindowHandle) -> bool {
        self.occupied_by
            .lock()
            .iter()
            .any(|table| table.handle() == handle)
    }

    /// Bind `table` to this slot.
    ///
    /// Returns `false` and changes nothing when the slot cannot stack and already
    /// holds a different table. A table bound elsewhere moves here in one step:
    /// both occupancy locks are taken in slot id order before either side changes.
    /// Binding a table that is already here keeps a single entry for its handle.
    pub fn bind(self: &Arc<Self>, table: &Arc<Table>) -> bool {
        let can_stack = self.can_stack();
        loop {
            let previous = table.preferred_slot().filter(|slot| slot.id != self.id);
            let (mut here, mut there) = match previous.as_deref() {
                None => (self.occupied_by.lock(), None),
                Some(other) if self.id < other.id => {
                    let here = self.occupied_by.lock();
                    (here, Some(other.occupied_by.lock()))
                }
                Some(other) => {
                    let there = other.occupied_by.lock();
                    (self.occupied_by.lock(), Some(there))
                }
            };

            let mut link = table.slot_link();
            let linked = link.as_ref().and_then(Weak::upgrade).map(|slot| slot.id);
            let expected = previous.as_ref().map(|slot| slot.id);
            if linked.is_some_and(|id| id != self.id && Some(id) != expected) {
                // Moved by another thread between the read and the locks
                continue;
            }

            let position = here
                .iter()
                .position(|occupant| occupant.handle() == table.handle());
            if position.is_none() && !can_stack && !here.is_empty() {
                return false;
            }

            let mut released_there = Vec::new();
            if let Some(there) = there.as_mut() {
                let (moved, kept): (Vec<_>, Vec<_>) = there
                    .drain(..)
                    .partition(|occupant| occupant.handle() == table.handle());
                **there = kept;
                released_there.extend(
                    moved
                        .into_iter()
                        .filter(|occupant| !Arc::ptr_eq(occupant, table)),
                );
            }

            let mut replaced = None;
            match position {
                Some(index) if Arc::ptr_eq(&here[index], table) => {}
                Some(index) => {
                    replaced = Some(std::mem::replace(&mut here[index], Arc::clone(table)));
                }
                None => here.push(Arc::clone(table)),
            }
            *link = Some(Arc::downgrade(self));
            drop(link);

            if let Some(old) = expected {
                for stale in &released_there {
                    stale.clear_slot_if(old);
                }
            }
            if let Some(stale) = replaced {
                stale.clear_slot_if(self.id);
            }

            debug!(slot = %self.id, table = %table.handle(), "Bound table to slot");
            return true;
        }
    }

    /// Release the table with the same window handle. Unbinding a table that is not
    /// here changes nothing and returns `false`.
    pub fn unbind(&self, table: &Table) -> bool {
        let mut occupied = self.occupied_by.lock();
        let (removed, kept): (Vec<_>, Vec<_>) = occupied
            .drain(..)
            .partition(|occupant| occupant.handle() == table.handle());
        *occupied = kept;

        for occupant in &removed {
            occupant.clear_slot_if(self.id);
        }
        table.clear_slot_if(self.id);

        if !removed.is_empty() {
            debug!(slot = %self.id, table = %table.handle(), "Unbound table from slot");
        }
        !removed.is_empty()
    }

    /// Release every occupant, returning them
    pub fn unbind_all(&self) -> Vec<Arc<Table>> {
        let mut occupied = self.occupied_by.lock();
        let removed: Vec<_> = occupied.drain(..).collect();
        for occupant in &removed {
            occupant.clear_slot_if(self.id);
        }
        removed
    }

    fn publish(&self, event: SlotEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Slots compare by configuration only; occupancy is not part of equality
impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.definition() == other.definition()
    }
}

impl Eq for Slot {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::window::WindowInfo;

    fn slot(activity_use: ActivityUse, priority: i32) -> Arc<Slot> {
        Arc::new(Slot::new(SlotDefinition::new(
            activity_use,
            priority,
            Rect::new(0, 0, 800, 600),
        )))
    }

    fn table(id: u64) -> Arc<Table> {
        let info = WindowInfo::new(WindowHandle(id), format!("Table {id}"), Rect::new(0, 0, 10, 10));
        Arc::new(Table::new(&info, ActivityUse::Active))
    }

    #[test]
    fn activity_use_forces_stacking() {
        let slot = slot(ActivityUse::Active, 1);
        assert!(!slot.can_stack());

        slot.set_activity_use(ActivityUse::Inactive);
        assert!(slot.can_stack());

        slot.set_activity_use(ActivityUse::Aside);
        assert!(!slot.can_stack());
    }

    #[test]
    fn changes_are_published_with_old_and_new_values() {
        let slot = slot(ActivityUse::Inactive, 3);
        let mut events = slot.subscribe();

        slot.set_priority(1);
        slot.set_activity_use(ActivityUse::Active);

        assert_eq!(
            events.try_recv().unwrap(),
            SlotEvent::PriorityChanged {
                slot: slot.id(),
                old: 3,
                new: 1
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SlotEvent::ActivityUseChanged {
                slot: slot.id(),
                old: ActivityUse::Inactive,
                new: ActivityUse::Active
            }
        );
    }

    #[test]
    fn equality_ignores_occupancy_and_identity() {
        let a = slot(ActivityUse::Active, 1);
        let b = slot(ActivityUse::Active, 1);
        assert!(a.bind(&table(1)));

        assert_ne!(a.id(), b.id());
        assert_eq!(*a, *b);

        b.set_priority(2);
        assert_ne!(*a, *b);
    }

    #[test]
    fn bind_links_both_sides_and_is_idempotent() {
        let slot = slot(ActivityUse::Inactive, 1);
        let t = table(7);

        assert!(slot.bind(&t));
        assert!(slot.bind(&t));

        assert_eq!(slot.occupant_count(), 1);
        assert_eq!(t.preferred_slot_id(), Some(slot.id()));
    }

    #[test]
    fn non_stackable_slot_holds_one_table() {
        let slot = slot(ActivityUse::Active, 1);
        assert!(slot.bind(&table(1)));
        assert!(!slot.bind(&table(2)));
        assert_eq!(slot.occupant_count(), 1);
    }

    #[test]
    fn unbind_matches_window_handle_not_instance() {
        let slot = slot(ActivityUse::Inactive, 1);
        let original = table(4);
        slot.bind(&original);

        let recreated = table(4);
        assert!(slot.unbind(&recreated));
        assert!(slot.is_empty());
        assert!(!original.is_bound());
    }

    #[test]
    fn unbind_of_unknown_table_is_a_no_op() {
        let slot = slot(ActivityUse::Inactive, 1);
        let bound = table(1);
        slot.bind(&bound);

        assert!(!slot.unbind(&table(2)));
        assert_eq!(slot.occupant_count(), 1);
        assert!(bound.is_bound());
    }

    #[test]
    fn rebinding_moves_table_between_slots() {
        let first = slot(ActivityUse::Inactive, 1);
        let second = slot(ActivityUse::Inactive, 2);
        let t = table(3);

        first.bind(&t);
        second.bind(&t);

        assert!(first.is_empty());
        assert!(second.is_occupied_by(WindowHandle(3)));
        assert_eq!(t.preferred_slot_id(), Some(second.id()));
    }

    #[test]
    fn rejected_bind_keeps_existing_binding() {
        let a = slot(ActivityUse::Active, 1);
        let b = slot(ActivityUse::Active, 2);
        let t = table(1);
        assert!(a.bind(&t));
        assert!(b.bind(&table(2)));

        assert!(!b.bind(&t));

        assert!(a.is_occupied_by(WindowHandle(1)));
        assert_eq!(t.preferred_slot_id(), Some(a.id()));
        assert_eq!(b.occupant_count(), 1);
        assert!(!b.is_occupied_by(WindowHandle(1)));
    }

    #[test]
    fn concurrent_binds_keep_each_table_in_one_slot() {
        let slots = vec![
            slot(ActivityUse::Inactive, 1),
            slot(ActivityUse::Active, 2),
            slot(ActivityUse::Active, 3),
        ];
        let tables: Vec<_> = (1..=4).map(table).collect();

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let slots = &slots;
                let tables = &tables;
                scope.spawn(move || {
                    for i in 0..500 {
                        let t = &tables[(i + worker) % tables.len()];
                        let s = &slots[(i * 7 + worker) % slots.len()];
                        if i % 5 == 0 {
                            s.unbind(t);
                        } else {
                            s.bind(t);
                        }
                    }
                });
            }
        });

        for t in &tables {
            let holders: Vec<_> = slots
                .iter()
                .filter(|s| s.is_occupied_by(t.handle()))
                .collect();
            assert!(holders.len() <= 1, "table {} is in two slots", t.handle());
            assert_eq!(t.preferred_slot_id(), holders.first().map(|s| s.id()));
        }
        for s in slots.iter().filter(|s| !s.can_stack()) {
            assert!(s.occupant_count() <= 1);
        }
    }
}
