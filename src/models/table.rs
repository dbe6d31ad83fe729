use crate::models::slot::{ActivityUse, Slot, SlotId};
use crate::platform::window::{Rect, WindowHandle, WindowInfo};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// One externally-owned table window tracked by the manager
#[derive(Debug)]
pub struct Table {
    handle: WindowHandle,
    /// Placeholder without a live window
    is_virtual: bool,
    title: RwLock<String>,
    frame: RwLock<Rect>,
    role: RwLock<ActivityUse>,
    /// Set by eviction; keeps the table out of automatic placement
    evicted: AtomicBool,
    detected_at: DateTime<Utc>,
    /// Back-reference, written only by `Slot` while it holds its occupancy locks
    preferred_slot: Mutex<Option<Weak<Slot>>>,
}

impl Table {
    pub fn new(info: &WindowInfo, role: ActivityUse) -> Self {
        Self::build(info.handle, info.title.clone(), info.frame, role, false)
    }

    pub fn placeholder(handle: WindowHandle, title: impl Into<String>, role: ActivityUse) -> Self {
        Self::build(handle, title.into(), Rect::default(), role, true)
    }

    fn build(
        handle: WindowHandle,
        title: String,
        frame: Rect,
        role: ActivityUse,
        is_virtual: bool,
    ) -> Self {
        Self {
            handle,
            is_virtual,
            title: RwLock::new(title),
            frame: RwLock::new(frame),
            role: RwLock::new(role),
            evicted: AtomicBool::new(false),
            detected_at: Utc::now(),
            preferred_slot: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub fn title(&self) -> String {
        self.title.read().clone()
    }

    pub fn frame(&self) -> Rect {
        *self.frame.read()
    }

    pub fn role(&self) -> ActivityUse {
        *self.role.read()
    }

    pub fn set_role(&self, role: ActivityUse) {
        *self.role.write() = role;
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    pub fn set_evicted(&self, evicted: bool) {
        self.evicted.store(evicted, Ordering::SeqCst);
    }

    /// Refresh title and geometry from a newer observation of the same window
    pub fn update_from(&self, info: &WindowInfo) {
        if *self.title.read() != info.title {
            *self.title.write() = info.title.clone();
        }
        *self.frame.write() = info.frame;
    }

    pub fn preferred_slot(&self) -> Option<Arc<Slot>> {
        self.preferred_slot.lock().as_ref().and_then(Weak::upgrade)
    }

    pub fn preferred_slot_id(&self) -> Option<SlotId> {
        self.preferred_slot().map(|slot| slot.id())
    }

    pub fn is_bound(&self) -> bool {
        self.preferred_slot().is_some()
    }

    /// Locked back-reference. Callers hold the occupancy locks of every slot they
    /// are about to change.
    pub(crate) fn slot_link(&self) -> MutexGuard<'_, Option<Weak<Slot>>> {
        self.preferred_slot.lock()
    }

    /// Drop the back-reference if it still points at `slot`
    pub(crate) fn clear_slot_if(&self, slot: SlotId) {
        let mut preferred = self.preferred_slot.lock();
        let points_here = preferred
            .as_ref()
            .and_then(Weak::upgrade)
            .map_or(true, |current| current.id() == slot);
        if points_here {
            *preferred = None;
        }
    }
}

/// Play statistics supplied by the stats collaborator
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TableStats {
    /// Hands observed at the table
    pub hands: u32,
    /// Percentage of hands where players voluntarily put money in the pot
    pub vpip: f64,
}

/// Thresholds for leaving tables that play too tight. Zero disables a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutoLeavePolicy {
    #[serde(default)]
    pub vpip: u32,
    #[serde(default)]
    pub hands: u32,
}

impl AutoLeavePolicy {
    pub fn is_enabled(&self) -> bool {
        self.vpip > 0 && self.hands > 0
    }

    /// Leave once enough hands were seen and VPIP stayed below the threshold
    pub fn should_leave(&self, stats: &TableStats) -> bool {
        self.is_enabled() && stats.hands >= self.hands && stats.vpip < f64::from(self.vpip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_from_refreshes_title_and_frame() {
        let info = WindowInfo::new(WindowHandle(1), "Table 1", Rect::new(0, 0, 10, 10));
        let table = Table::new(&info, ActivityUse::Inactive);

        let moved = WindowInfo::new(WindowHandle(1), "Table 1 - Blinds 2/4", Rect::new(5, 5, 10, 10));
        table.update_from(&moved);

        assert_eq!(table.title(), "Table 1 - Blinds 2/4");
        assert_eq!(table.frame(), Rect::new(5, 5, 10, 10));
        assert!(!table.is_virtual());
    }

    #[test]
    fn placeholder_is_virtual_and_unbound() {
        let table = Table::placeholder(WindowHandle(99), "Reserved", ActivityUse::Active);
        assert!(table.is_virtual());
        assert!(!table.is_bound());
    }

    #[test]
    fn auto_leave_requires_both_thresholds() {
        let stats = TableStats {
            hands: 60,
            vpip: 12.5,
        };

        assert!(!AutoLeavePolicy::default().should_leave(&stats));
        assert!(!AutoLeavePolicy { vpip: 15, hands: 0 }.should_leave(&stats));

        let policy = AutoLeavePolicy { vpip: 15, hands: 50 };
        assert!(policy.should_leave(&stats));
        assert!(!policy.should_leave(&TableStats { hands: 40, vpip: 5.0 }));
        assert!(!policy.should_leave(&TableStats { hands: 80, vpip: 22.0 }));
    }
}
