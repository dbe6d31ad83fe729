use crate::config::{ConfigEvent, SharedConfig};
use crate::models::{
    ActivityUse, HotKey, HotKeyAction, HotKeyId, Slot, SlotEvent, Table, TableStats,
};
use crate::platform::{InputProvider, WindowHandle, WindowProvider};
use crate::services::hotkey_registry::{
    HotKeyDispatch, HotKeyRegistration, HotKeyRegistry, ReconfigureReport,
};
use crate::services::slot_assigner::SlotAssigner;
use crate::services::table_watcher::{self, TableCriteria, WatcherHandle};
use crate::ui::{TableSnapshot, TableSummary};
use crate::{Result, TableManagerError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

const SLOT_EVENT_CAPACITY: usize = 256;

/// Placeholder handles live above every real window handle
const PLACEHOLDER_HANDLE_BASE: u64 = 1 << 63;

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub enumeration_failed: bool,
    pub events: usize,
    pub opened: usize,
    pub closed: usize,
    pub updated: usize,
    pub skipped_windows: usize,
    pub placed: usize,
    pub unplaced: usize,
}

/// Every live table, in discovery order
#[derive(Debug, Default)]
struct KnownTables {
    next_seq: u64,
    by_handle: HashMap<WindowHandle, (u64, Arc<Table>)>,
}

impl KnownTables {
    fn insert(&mut self, table: Arc<Table>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_handle.insert(table.handle(), (seq, table));
    }

    fn remove(&mut self, handle: WindowHandle) -> Option<Arc<Table>> {
        self.by_handle.remove(&handle).map(|(_, table)| table)
    }

    fn get(&self, handle: WindowHandle) -> Option<Arc<Table>> {
        self.by_handle.get(&handle).map(|(_, table)| Arc::clone(table))
    }

    fn in_discovery_order(&self) -> Vec<Arc<Table>> {
        let mut entries: Vec<_> = self.by_handle.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries
            .into_iter()
            .map(|(_, table)| Arc::clone(table))
            .collect()
    }
}

/// Slots of the active profile
#[derive(Debug)]
struct Layout {
    profile: String,
    slots: Vec<Arc<Slot>>,
}

/// Owns the known tables and the active layout, and drives the watcher
pub struct TableManager {
    config: SharedConfig,
    windows: Arc<dyn WindowProvider>,
    assigner: SlotAssigner,
    criteria: TableCriteria,
    default_role: ActivityUse,
    poll_interval: Duration,
    shutdown_grace: Duration,
    known_tables: Mutex<KnownTables>,
    layout: RwLock<Layout>,
    slot_sender: broadcast::Sender<SlotEvent>,
    slot_events: Mutex<broadcast::Receiver<SlotEvent>>,
    config_events: Mutex<broadcast::Receiver<ConfigEvent>>,
    hotkeys: Mutex<HotKeyRegistry>,
    snapshots: watch::Sender<TableSnapshot>,
    generation: AtomicU64,
    next_placeholder: AtomicU64,
    watcher: Mutex<Option<WatcherHandle>>,
    /// Held across every read-then-bind sequence so eviction, role changes, profile
    /// swaps and removals never interleave with a placement pass. Taken before any
    /// other manager lock.
    placement: Mutex<()>,
    /// Set by `stop` under the hotkey lock so a tick still finishing on the
    /// blocking pool cannot register again
    hotkeys_released: AtomicBool,
}

impl TableManager {
    /// Build a manager for the active profile. Fails when no profile is configured.
    pub fn new(
        config: SharedConfig,
        windows: Arc<dyn WindowProvider>,
        input: Arc<dyn InputProvider>,
    ) -> Result<Self> {
        let snapshot = config.snapshot();
        if snapshot.profiles.is_empty() {
            error!("No profiles are configured, refusing to start");
            return Err(TableManagerError::NoProfiles.into());
        }
        let profile = snapshot.active_profile().cloned().ok_or_else(|| {
            TableManagerError::ProfileNotFound(snapshot.active_profile.clone())
        })?;
        let criteria = TableCriteria::new(&snapshot.tables.title_patterns)?;

        let (slot_sender, slot_events) = broadcast::channel(SLOT_EVENT_CAPACITY);
        let slots = profile.build_slots(&slot_sender);
        let config_events = config.subscribe();
        let (snapshots, _) = watch::channel(TableSnapshot::default());

        info!(
            profile = %profile.name,
            slots = slots.len(),
            "Table manager initialized"
        );

        Ok(Self {
            hotkeys: Mutex::new(HotKeyRegistry::new(input, snapshot.hotkeys.aside.clone())),
            config,
            windows,
            assigner: SlotAssigner::new(),
            criteria,
            default_role: snapshot.tables.default_role,
            poll_interval: snapshot.watcher.poll_interval(),
            shutdown_grace: snapshot.watcher.shutdown_grace(),
            known_tables: Mutex::new(KnownTables::default()),
            layout: RwLock::new(Layout {
                profile: profile.name,
                slots,
            }),
            slot_sender,
            slot_events: Mutex::new(slot_events),
            config_events: Mutex::new(config_events),
            snapshots,
            generation: AtomicU64::new(0),
            next_placeholder: AtomicU64::new(0),
            watcher: Mutex::new(None),
            placement: Mutex::new(()),
            hotkeys_released: AtomicBool::new(false),
        })
    }

    /// Spawn the polling task on the current runtime
    #[instrument(skip(self))]
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            warn!("Table watcher is already running");
            return Ok(());
        }

        tokio::runtime::Handle::try_current().map_err(|err| {
            TableManagerError::PlatformError(format!("No async runtime available: {}", err))
        })?;

        self.hotkeys_released.store(false, Ordering::SeqCst);
        let manager = Arc::downgrade(self);
        *watcher = Some(table_watcher::spawn(self.poll_interval, move || {
            if let Some(manager) = manager.upgrade() {
                manager.reconcile();
            }
        }));
        info!(interval_ms = self.poll_interval.as_millis() as u64, "Table manager started");
        Ok(())
    }

    /// Stop polling, give the running tick the grace delay, then release hotkeys
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let Some(handle) = self.watcher.lock().take() else {
            debug!("Table watcher is not running");
            return;
        };

        let clean = handle.stop(self.shutdown_grace).await;
        let released = {
            let mut hotkeys = self.hotkeys.lock();
            self.hotkeys_released.store(true, Ordering::SeqCst);
            hotkeys.unregister_all()
        };
        info!(clean, released_hotkeys = released, "Table manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// One reconciliation pass: apply pending events, sync with the OS window list,
    /// place every table that needs a slot and publish a snapshot.
    pub fn reconcile(&self) -> TickReport {
        let mut report = TickReport {
            events: self.process_events(),
            ..TickReport::default()
        };

        let observation = match table_watcher::observe(self.windows.as_ref(), &self.criteria) {
            Ok(observation) => observation,
            Err(err) => {
                warn!(error = %err, "Window enumeration failed, skipping tick");
                report.enumeration_failed = true;
                return report;
            }
        };
        report.skipped_windows = observation.skipped.len();

        let known = self.known_tables.lock().in_discovery_order();
        let changes = table_watcher::diff(&known, &observation);
        report.opened = changes.opened.len();
        report.closed = changes.closed.len();
        report.updated = changes.updated.len();

        for handle in &changes.closed {
            self.forget(*handle);
        }

        for info in &changes.updated {
            if let Some(table) = self.known_tables.lock().get(info.handle) {
                table.update_from(info);
            }
        }

        for info in &changes.opened {
            let table = Arc::new(Table::new(info, self.default_role));
            debug!(window = %info.handle, title = %info.title, "Detected table");
            self.known_tables.lock().insert(table);
        }

        self.ensure_hotkeys();
        let started = Instant::now();
        let (placed, unplaced) = self.place_all();
        debug!(duration_us = started.elapsed().as_micros() as u64, "Placement pass");
        report.placed = placed;
        report.unplaced = unplaced;
        self.publish_snapshot();

        if report.opened + report.closed > 0 {
            info!(
                opened = report.opened,
                closed = report.closed,
                unplaced = report.unplaced,
                "Tables changed"
            );
        }
        debug!(?report, "Tick complete");
        report
    }

    /// Drain configuration and slot change notifications. Returns how many were handled.
    pub fn process_events(&self) -> usize {
        let mut handled = 0;

        loop {
            let event = self.config_events.lock().try_recv();
            match event {
                Ok(event) => {
                    self.handle_config_event(event);
                    handled += 1;
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Missed configuration events, resyncing");
                    self.resync_with_config();
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        loop {
            let event = self.slot_events.lock().try_recv();
            match event {
                Ok(event) => {
                    self.handle_slot_event(event);
                    handled += 1;
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "Missed slot events, rechecking every slot");
                    for slot in self.slots() {
                        self.release_mismatched(&slot);
                    }
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        handled
    }

    /// Unbind `handle` and keep it out of automatic placement
    pub fn evict(&self, handle: WindowHandle) -> bool {
        let Some(table) = self.table(handle) else {
            warn!(window = %handle, "Cannot evict untracked table");
            return false;
        };

        {
            let _placement = self.placement.lock();
            table.set_evicted(true);
            if let Some(slot) = table.preferred_slot() {
                slot.unbind(&table);
            }
        }
        info!(window = %handle, "Evicted table");
        self.publish_snapshot();
        true
    }

    /// Let an evicted table take part in placement again
    pub fn readmit(&self, handle: WindowHandle) -> bool {
        let Some(table) = self.table(handle) else {
            warn!(window = %handle, "Cannot readmit untracked table");
            return false;
        };
        {
            let _placement = self.placement.lock();
            table.set_evicted(false);
            self.place(&self.slots(), &table);
        }
        self.publish_snapshot();
        true
    }

    /// Apply play statistics and evict the table when the auto-leave policy says so
    pub fn apply_stats(&self, handle: WindowHandle, stats: TableStats) -> bool {
        let policy = self.config.auto_leave();
        if !policy.should_leave(&stats) {
            return false;
        }
        info!(
            window = %handle,
            hands = stats.hands,
            vpip = stats.vpip,
            "Auto-leave thresholds reached"
        );
        self.evict(handle)
    }

    /// Change the role of a table and move it to a matching slot
    pub fn set_role(&self, handle: WindowHandle, role: ActivityUse) -> bool {
        let Some(table) = self.table(handle) else {
            warn!(window = %handle, "Cannot change role of untracked table");
            return false;
        };

        {
            let _placement = self.placement.lock();
            table.set_role(role);
            if !table.is_evicted() {
                self.place(&self.slots(), &table);
            }
        }
        self.publish_snapshot();
        true
    }

    /// Reserve a place in the layout without a window behind it
    pub fn add_placeholder(&self, title: impl Into<String>, role: ActivityUse) -> WindowHandle {
        let handle = WindowHandle(
            PLACEHOLDER_HANDLE_BASE + self.next_placeholder.fetch_add(1, Ordering::SeqCst),
        );
        let table = Arc::new(Table::placeholder(handle, title, role));
        let _placement = self.placement.lock();
        self.known_tables.lock().insert(Arc::clone(&table));
        self.place(&self.slots(), &table);
        debug!(window = %handle, "Added placeholder table");
        handle
    }

    pub fn remove_placeholder(&self, handle: WindowHandle) -> bool {
        match self.table(handle) {
            Some(table) if table.is_virtual() => {
                self.forget(handle);
                true
            }
            _ => {
                warn!(window = %handle, "No placeholder with this handle");
                false
            }
        }
    }

    /// Route a triggered hotkey. A claimed aside hotkey toggles the table between
    /// aside and active.
    pub fn handle_hotkey(&self, id: HotKeyId) -> HotKeyDispatch {
        let dispatch = self.hotkeys.lock().dispatch(id);

        if let HotKeyDispatch::Claimed {
            action: HotKeyAction::ToggleAside,
            window,
        } = dispatch
        {
            if let Some(table) = self.table(window) {
                let role = match table.role() {
                    ActivityUse::Aside => ActivityUse::Active,
                    _ => ActivityUse::Aside,
                };
                debug!(window = %window, role = %role, "Toggling aside");
                self.set_role(window, role);
            }
        }
        dispatch
    }

    /// Switch to the named profile and re-place every table
    pub fn switch_profile(&self, name: &str) -> Result<()> {
        self.config.set_active_profile(name)?;
        self.activate_profile(name)?;
        self.place_all();
        self.publish_snapshot();
        Ok(())
    }

    /// Change the aside combination and move every registration to it
    pub fn set_aside_hotkey(&self, hotkey: HotKey) -> ReconfigureReport {
        self.config.set_aside_hotkey(hotkey.clone());
        let report = self.hotkeys.lock().reconfigure(hotkey);
        for (window, reason) in &report.failed {
            warn!(window = %window, reason = %reason, "Hotkey could not be moved");
        }
        report
    }

    pub fn known_tables(&self) -> Vec<Arc<Table>> {
        self.known_tables.lock().in_discovery_order()
    }

    pub fn table(&self, handle: WindowHandle) -> Option<Arc<Table>> {
        self.known_tables.lock().get(handle)
    }

    pub fn slots(&self) -> Vec<Arc<Slot>> {
        self.layout.read().slots.clone()
    }

    pub fn active_profile(&self) -> String {
        self.layout.read().profile.clone()
    }

    pub fn registered_hotkeys(&self) -> Vec<HotKeyRegistration> {
        self.hotkeys.lock().registrations()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<TableSnapshot> {
        self.snapshots.subscribe()
    }

    fn handle_config_event(&self, event: ConfigEvent) {
        match event {
            ConfigEvent::AsideHotKeyChanged { new, .. } => {
                let report = self.hotkeys.lock().reconfigure(new);
                for (window, reason) in &report.failed {
                    warn!(window = %window, reason = %reason, "Hotkey could not be moved");
                }
            }
            ConfigEvent::ActiveProfileChanged { new, .. } => {
                if let Err(err) = self.activate_profile(&new) {
                    warn!(profile = %new, error = %err, "Could not activate profile");
                }
            }
            ConfigEvent::AutoLeaveChanged(policy) => {
                debug!(vpip = policy.vpip, hands = policy.hands, "Auto-leave policy changed");
            }
        }
    }

    fn resync_with_config(&self) {
        let aside = self.config.aside_hotkey();
        self.hotkeys.lock().reconfigure(aside);

        if let Some(profile) = self.config.active_profile() {
            if let Err(err) = self.activate_profile(&profile.name) {
                warn!(profile = %profile.name, error = %err, "Could not activate profile");
            }
        }
    }

    fn handle_slot_event(&self, event: SlotEvent) {
        match event {
            SlotEvent::ActivityUseChanged { slot: slot_id, old, new } => {
                debug!(slot = %slot_id, old = %old, new = %new, "Slot activity changed");
                if let Some(slot) = self.slots().into_iter().find(|s| s.id() == slot_id) {
                    self.release_mismatched(&slot);
                }
                self.place_unbound();
            }
            SlotEvent::PriorityChanged { slot, old, new } => {
                let placed = self.place_unbound();
                debug!(slot = %slot, old, new, placed, "Slot priority changed");
            }
        }
    }

    /// Unbind occupants whose role no longer matches the slot
    fn release_mismatched(&self, slot: &Arc<Slot>) {
        let _placement = self.placement.lock();
        let activity_use = slot.activity_use();
        for table in slot.occupants() {
            if table.role() != activity_use {
                slot.unbind(&table);
            }
        }
    }

    fn activate_profile(&self, name: &str) -> Result<()> {
        if self.layout.read().profile == name {
            return Ok(());
        }

        let profile = self
            .config
            .snapshot()
            .profile(name)
            .cloned()
            .ok_or_else(|| TableManagerError::ProfileNotFound(name.to_string()))?;
        let slots = profile.build_slots(&self.slot_sender);

        let _placement = self.placement.lock();
        let old = {
            let mut layout = self.layout.write();
            let old = std::mem::replace(&mut layout.slots, slots);
            layout.profile = profile.name.clone();
            old
        };
        for slot in &old {
            slot.unbind_all();
        }

        info!(profile = %profile.name, slots = profile.slots.len(), "Activated profile");
        Ok(())
    }

    /// Remove a table and release everything it holds
    fn forget(&self, handle: WindowHandle) {
        let _placement = self.placement.lock();
        let Some(table) = self.known_tables.lock().remove(handle) else {
            return;
        };
        if let Some(slot) = table.preferred_slot() {
            slot.unbind(&table);
        }
        if !table.is_virtual() {
            self.hotkeys.lock().unregister_window(handle);
        }
        debug!(window = %handle, "Table removed");
    }

    /// Register the aside hotkey for tables that lack it; failures retry next tick
    fn ensure_hotkeys(&self) {
        let tables = self.known_tables();
        let mut hotkeys = self.hotkeys.lock();
        if self.hotkeys_released.load(Ordering::SeqCst) {
            return;
        }
        let aside = hotkeys.aside_hotkey().clone();

        for table in tables.iter().filter(|table| !table.is_virtual()) {
            if hotkeys.lookup(&aside, table.handle()).is_none() {
                let _ = hotkeys.register(aside.clone(), table.handle(), HotKeyAction::ToggleAside);
            }
        }
    }

    /// Place every non-evicted table in discovery order. Returns (newly placed, unplaced).
    fn place_all(&self) -> (usize, usize) {
        let _placement = self.placement.lock();
        let slots = self.slots();
        let mut placed = 0;
        let mut unplaced = 0;

        for table in self.known_tables() {
            if table.is_evicted() {
                continue;
            }
            let before = table.preferred_slot_id();
            match self.place(&slots, &table) {
                Some(slot) if before != Some(slot.id()) => placed += 1,
                Some(_) => {}
                None => unplaced += 1,
            }
        }

        (placed, unplaced)
    }

    /// Offer the current layout to every unbound, non-evicted table without
    /// touching tables that already hold a slot. Returns how many were placed.
    fn place_unbound(&self) -> usize {
        let _placement = self.placement.lock();
        let slots = self.slots();
        self.known_tables()
            .into_iter()
            .filter(|table| !table.is_evicted() && !table.is_bound())
            .filter(|table| self.place(&slots, table).is_some())
            .count()
    }

    /// Assign a slot and move the window there when the slot changed. Callers
    /// hold the placement lock.
    fn place(&self, slots: &[Arc<Slot>], table: &Arc<Table>) -> Option<Arc<Slot>> {
        let before = table.preferred_slot_id();
        let slot = self.assigner.assign(slots, table)?;

        if before != Some(slot.id()) && !table.is_virtual() {
            if let Err(err) = self.windows.set_window_frame(table.handle(), slot.frame()) {
                warn!(window = %table.handle(), error = %err, "Failed to move table window");
            }
        }
        Some(slot)
    }

    fn publish_snapshot(&self) {
        let tables = self
            .known_tables()
            .into_iter()
            .filter(|table| !table.is_virtual())
            .map(|table| {
                let slot = table.preferred_slot();
                TableSummary {
                    handle: table.handle(),
                    title: table.title(),
                    role: table.role(),
                    slot: slot.as_ref().map(|slot| slot.id()),
                    slot_priority: slot.as_ref().map(|slot| slot.priority()),
                    evicted: table.is_evicted(),
                    detected_at: table.detected_at(),
                }
            })
            .collect();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.snapshots.send_replace(TableSnapshot { generation, tables });
    }
}
