use crate::models::{HotKey, HotKeyAction, HotKeyId};
use crate::platform::{InputProvider, WindowHandle};
use crate::{Result, TableManagerError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One global hotkey held against a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotKeyRegistration {
    pub id: HotKeyId,
    pub hotkey: HotKey,
    pub window: WindowHandle,
    pub action: HotKeyAction,
}

/// Outcome of a triggered hotkey message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotKeyDispatch {
    /// The registration belongs to the focused window; the caller performs the action
    Claimed {
        action: HotKeyAction,
        window: WindowHandle,
    },
    /// Not ours; the aside combination was typed into the foreground window instead
    Forwarded { target: Option<WindowHandle> },
}

/// Result of moving every registration to a new combination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconfigureReport {
    pub moved: usize,
    pub failed: Vec<(WindowHandle, String)>,
}

/// Registry of OS-level hotkey registrations keyed by (combination, window)
pub struct HotKeyRegistry {
    input: Arc<dyn InputProvider>,
    aside: HotKey,
    next_id: u32,
    by_id: HashMap<HotKeyId, HotKeyRegistration>,
    by_binding: HashMap<(HotKey, WindowHandle), HotKeyId>,
}

impl HotKeyRegistry {
    pub fn new(input: Arc<dyn InputProvider>, aside: HotKey) -> Self {
        Self {
            input,
            aside,
            next_id: 1,
            by_id: HashMap::new(),
            by_binding: HashMap::new(),
        }
    }

    pub fn aside_hotkey(&self) -> &HotKey {
        &self.aside
    }

    /// Register `hotkey` against `window`. A pair that is already held is rejected
    /// and the existing registration keeps its id.
    pub fn register(
        &mut self,
        hotkey: HotKey,
        window: WindowHandle,
        action: HotKeyAction,
    ) -> Result<HotKeyId> {
        if let Some(existing) = self.by_binding.get(&(hotkey.clone(), window)) {
            warn!(
                hotkey = %hotkey,
                window = %window,
                id = %existing,
                "Hotkey already registered for window"
            );
            return Err(TableManagerError::HotKeyAlreadyRegistered {
                hotkey: hotkey.to_string(),
                window: window.0,
            }
            .into());
        }

        let id = HotKeyId(self.next_id);
        self.next_id += 1;

        if let Err(err) = self.input.register_hotkey(id, &hotkey, window) {
            warn!(hotkey = %hotkey, window = %window, error = %err, "Hotkey registration failed");
            return Err(err);
        }

        self.by_binding.insert((hotkey.clone(), window), id);
        self.by_id.insert(
            id,
            HotKeyRegistration {
                id,
                hotkey,
                window,
                action,
            },
        );
        debug!(id = %id, window = %window, "Registered hotkey");
        Ok(id)
    }

    /// Drop the registration for the pair. Unknown pairs are logged and ignored.
    pub fn unregister(&mut self, hotkey: &HotKey, window: WindowHandle) -> bool {
        let Some(id) = self.by_binding.remove(&(hotkey.clone(), window)) else {
            warn!(hotkey = %hotkey, window = %window, "No hotkey registered for window");
            return false;
        };
        self.by_id.remove(&id);

        if let Err(err) = self.input.unregister_hotkey(id, window) {
            warn!(id = %id, window = %window, error = %err, "OS refused to release hotkey");
        }
        debug!(id = %id, window = %window, "Unregistered hotkey");
        true
    }

    /// Release every registration held against `window`
    pub fn unregister_window(&mut self, window: WindowHandle) -> usize {
        let hotkeys: Vec<HotKey> = self
            .by_binding
            .keys()
            .filter(|(_, w)| *w == window)
            .map(|(hotkey, _)| hotkey.clone())
            .collect();

        hotkeys
            .iter()
            .filter(|hotkey| self.unregister(hotkey, window))
            .count()
    }

    /// Release everything, as on shutdown
    pub fn unregister_all(&mut self) -> usize {
        self.registrations()
            .into_iter()
            .filter(|registration| self.unregister(&registration.hotkey, registration.window))
            .count()
    }

    /// Route a triggered hotkey message
    pub fn dispatch(&self, id: HotKeyId) -> HotKeyDispatch {
        let foreground = self.input.foreground_window();

        if let Some(registration) = self.by_id.get(&id) {
            if foreground == Some(registration.window) {
                return HotKeyDispatch::Claimed {
                    action: registration.action,
                    window: registration.window,
                };
            }
        }

        // Fire and forget so the keystroke still reaches the focused window
        if let Err(err) = self.input.send_keys(&self.aside) {
            warn!(hotkey = %self.aside, error = %err, "Failed to forward hotkey");
        }
        HotKeyDispatch::Forwarded { target: foreground }
    }

    /// Move every registration of the current aside combination to `hotkey`
    pub fn reconfigure(&mut self, hotkey: HotKey) -> ReconfigureReport {
        let mut report = ReconfigureReport::default();
        if hotkey == self.aside {
            return report;
        }

        let old = std::mem::replace(&mut self.aside, hotkey.clone());
        let mut stale: Vec<HotKeyRegistration> = self
            .by_id
            .values()
            .filter(|registration| registration.hotkey == old)
            .cloned()
            .collect();
        stale.sort_by_key(|registration| registration.id);

        for registration in stale {
            self.unregister(&registration.hotkey, registration.window);
            match self.register(hotkey.clone(), registration.window, registration.action) {
                Ok(_) => report.moved += 1,
                Err(err) => report.failed.push((registration.window, err.to_string())),
            }
        }

        info!(
            old = %old,
            new = %hotkey,
            moved = report.moved,
            failed = report.failed.len(),
            "Re-registered hotkeys"
        );
        report
    }

    pub fn lookup(&self, hotkey: &HotKey, window: WindowHandle) -> Option<HotKeyId> {
        self.by_binding.get(&(hotkey.clone(), window)).copied()
    }

    /// Registrations in id order
    pub fn registrations(&self) -> Vec<HotKeyRegistration> {
        let mut registrations: Vec<_> = self.by_id.values().cloned().collect();
        registrations.sort_by_key(|registration| registration.id);
        registrations
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
