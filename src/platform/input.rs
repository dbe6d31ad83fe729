use crate::models::hotkey::{HotKey, HotKeyId};
use crate::platform::window::WindowHandle;
use crate::{Result, TableManagerError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Abstraction over global hotkey registration and synthetic keyboard input
#[cfg_attr(test, mockall::automock)]
pub trait InputProvider: Send + Sync {
    /// Register `hotkey` under `id` against `window`. Fails when the pair is already taken.
    fn register_hotkey(&self, id: HotKeyId, hotkey: &HotKey, window: WindowHandle) -> Result<()>;

    fn unregister_hotkey(&self, id: HotKeyId, window: WindowHandle) -> Result<()>;

    /// Window that currently has keyboard focus
    fn foreground_window(&self) -> Option<WindowHandle>;

    /// Type `hotkey` into the foreground window without waiting for it to be handled
    fn send_keys(&self, hotkey: &HotKey) -> Result<()>;
}

/// Default system-backed provider placeholder
#[derive(Debug, Default)]
pub struct SystemInputProvider;

impl SystemInputProvider {
    pub fn new() -> Self {
        Self
    }

    fn unavailable<T>() -> Result<T> {
        Err(TableManagerError::PlatformError(
            "SystemInputProvider is not implemented in this environment".into(),
        )
        .into())
    }
}

impl InputProvider for SystemInputProvider {
    fn register_hotkey(&self, _id: HotKeyId, _hotkey: &HotKey, _window: WindowHandle) -> Result<()> {
        Self::unavailable()
    }

    fn unregister_hotkey(&self, _id: HotKeyId, _window: WindowHandle) -> Result<()> {
        Self::unavailable()
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        None
    }

    fn send_keys(&self, _hotkey: &HotKey) -> Result<()> {
        Self::unavailable()
    }
}

/// Keystroke synthesized by [`InMemoryInputProvider::send_keys`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentKeys {
    pub target: Option<WindowHandle>,
    pub hotkey: HotKey,
}

/// In-memory hotkey table used by tests and embedders
#[derive(Debug, Default)]
pub struct InMemoryInputProvider {
    registered: Mutex<HashMap<HotKeyId, (HotKey, WindowHandle)>>,
    foreground: Mutex<Option<WindowHandle>>,
    sent: Mutex<Vec<SentKeys>>,
    rejects_all: AtomicBool,
}

impl InMemoryInputProvider {
    pub fn set_foreground(&self, window: Option<WindowHandle>) {
        *self.foreground.lock() = window;
    }

    /// Make every subsequent registration fail, as when another program holds the keys
    pub fn set_rejects_all(&self, rejects: bool) {
        self.rejects_all.store(rejects, Ordering::SeqCst);
    }

    pub fn is_registered(&self, hotkey: &HotKey, window: WindowHandle) -> bool {
        self.registered
            .lock()
            .values()
            .any(|(h, w)| h == hotkey && *w == window)
    }

    pub fn registration_count(&self) -> usize {
        self.registered.lock().len()
    }

    pub fn sent_keys(&self) -> Vec<SentKeys> {
        self.sent.lock().clone()
    }
}

impl InputProvider for InMemoryInputProvider {
    fn register_hotkey(&self, id: HotKeyId, hotkey: &HotKey, window: WindowHandle) -> Result<()> {
        if self.rejects_all.load(Ordering::SeqCst) {
            return Err(TableManagerError::PlatformError(format!(
                "hotkey {} is held by another application",
                hotkey
            ))
            .into());
        }

        let mut registered = self.registered.lock();
        if registered.values().any(|(h, w)| h == hotkey && *w == window) {
            return Err(TableManagerError::HotKeyAlreadyRegistered {
                hotkey: hotkey.to_string(),
                window: window.0,
            }
            .into());
        }
        registered.insert(id, (hotkey.clone(), window));
        Ok(())
    }

    fn unregister_hotkey(&self, id: HotKeyId, window: WindowHandle) -> Result<()> {
        let mut registered = self.registered.lock();
        match registered.get(&id) {
            Some((_, w)) if *w == window => {
                registered.remove(&id);
                Ok(())
            }
            other => Err(TableManagerError::HotKeyNotRegistered {
                hotkey: other.map_or_else(|| id.to_string(), |(hotkey, _)| hotkey.to_string()),
                window: window.0,
            }
            .into()),
        }
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        *self.foreground.lock()
    }

    fn send_keys(&self, hotkey: &HotKey) -> Result<()> {
        let target = self.foreground_window();
        self.sent.lock().push(SentKeys {
            target,
            hotkey: hotkey.clone(),
        });
        Ok(())
    }
}
