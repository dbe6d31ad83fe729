use crate::{Result, TableManagerError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Opaque OS identifier of a top-level window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Screen rectangle in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(TableManagerError::ValidationError(format!(
                "Rectangle dimensions must be positive, got {}x{}",
                self.width, self.height
            ))
            .into());
        }
        Ok(())
    }
}

/// Window metadata reported by the platform
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    pub frame: Rect,
}

impl WindowInfo {
    pub fn new(handle: WindowHandle, title: impl Into<String>, frame: Rect) -> Self {
        Self {
            handle,
            title: title.into(),
            frame,
        }
    }
}

/// Abstraction over the OS window APIs used to discover and place tables
pub trait WindowProvider: Send + Sync {
    /// Snapshot the handles of all top-level windows
    fn list_windows(&self) -> Result<Vec<WindowHandle>>;

    /// Query one window. `Ok(None)` means it closed since it was enumerated.
    fn window_info(&self, handle: WindowHandle) -> Result<Option<WindowInfo>>;

    /// Move / resize a window
    fn set_window_frame(&self, handle: WindowHandle, frame: Rect) -> Result<()>;
}

/// Default system-backed provider placeholder
#[derive(Debug, Default)]
pub struct SystemWindowProvider;

impl SystemWindowProvider {
    pub fn new() -> Self {
        Self
    }

    fn unavailable<T>() -> Result<T> {
        Err(TableManagerError::PlatformError(
            "SystemWindowProvider is not implemented in this environment".into(),
        )
        .into())
    }
}

impl WindowProvider for SystemWindowProvider {
    fn list_windows(&self) -> Result<Vec<WindowHandle>> {
        Self::unavailable()
    }

    fn window_info(&self, _handle: WindowHandle) -> Result<Option<WindowInfo>> {
        Self::unavailable()
    }

    fn set_window_frame(&self, _handle: WindowHandle, _frame: Rect) -> Result<()> {
        Self::unavailable()
    }
}

/// Fail fast when `provider` cannot enumerate windows at all, so a missing
/// backend is reported once at startup instead of on every tick
pub fn ensure_available(provider: &dyn WindowProvider) -> Result<()> {
    provider.list_windows().map(|windows| {
        debug!(windows = windows.len(), "Window backend available");
    })
}

/// In-memory window table used by tests and embedders
#[derive(Debug, Default)]
pub struct InMemoryWindowProvider {
    windows: RwLock<BTreeMap<WindowHandle, WindowInfo>>,
    broken: RwLock<HashSet<WindowHandle>>,
    enumeration_fails: AtomicBool,
}

impl InMemoryWindowProvider {
    pub fn new_with(windows: Vec<WindowInfo>) -> Self {
        let provider = Self::default();
        for window in windows {
            provider.open_window(window);
        }
        provider
    }

    pub fn open_window(&self, window: WindowInfo) {
        self.windows.write().insert(window.handle, window);
    }

    pub fn close_window(&self, handle: WindowHandle) -> bool {
        self.broken.write().remove(&handle);
        self.windows.write().remove(&handle).is_some()
    }

    pub fn rename_window(&self, handle: WindowHandle, title: impl Into<String>) {
        if let Some(window) = self.windows.write().get_mut(&handle) {
            window.title = title.into();
        }
    }

    /// Make `window_info` fail for one window, as if it vanished mid-query
    pub fn break_window(&self, handle: WindowHandle) {
        self.broken.write().insert(handle);
    }

    pub fn set_enumeration_failure(&self, fails: bool) {
        self.enumeration_fails.store(fails, Ordering::SeqCst);
    }

    pub fn frame_of(&self, handle: WindowHandle) -> Option<Rect> {
        self.windows.read().get(&handle).map(|window| window.frame)
    }
}

impl WindowProvider for InMemoryWindowProvider {
    fn list_windows(&self) -> Result<Vec<WindowHandle>> {
        if self.enumeration_fails.load(Ordering::SeqCst) {
            return Err(
                TableManagerError::PlatformError("window enumeration failed".into()).into(),
            );
        }
        Ok(self.windows.read().keys().copied().collect())
    }

    fn window_info(&self, handle: WindowHandle) -> Result<Option<WindowInfo>> {
        if self.broken.read().contains(&handle) {
            return Err(TableManagerError::WindowNotFound(handle.0).into());
        }
        Ok(self.windows.read().get(&handle).cloned())
    }

    fn set_window_frame(&self, handle: WindowHandle, frame: Rect) -> Result<()> {
        match self.windows.write().get_mut(&handle) {
            Some(window) => {
                window.frame = frame;
                Ok(())
            }
            None => Err(TableManagerError::WindowNotFound(handle.0).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_window(id: u64) -> WindowInfo {
        WindowInfo::new(
            WindowHandle(id),
            format!("Table {id}"),
            Rect::new(0, 0, 800, 600),
        )
    }

    #[test]
    fn rect_validation_rejects_empty_area() {
        assert!(Rect::new(0, 0, 800, 600).validate().is_ok());
        assert!(Rect::new(0, 0, 0, 600).validate().is_err());
    }

    #[test]
    fn in_memory_provider_lists_in_handle_order() {
        let provider = InMemoryWindowProvider::new_with(vec![sample_window(3), sample_window(1)]);
        let handles = provider.list_windows().unwrap();
        assert_eq!(handles, vec![WindowHandle(1), WindowHandle(3)]);
    }

    #[test]
    fn broken_window_fails_only_its_own_query() {
        let provider = InMemoryWindowProvider::new_with(vec![sample_window(1), sample_window(2)]);
        provider.break_window(WindowHandle(1));

        assert!(provider.window_info(WindowHandle(1)).is_err());
        assert!(provider.window_info(WindowHandle(2)).unwrap().is_some());
    }

    #[test]
    fn set_window_frame_updates_geometry() {
        let provider = InMemoryWindowProvider::new_with(vec![sample_window(1)]);
        let frame = Rect::new(100, 50, 640, 480);
        provider.set_window_frame(WindowHandle(1), frame).unwrap();
        assert_eq!(provider.frame_of(WindowHandle(1)), Some(frame));

        assert!(provider.set_window_frame(WindowHandle(9), frame).is_err());
    }

    #[test]
    fn enumeration_failure_is_reported() {
        let provider = InMemoryWindowProvider::default();
        provider.set_enumeration_failure(true);
        assert!(provider.list_windows().is_err());
    }
}
