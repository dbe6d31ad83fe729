//! Core services for TableManager

pub mod hotkey_registry;
pub mod slot_assigner;
pub mod table_manager;
pub mod table_watcher;

pub use hotkey_registry::*;
pub use slot_assigner::*;
pub use table_manager::*;
pub use table_watcher::{diff, observe, Observation, TableCriteria, WatcherHandle, WindowDiff};
