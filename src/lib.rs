//! TableManager - slot-based window arranger for multi-table play
//!
//! TableManager watches the windows of an external client, binds every table window
//! to a screen slot from the active profile and keeps global hotkeys routed to the
//! right window while tables come and go.

pub mod config;
pub mod logging;
pub mod models;
pub mod platform;
pub mod services;
pub mod ui;

pub use models::*;
pub use services::*;

/// Result type alias for TableManager operations
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to TableManager operations
#[derive(thiserror::Error, Debug)]
pub enum TableManagerError {
    #[error("No profiles are configured")]
    NoProfiles,

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Hotkey {hotkey} is already registered for window {window}")]
    HotKeyAlreadyRegistered { hotkey: String, window: u64 },

    #[error("Hotkey {hotkey} is not registered for window {window}")]
    HotKeyNotRegistered { hotkey: String, window: u64 },

    #[error("Window not found: {0}")]
    WindowNotFound(u64),

    #[error("Platform error: {0}")]
    PlatformError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
