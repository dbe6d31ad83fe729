//! Data models for TableManager

pub mod hotkey;
pub mod profile;
pub mod slot;
pub mod table;

pub use hotkey::*;
pub use profile::*;
pub use slot::*;
pub use table::*;
