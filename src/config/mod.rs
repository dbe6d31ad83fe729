//! Configuration management for TableManager

pub mod parser;
pub mod shared;

pub use parser::{
    Config, ConfigError, HotKeyConfig, TableMatchConfig, WatcherConfig, CONFIG_ENV_VAR,
};
pub use shared::{ConfigEvent, SharedConfig};
