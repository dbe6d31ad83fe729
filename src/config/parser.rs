use crate::models::{ActivityUse, AutoLeavePolicy, HotKey, Profile};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_ENV_VAR: &str = "TABLEMANAGER_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("No profiles are configured")]
    NoProfiles,
    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotKeyConfig {
    /// Combination that parks a table aside; forwarded to other windows untouched
    #[serde(default)]
    pub aside: HotKey,
}

impl Default for HotKeyConfig {
    fn default() -> Self {
        Self {
            aside: HotKey::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long `stop` waits for an in-flight tick
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_shutdown_grace_ms() -> u64 {
    100
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableMatchConfig {
    /// A window is a table when its title matches any pattern; empty matches all
    #[serde(default)]
    pub title_patterns: Vec<String>,
    /// Role given to newly detected tables
    #[serde(default)]
    pub default_role: ActivityUse,
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub active_profile: String,
    #[serde(default)]
    pub hotkeys: HotKeyConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub tables: TableMatchConfig,
    #[serde(default)]
    pub auto_leave: AutoLeavePolicy,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl Default for Config {
    fn default() -> Self {
        let profile = Profile::default_profile();
        Self {
            active_profile: profile.name.clone(),
            hotkeys: HotKeyConfig::default(),
            watcher: WatcherConfig::default(),
            tables: TableMatchConfig::default(),
            auto_leave: AutoLeavePolicy::default(),
            profiles: vec![profile],
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(
            "Loaded configuration from {} ({} profiles)",
            path.display(),
            config.profiles.len()
        );
        Ok(config)
    }

    /// Load `path`, falling back to the built-in defaults when the file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path.as_ref()) {
            Err(ConfigError::Io(ref e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No configuration at {}, using defaults",
                    path.as_ref().display()
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// `$TABLEMANAGER_CONFIG`, else `<config dir>/tablemanager/config.toml`
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tablemanager")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profiles.is_empty() {
            return Err(ConfigError::NoProfiles);
        }

        let mut names = HashSet::new();
        for profile in &self.profiles {
            if !names.insert(profile.name.as_str()) {
                return Err(ConfigError::validation(format!(
                    "Duplicate profile name: {}",
                    profile.name
                )));
            }
            profile
                .validate()
                .map_err(|err| ConfigError::validation(err.to_string()))?;
        }

        if !names.contains(self.active_profile.as_str()) {
            return Err(ConfigError::validation(format!(
                "Active profile '{}' does not exist",
                self.active_profile
            )));
        }

        if self.watcher.poll_interval_ms == 0 {
            return Err(ConfigError::validation(
                "watcher.poll_interval_ms must be greater than zero",
            ));
        }

        for pattern in &self.tables.title_patterns {
            Regex::new(pattern).map_err(|err| {
                ConfigError::validation(format!("Invalid title pattern '{}': {}", pattern, err))
            })?;
        }

        debug!("Configuration validated");
        Ok(())
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn active_profile(&self) -> Option<&Profile> {
        self.profile(&self.active_profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Key;
    use std::io::Write;

    const SAMPLE: &str = r#"
active_profile = "Six Max"

[hotkeys]
aside = "Ctrl+B"

[watcher]
poll_interval_ms = 500

[tables]
title_patterns = ["^Table \\d+", "Hold'em"]
default_role = "Active"

[auto_leave]
vpip = 15
hands = 50

[[profiles]]
name = "Six Max"

[[profiles.slots]]
activity_use = "Active"
priority = 1
x = 0
y = 0
width = 960
height = 700

[[profiles.slots]]
activity_use = "Inactive"
priority = 5
x = 960
y = 0
width = 480
height = 350
"#;

    #[test]
    fn parses_full_configuration() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.hotkeys.aside.key(), Key::Letter('B'));
        assert_eq!(config.hotkeys.aside.modifier_mask(), 0x0002);
        assert_eq!(config.watcher.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.watcher.shutdown_grace_ms, 100);
        assert_eq!(config.tables.default_role, ActivityUse::Active);
        assert_eq!(config.auto_leave, AutoLeavePolicy { vpip: 15, hands: 50 });

        let profile = config.active_profile().unwrap();
        assert_eq!(profile.slots.len(), 2);
        assert_eq!(profile.slots[1].frame.width, 480);
        assert!(profile.slots[1].can_stack());
    }

    #[test]
    fn zero_profiles_is_fatal() {
        let config = Config {
            profiles: Vec::new(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoProfiles)));
    }

    #[test]
    fn unknown_active_profile_is_rejected() {
        let config = Config {
            active_profile: "Missing".into(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn invalid_hotkey_fails_to_parse() {
        let content = SAMPLE.replace("Ctrl+B", "Hyper+B");
        assert!(matches!(Config::from_toml(&content), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn invalid_title_pattern_is_rejected() {
        let content = SAMPLE.replace("^Table \\\\d+", "(unclosed");
        assert!(matches!(
            Config::from_toml(&content),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn load_reads_file_and_missing_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.active_profile, "Six Max");

        let dir = tempfile::tempdir().unwrap();
        let fallback = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(fallback, Config::default());
    }
}
