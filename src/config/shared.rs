use crate::config::parser::{Config, ConfigError};
use crate::models::{AutoLeavePolicy, HotKey, Profile};
use crate::{Result, TableManagerError};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

const CONFIG_EVENT_CAPACITY: usize = 16;

/// Runtime configuration edits observed by the manager
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEvent {
    AsideHotKeyChanged { old: HotKey, new: HotKey },
    ActiveProfileChanged { old: String, new: String },
    AutoLeaveChanged(AutoLeavePolicy),
}

/// Validated configuration shared between the manager and its callers
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
    events: broadcast::Sender<ConfigEvent>,
}

impl SharedConfig {
    pub fn new(config: Config) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let (events, _) = broadcast::channel(CONFIG_EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(RwLock::new(config)),
            events,
        })
    }

    pub fn snapshot(&self) -> Config {
        self.inner.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.events.subscribe()
    }

    pub fn aside_hotkey(&self) -> HotKey {
        self.inner.read().hotkeys.aside.clone()
    }

    pub fn auto_leave(&self) -> AutoLeavePolicy {
        self.inner.read().auto_leave
    }

    pub fn active_profile(&self) -> Option<Profile> {
        self.inner.read().active_profile().cloned()
    }

    pub fn set_aside_hotkey(&self, hotkey: HotKey) {
        let old = {
            let mut config = self.inner.write();
            if config.hotkeys.aside == hotkey {
                return;
            }
            std::mem::replace(&mut config.hotkeys.aside, hotkey.clone())
        };
        info!(old = %old, new = %hotkey, "Aside hotkey changed");
        self.publish(ConfigEvent::AsideHotKeyChanged { old, new: hotkey });
    }

    pub fn set_active_profile(&self, name: &str) -> Result<()> {
        let old = {
            let mut config = self.inner.write();
            if config.profile(name).is_none() {
                return Err(TableManagerError::ProfileNotFound(name.to_string()).into());
            }
            if config.active_profile == name {
                return Ok(());
            }
            std::mem::replace(&mut config.active_profile, name.to_string())
        };
        info!(old = %old, new = name, "Active profile changed");
        self.publish(ConfigEvent::ActiveProfileChanged {
            old,
            new: name.to_string(),
        });
        Ok(())
    }

    pub fn set_auto_leave(&self, policy: AutoLeavePolicy) {
        {
            let mut config = self.inner.write();
            if config.auto_leave == policy {
                return;
            }
            config.auto_leave = policy;
        }
        self.publish(ConfigEvent::AutoLeaveChanged(policy));
    }

    fn publish(&self, event: ConfigEvent) {
        let _ = self.events.send(event);
    }
}
