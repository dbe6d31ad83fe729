use crate::models::slot::{ActivityUse, Slot, SlotDefinition, SlotEvent};
use crate::platform::window::Rect;
use crate::{Result, TableManagerError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Named slot layout; exactly one profile is active at a time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub slots: Vec<SlotDefinition>,
}

impl Profile {
    pub fn new(name: impl Into<String>, slots: Vec<SlotDefinition>) -> Self {
        Self {
            name: name.into(),
            slots,
        }
    }

    /// Two active seats side by side with a stackable parking area below
    pub fn default_profile() -> Self {
        Self::new(
            "Default",
            vec![
                SlotDefinition::new(ActivityUse::Active, 1, Rect::new(0, 0, 960, 700)),
                SlotDefinition::new(ActivityUse::Active, 2, Rect::new(960, 0, 960, 700)),
                SlotDefinition::new(ActivityUse::Aside, 3, Rect::new(0, 700, 640, 380)),
                SlotDefinition::new(ActivityUse::Inactive, 4, Rect::new(640, 700, 640, 380)),
            ],
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(
                TableManagerError::ValidationError("Profile name cannot be empty".into()).into(),
            );
        }

        for definition in &self.slots {
            definition.frame.validate().map_err(|err| {
                TableManagerError::ValidationError(format!(
                    "Profile '{}' has an invalid slot: {}",
                    self.name, err
                ))
            })?;
        }

        Ok(())
    }

    /// Instantiate live slots that all publish on `events`
    pub fn build_slots(&self, events: &broadcast::Sender<SlotEvent>) -> Vec<Arc<Slot>> {
        self.slots
            .iter()
            .map(|definition| Arc::new(Slot::with_events(*definition, events.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_valid() {
        let profile = Profile::default_profile();
        assert!(profile.validate().is_ok());
        assert_eq!(profile.slots.len(), 4);
    }

    #[test]
    fn invalid_slot_geometry_is_rejected() {
        let profile = Profile::new(
            "Broken",
            vec![SlotDefinition::new(ActivityUse::Active, 1, Rect::new(0, 0, -5, 100))],
        );
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("Broken"));
    }

    #[test]
    fn built_slots_share_the_event_channel() {
        let (events, mut receiver) = broadcast::channel(8);
        let slots = Profile::default_profile().build_slots(&events);

        slots[3].set_priority(0);
        assert!(matches!(
            receiver.try_recv().unwrap(),
            SlotEvent::PriorityChanged { old: 4, new: 0, .. }
        ));
    }
}
