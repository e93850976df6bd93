//! Mock config entry, added to a test instance before setup

use ha_components::HomeAssistant;
use ha_config_entries::{ConfigEntry, ConfigEntrySource};
use serde_json::{Map, Value};

/// Builder for a config entry in the style of Python HA's MockConfigEntry
#[derive(Debug, Clone)]
pub struct MockConfigEntry {
    pub domain: String,
    pub title: String,
    pub data: Map<String, Value>,
    pub unique_id: Option<String>,
    pub source: ConfigEntrySource,
    pub pref_disable_polling: bool,
}

impl MockConfigEntry {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            title: "Mock Title".to_string(),
            data: Map::new(),
            unique_id: None,
            source: ConfigEntrySource::User,
            pref_disable_polling: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    pub fn without_polling(mut self) -> Self {
        self.pref_disable_polling = true;
        self
    }

    pub fn to_config_entry(&self) -> ConfigEntry {
        let mut entry = ConfigEntry::new(&self.domain, &self.title)
            .with_data(self.data.clone())
            .with_source(self.source);
        entry.unique_id = self.unique_id.clone();
        entry.pref_disable_polling = self.pref_disable_polling;
        entry
    }

    /// Register the entry with the instance; returns its entry id
    pub fn add_to_hass(&self, hass: &HomeAssistant) -> String {
        hass.config_entries
            .add(self.to_config_entry())
            .expect("Failed to add mock config entry")
            .entry_id
    }
}
