//! Config entry types
//!
//! A ConfigEntry is one configured instance of an integration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Config entry lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    #[default]
    NotLoaded,
    SetupInProgress,
    Loaded,
    SetupError,
    /// Integration was not ready, setup will be retried
    SetupRetry,
    UnloadInProgress,
    FailedUnload,
}

impl ConfigEntryState {
    /// States from which an entry may be unloaded
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Loaded | Self::SetupError | Self::SetupRetry | Self::NotLoaded
        )
    }
}

/// Where a config entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    #[default]
    User,
    Import,
    Discovery,
    /// Offered by the supervisor
    Hassio,
    /// Created by an integration for itself
    System,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryDisabledBy {
    User,
}

/// A configuration entry for an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain (e.g., "hassio")
    pub domain: String,

    pub title: String,

    #[serde(default)]
    pub data: Map<String, Value>,

    /// Used to prevent duplicate entries per domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    #[serde(default)]
    pub source: ConfigEntrySource,

    #[serde(skip, default)]
    pub state: ConfigEntryState,

    /// Human-readable explanation for failed states
    #[serde(skip, default)]
    pub reason: Option<String>,

    /// Setup attempts since the last terminal state
    #[serde(skip, default)]
    pub tries: u32,

    /// Disable background polling
    #[serde(default)]
    pub pref_disable_polling: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<ConfigEntryDisabledBy>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl ConfigEntry {
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: Map::new(),
            unique_id: None,
            source: ConfigEntrySource::User,
            state: ConfigEntryState::NotLoaded,
            reason: None,
            tries: 0,
            pref_disable_polling: false,
            disabled_by: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
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

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_entry() {
        let entry = ConfigEntry::new("hassio", "Supervisor")
            .with_unique_id("hassio")
            .with_source(ConfigEntrySource::System);

        assert_eq!(entry.domain, "hassio");
        assert_eq!(entry.unique_id.as_deref(), Some("hassio"));
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
        assert!(!entry.entry_id.is_empty());
        assert!(!entry.is_disabled());
    }

    #[test]
    fn test_recoverable_states() {
        assert!(ConfigEntryState::Loaded.is_recoverable());
        assert!(ConfigEntryState::SetupRetry.is_recoverable());
        assert!(!ConfigEntryState::SetupInProgress.is_recoverable());
        assert!(!ConfigEntryState::FailedUnload.is_recoverable());
    }

    #[test]
    fn test_runtime_fields_not_serialized() {
        let mut entry =
            ConfigEntry::new("hassio", "Supervisor").with_source(ConfigEntrySource::System);
        entry.state = ConfigEntryState::Loaded;
        entry.tries = 3;

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["source"], json!("system"));
        assert!(value.get("state").is_none());

        let parsed: ConfigEntry = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.state, ConfigEntryState::NotLoaded);
        assert_eq!(parsed.tries, 0);
    }
}
