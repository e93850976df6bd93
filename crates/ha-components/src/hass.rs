//! The running instance shared by every component

use std::sync::Arc;

use ha_config::Config;
use ha_config_entries::{ConfigEntries, ConfigEntryState};
use ha_service_registry::ServiceRegistry;
use ha_state_machine::StateMachine;
use tracing::{info, warn};

use crate::update::UpdateComponent;

/// The central Home Assistant instance
#[derive(Clone)]
pub struct HomeAssistant {
    pub config: Arc<Config>,
    /// Entity states
    pub states: Arc<StateMachine>,
    pub services: Arc<ServiceRegistry>,
    pub config_entries: Arc<ConfigEntries>,
    /// Owner of every update entity
    pub update: Arc<UpdateComponent>,
}

impl HomeAssistant {
    pub fn new(config: Config) -> Self {
        let states = Arc::new(StateMachine::new());
        let update = Arc::new(UpdateComponent::new(states.clone()));

        Self {
            config: Arc::new(config),
            states,
            services: Arc::new(ServiceRegistry::new()),
            config_entries: Arc::new(ConfigEntries::new()),
            update,
        }
    }

    /// Unload every config entry that is not already unloaded
    pub async fn stop(&self) {
        info!("Stopping Home Assistant");
        for entry_id in self.config_entries.entry_ids() {
            let Some(entry) = self.config_entries.get(&entry_id) else {
                continue;
            };
            if entry.state == ConfigEntryState::NotLoaded {
                continue;
            }
            if let Err(e) = self.config_entries.unload(&entry_id).await {
                warn!("Error unloading {} ({}): {}", entry.title, entry.domain, e);
            }
        }
    }
}

impl Default for HomeAssistant {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
