//! Supervisor (hassio) integration
//!
//! Connects to the supervisor named by the `HASSIO` environment variable,
//! pushes this instance's HTTP and time zone settings to it, and sets up a
//! config entry whose coordinator polls the supervisor and feeds the update
//! entities.

pub mod config;
pub mod coordinator;
pub mod handler;
pub mod models;
pub mod update;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ha_config_entries::{ConfigEntry, ConfigEntryHandler, ConfigEntrySource, EntrySetupError};
use ha_core::EntityId;
use tracing::{error, info, warn};

pub use config::HassioConfig;
pub use coordinator::{AddonData, HassioData, HassioDataUpdateCoordinator, UPDATE_INTERVAL};
pub use handler::{HassIO, HassioApiError};
pub use update::{SupervisorUpdateEntity, UpdateTarget};

use crate::update::{UpdateComponent, UpdateEntity};
use crate::HomeAssistant;

pub const DOMAIN: &str = "hassio";

/// Title of the config entry the integration creates for itself
pub const ENTRY_TITLE: &str = "Supervisor";

/// Set up the integration from the process environment
pub async fn async_setup(hass: &HomeAssistant) -> bool {
    async_setup_with(hass, HassioConfig::from_env()).await
}

/// Set up the integration against an explicit supervisor
///
/// Returns false only when no supervisor is configured.
pub async fn async_setup_with(hass: &HomeAssistant, config: Option<HassioConfig>) -> bool {
    let Some(config) = config else {
        error!("Missing {} environment variable", config::ENV_HASSIO);
        return false;
    };

    if hass.config_entries.has_handler(DOMAIN) {
        warn!("Supervisor integration is already set up");
        return true;
    }

    let client = Arc::new(HassIO::new(&config));

    if !client.is_connected().await {
        warn!("Not connected with the supervisor / system too busy!");
    }

    crate::update::setup(hass);

    let http = &hass.config.http;
    let watchdog = http.server_host.is_none();
    if !watchdog {
        warn!("Found incompatible HTTP option 'server_host'. Watchdog feature disabled");
    }
    if !client.update_hass_api(http.uses_ssl(), http.port(), watchdog).await {
        warn!("Failed to push HTTP settings to the supervisor");
    }

    if !client.update_hass_timezone(&hass.config.core.time_zone).await {
        warn!("Failed to push the time zone to the supervisor");
    }

    match client.get_info().await {
        Ok(info) => info!(
            "Supervisor {} running Home Assistant {}",
            info.supervisor.as_deref().unwrap_or("unknown"),
            info.homeassistant.as_deref().unwrap_or("unknown"),
        ),
        Err(e) => warn!("Can't read Supervisor data: {}", e),
    }

    let integration = Arc::new(HassioIntegration::new(client, hass.update.clone()));
    hass.config_entries.register_handler(DOMAIN, integration);

    if hass.config_entries.get_by_domain(DOMAIN).is_empty() {
        let entry = ConfigEntry::new(DOMAIN, ENTRY_TITLE)
            .with_unique_id(DOMAIN)
            .with_source(ConfigEntrySource::System);
        if let Err(e) = hass.config_entries.add(entry) {
            error!("Could not create the {} config entry: {}", DOMAIN, e);
        }
    }

    for entry in hass.config_entries.get_by_domain(DOMAIN) {
        if let Err(e) = hass.config_entries.setup(&entry.entry_id).await {
            error!("Error setting up {} entry {}: {}", DOMAIN, entry.entry_id, e);
        }
    }

    true
}

struct LoadedEntry {
    coordinator: Arc<HassioDataUpdateCoordinator>,
    entity_ids: Vec<EntityId>,
}

/// Config entry handler of the integration
pub struct HassioIntegration {
    client: Arc<HassIO>,
    update: Arc<UpdateComponent>,
    loaded: DashMap<String, LoadedEntry>,
}

impl HassioIntegration {
    pub fn new(client: Arc<HassIO>, update: Arc<UpdateComponent>) -> Self {
        Self {
            client,
            update,
            loaded: DashMap::new(),
        }
    }
}

#[async_trait]
impl ConfigEntryHandler for HassioIntegration {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), EntrySetupError> {
        let coordinator = Arc::new(HassioDataUpdateCoordinator::new(self.client.clone()));
        coordinator
            .refresh()
            .await
            .map_err(|e| EntrySetupError::NotReady(e.to_string()))?;

        let data = coordinator.data();
        let mut entities: Vec<Arc<dyn UpdateEntity>> = data
            .addons
            .keys()
            .map(|slug| {
                Arc::new(SupervisorUpdateEntity::new(
                    UpdateTarget::Addon { slug: slug.clone() },
                    coordinator.clone(),
                )) as Arc<dyn UpdateEntity>
            })
            .collect();
        entities.push(Arc::new(SupervisorUpdateEntity::new(
            UpdateTarget::Core,
            coordinator.clone(),
        )));
        entities.push(Arc::new(SupervisorUpdateEntity::new(
            UpdateTarget::Supervisor,
            coordinator.clone(),
        )));
        if data.has_os() {
            entities.push(Arc::new(SupervisorUpdateEntity::new(
                UpdateTarget::Os,
                coordinator.clone(),
            )));
        }

        let entity_ids = self.update.add_entities(entities);
        info!("Added {} supervisor update entities", entity_ids.len());

        let update = self.update.clone();
        let listened = entity_ids.clone();
        coordinator.add_listener(move || update.write_states(&listened));

        if !entry.pref_disable_polling {
            coordinator.start_polling();
        }

        self.loaded.insert(
            entry.entry_id.clone(),
            LoadedEntry {
                coordinator,
                entity_ids,
            },
        );
        Ok(())
    }

    async fn unload_entry(&self, entry: &ConfigEntry) -> Result<(), String> {
        if let Some((_, loaded)) = self.loaded.remove(&entry.entry_id) {
            loaded.coordinator.shutdown();
            for entity_id in &loaded.entity_ids {
                self.update.remove_entity(entity_id);
            }
        }
        Ok(())
    }
}
