//! Test Home Assistant instance

use ha_components::HomeAssistant;
use ha_config::Config;
use ha_core::{Context, State};
use ha_service_registry::ServiceError;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use super::fixtures::load_yaml_fixture;

/// Route logs through the test writer, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A Home Assistant instance with assertion helpers
pub struct TestHomeAssistant {
    pub hass: HomeAssistant,
}

impl TestHomeAssistant {
    /// Instance configured from `tests/fixtures/configuration.yaml`
    pub fn new() -> Self {
        Self::from_fixture("configuration.yaml")
    }

    pub fn from_fixture(name: &str) -> Self {
        init_tracing();
        let config =
            Config::from_yaml(load_yaml_fixture(name)).expect("Invalid configuration fixture");
        Self {
            hass: HomeAssistant::new(config),
        }
    }

    pub fn get_state(&self, entity_id: &str) -> Option<State> {
        self.hass.states.get(entity_id)
    }

    /// Assert that an entity is in a specific state
    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.hass.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }

    /// Call a service and wait for it to finish
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
    ) -> Result<(), ServiceError> {
        self.hass
            .services
            .call(domain, service, data, Context::new(), false)
            .await
            .map(|_| ())
    }

    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        let mut ids = self.hass.states.entity_ids(domain);
        ids.sort();
        ids
    }
}

impl Default for TestHomeAssistant {
    fn default() -> Self {
        Self::new()
    }
}
