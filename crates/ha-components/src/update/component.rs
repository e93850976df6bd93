//! The update entity component: entity bookkeeping, state writes and the
//! `update.install` service

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use ha_core::{Context, EntityId, HomeAssistantError, ServiceCall, STATE_UNAVAILABLE};
use ha_service_registry::{ServiceDescription, ServiceRegistry};
use ha_state_machine::StateMachine;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{
    state_value, UpdateEntity, UpdateEntityFeature, ATTR_AUTO_UPDATE, ATTR_BACKUP,
    ATTR_IN_PROGRESS, ATTR_INSTALLED_VERSION, ATTR_LATEST_VERSION, ATTR_RELEASE_SUMMARY,
    ATTR_RELEASE_URL, ATTR_TITLE, ATTR_VERSION, DOMAIN, SERVICE_INSTALL,
};

/// Longest release summary written to the state attributes
const MAX_RELEASE_SUMMARY_LENGTH: usize = 255;

/// Owns every update entity and writes their states
pub struct UpdateComponent {
    states: Arc<StateMachine>,
    /// entity_id -> entity
    entities: DashMap<String, Arc<dyn UpdateEntity>>,
    /// entity_ids with an install running
    installing: DashSet<String>,
}

impl UpdateComponent {
    pub fn new(states: Arc<StateMachine>) -> Self {
        Self {
            states,
            entities: DashMap::new(),
            installing: DashSet::new(),
        }
    }

    /// Register `update.install`
    pub fn register_services(self: &Arc<Self>, services: &ServiceRegistry) {
        let component = Arc::clone(self);
        services.register_with_description(
            ServiceDescription {
                name: Some("Install update".to_string()),
                description: Some("Install an update for this device or service".to_string()),
                schema: Some(install_schema()),
                target: Some(json!({"entity": {"domain": DOMAIN}})),
                ..ServiceDescription::new(DOMAIN, SERVICE_INSTALL)
            },
            move |call: ServiceCall| {
                let component = Arc::clone(&component);
                async move {
                    component.install(&call).await?;
                    Ok(None)
                }
            },
        );
        info!("Update services registered");
    }

    /// Add entities and write their initial state
    ///
    /// Returns the entity id assigned to each entity, in order.
    pub fn add_entities(&self, entities: Vec<Arc<dyn UpdateEntity>>) -> Vec<EntityId> {
        let mut added = Vec::with_capacity(entities.len());

        for entity in entities {
            let entity_id = match self.generate_entity_id(&entity.name()) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Not adding update entity '{}': {}", entity.name(), e);
                    continue;
                }
            };
            debug!("Adding update entity {}", entity_id);
            self.entities.insert(entity_id.to_string(), entity);
            self.write_state(&entity_id);
            added.push(entity_id);
        }

        added
    }

    /// `update.<slug of name>`, suffixed `_2`, `_3`, ... when taken
    fn generate_entity_id(&self, name: &str) -> Result<EntityId, HomeAssistantError> {
        let base = EntityId::from_name(DOMAIN, name)
            .map_err(|e| HomeAssistantError::new(e.to_string()))?;

        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.is_taken(&candidate) {
            candidate = EntityId::new(DOMAIN, format!("{}_{}", base.object_id(), suffix))
                .map_err(|e| HomeAssistantError::new(e.to_string()))?;
            suffix += 1;
        }
        Ok(candidate)
    }

    fn is_taken(&self, entity_id: &EntityId) -> bool {
        let key = entity_id.to_string();
        self.entities.contains_key(&key) || self.states.get(&key).is_some()
    }

    /// Remove an entity and its state
    pub fn remove_entity(&self, entity_id: &EntityId) -> bool {
        let key = entity_id.to_string();
        let removed = self.entities.remove(&key).is_some();
        self.installing.remove(&key);
        self.states.remove(entity_id, Context::new());
        removed
    }

    pub fn entity(&self, entity_id: &str) -> Option<Arc<dyn UpdateEntity>> {
        self.entities.get(entity_id).map(|e| Arc::clone(e.value()))
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_installing(&self, entity_id: &str) -> bool {
        self.installing.contains(entity_id)
    }

    /// Write the current state of an entity to the state machine
    pub fn write_state(&self, entity_id: &EntityId) {
        let Some(entity) = self.entity(&entity_id.to_string()) else {
            return;
        };
        let in_progress = self.is_installing(&entity_id.to_string());

        let state = if entity.available() {
            state_value(
                entity.installed_version().as_deref(),
                entity.latest_version().as_deref(),
            )
        } else {
            STATE_UNAVAILABLE
        };

        self.states.set(
            entity_id.clone(),
            state,
            state_attributes(entity.as_ref(), in_progress),
            Context::new(),
        );
    }

    /// Rewrite the states of the given entities
    pub fn write_states<'a>(&self, entity_ids: impl IntoIterator<Item = &'a EntityId>) {
        for entity_id in entity_ids {
            self.write_state(entity_id);
        }
    }

    /// Handle an `update.install` call
    ///
    /// Targets that are not update entities of this component are skipped.
    /// Every target is installed concurrently; the first failure is returned.
    pub async fn install(&self, call: &ServiceCall) -> Result<(), HomeAssistantError> {
        let version: Option<String> = call.get(ATTR_VERSION);
        let backup: bool = call.get(ATTR_BACKUP).unwrap_or(false);

        let targets = self.resolve_targets(call);
        if targets.is_empty() {
            debug!("update.install matched no update entities");
            return Ok(());
        }

        let results = join_all(targets.into_iter().map(|(entity_id, entity)| {
            self.install_entity(entity_id, entity, version.clone(), backup)
        }))
        .await;

        results.into_iter().collect()
    }

    fn resolve_targets(&self, call: &ServiceCall) -> Vec<(EntityId, Arc<dyn UpdateEntity>)> {
        let requested: Vec<EntityId> = if call.entity_ids().iter().any(|id| id == "all") {
            self.entities
                .iter()
                .filter_map(|e| e.key().parse().ok())
                .collect()
        } else {
            call.target_entities(DOMAIN)
        };

        let mut targets = Vec::new();
        for id in requested {
            match self.entity(&id.to_string()) {
                Some(entity) if entity.available() => targets.push((id, entity)),
                Some(_) => debug!("Skipping unavailable entity {}", id),
                None => warn!(
                    "Referenced entity {} is missing or not currently available",
                    id
                ),
            }
        }
        targets
    }

    async fn install_entity(
        &self,
        entity_id: EntityId,
        entity: Arc<dyn UpdateEntity>,
        version: Option<String>,
        backup: bool,
    ) -> Result<(), HomeAssistantError> {
        let features = entity.supported_features();
        let name = entity.name();

        if !features.contains(UpdateEntityFeature::INSTALL) {
            return Err(HomeAssistantError::new(format!(
                "Entity {} does not support installing updates",
                entity_id
            )));
        }

        if version.is_none() {
            let latest = entity.latest_version();
            if latest.is_none() || entity.installed_version() == latest {
                return Err(HomeAssistantError::new(format!(
                    "No update available for {}",
                    name
                )));
            }
        }

        if version.is_some() && !features.contains(UpdateEntityFeature::SPECIFIC_VERSION) {
            return Err(HomeAssistantError::new(format!(
                "Installing a specific version is not supported for {}",
                name
            )));
        }

        if backup && !features.contains(UpdateEntityFeature::BACKUP) {
            return Err(HomeAssistantError::new(format!(
                "Backup is not supported for {}",
                name
            )));
        }

        let Some(_progress) = InProgress::start(self, &entity_id) else {
            return Err(HomeAssistantError::new(format!(
                "Update installation already in progress for {}",
                name
            )));
        };

        info!("Installing update for {} (version: {:?}, backup: {})", entity_id, version, backup);
        entity.install(version, backup).await
    }

    /// Release notes of an entity supporting them
    pub async fn release_notes(
        &self,
        entity_id: &str,
    ) -> Result<Option<String>, HomeAssistantError> {
        let entity = self
            .entity(entity_id)
            .ok_or_else(|| HomeAssistantError::new(format!("Entity {} not found", entity_id)))?;

        if !entity
            .supported_features()
            .contains(UpdateEntityFeature::RELEASE_NOTES)
        {
            return Err(HomeAssistantError::new(format!(
                "Entity {} does not support release notes",
                entity_id
            )));
        }

        Ok(entity.release_notes().await)
    }
}

/// Marks an entity as installing until dropped, rewriting its state both ways
struct InProgress<'a> {
    component: &'a UpdateComponent,
    entity_id: EntityId,
}

impl<'a> InProgress<'a> {
    fn start(component: &'a UpdateComponent, entity_id: &EntityId) -> Option<Self> {
        if !component.installing.insert(entity_id.to_string()) {
            return None;
        }
        component.write_state(entity_id);
        Some(Self {
            component,
            entity_id: entity_id.clone(),
        })
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.component.installing.remove(&self.entity_id.to_string());
        self.component.write_state(&self.entity_id);
    }
}

fn state_attributes(entity: &dyn UpdateEntity, in_progress: bool) -> HashMap<String, Value> {
    let release_summary = entity
        .release_summary()
        .map(|s| s.chars().take(MAX_RELEASE_SUMMARY_LENGTH).collect::<String>());

    let mut attributes = HashMap::from([
        ("friendly_name".to_string(), json!(entity.name())),
        (
            "supported_features".to_string(),
            json!(entity.supported_features().bits()),
        ),
        (ATTR_AUTO_UPDATE.to_string(), json!(entity.auto_update())),
        (ATTR_INSTALLED_VERSION.to_string(), json!(entity.installed_version())),
        (ATTR_IN_PROGRESS.to_string(), json!(in_progress)),
        (ATTR_LATEST_VERSION.to_string(), json!(entity.latest_version())),
        (ATTR_RELEASE_SUMMARY.to_string(), json!(release_summary)),
        (ATTR_RELEASE_URL.to_string(), json!(entity.release_url())),
        (ATTR_TITLE.to_string(), json!(entity.title())),
    ]);
    if let Some(picture) = entity.entity_picture() {
        attributes.insert("entity_picture".to_string(), json!(picture));
    }
    attributes
}

/// Schema of the `update.install` service data
fn install_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entity_id": {
                "anyOf": [
                    {"type": "string"},
                    {"type": "array", "items": {"type": "string"}}
                ]
            },
            "version": {"type": "string"},
            "backup": {"type": "boolean"}
        },
        "required": ["entity_id"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ha_core::{STATE_OFF, STATE_ON, STATE_UNKNOWN};
    use ha_service_registry::ServiceError;
    use std::sync::Mutex;
    use tokio::sync::{oneshot, Notify};

    struct FakeUpdate {
        name: String,
        installed: Option<String>,
        latest: Option<String>,
        features: UpdateEntityFeature,
        summary: Option<String>,
        installs: Mutex<Vec<(Option<String>, bool)>>,
        fail_with: Option<String>,
        gate: Option<Arc<Notify>>,
        available: bool,
    }

    impl FakeUpdate {
        fn new(name: &str, installed: &str, latest: &str) -> Self {
            Self {
                name: name.to_string(),
                installed: Some(installed.to_string()),
                latest: Some(latest.to_string()),
                features: UpdateEntityFeature::INSTALL,
                summary: None,
                installs: Mutex::new(Vec::new()),
                fail_with: None,
                gate: None,
                available: true,
            }
        }
    }

    #[async_trait]
    impl UpdateEntity for FakeUpdate {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn installed_version(&self) -> Option<String> {
            self.installed.clone()
        }

        fn latest_version(&self) -> Option<String> {
            self.latest.clone()
        }

        fn supported_features(&self) -> UpdateEntityFeature {
            self.features
        }

        fn release_summary(&self) -> Option<String> {
            self.summary.clone()
        }

        fn available(&self) -> bool {
            self.available
        }

        async fn release_notes(&self) -> Option<String> {
            Some("## Changelog".to_string())
        }

        async fn install(
            &self,
            version: Option<String>,
            backup: bool,
        ) -> Result<(), HomeAssistantError> {
            self.installs.lock().unwrap().push((version, backup));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.fail_with {
                Some(msg) => Err(HomeAssistantError::new(msg.clone())),
                None => Ok(()),
            }
        }
    }

    fn setup() -> (Arc<StateMachine>, Arc<ServiceRegistry>, Arc<UpdateComponent>) {
        let states = Arc::new(StateMachine::new());
        let services = Arc::new(ServiceRegistry::new());
        let component = Arc::new(UpdateComponent::new(states.clone()));
        component.register_services(&services);
        (states, services, component)
    }

    async fn call_install(services: &ServiceRegistry, data: Value) -> Result<(), ServiceError> {
        services
            .call(DOMAIN, SERVICE_INSTALL, data, Context::new(), false)
            .await
            .map(|_| ())
    }

    #[test]
    fn test_states_and_attributes() {
        let (states, _, component) = setup();
        let mut pending = FakeUpdate::new("Test Update", "2.0.0", "2.0.1");
        pending.summary = Some("x".repeat(300));
        let current = FakeUpdate::new("Test2 Update", "3.1.0", "3.1.0");
        let mut unknown = FakeUpdate::new("Mystery Update", "1.0", "1.0");
        unknown.latest = None;

        let ids = component.add_entities(vec![
            Arc::new(pending),
            Arc::new(current),
            Arc::new(unknown),
        ]);
        assert_eq!(
            ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["update.test_update", "update.test2_update", "update.mystery_update"]
        );

        assert!(states.is_state("update.test_update", STATE_ON));
        assert!(states.is_state("update.test2_update", STATE_OFF));
        assert!(states.is_state("update.mystery_update", STATE_UNKNOWN));

        let state = states.get("update.test_update").unwrap();
        assert_eq!(state.attributes["installed_version"], json!("2.0.0"));
        assert_eq!(state.attributes["latest_version"], json!("2.0.1"));
        assert_eq!(state.attributes["in_progress"], json!(false));
        assert_eq!(state.attributes["friendly_name"], json!("Test Update"));
        assert_eq!(state.attributes["supported_features"], json!(1));
        assert_eq!(
            state.attributes["release_summary"].as_str().unwrap().len(),
            MAX_RELEASE_SUMMARY_LENGTH
        );
        assert!(!state.attributes.contains_key("entity_picture"));
    }

    #[test]
    fn test_entity_id_collision_suffix() {
        let (_, _, component) = setup();
        let ids = component.add_entities(vec![
            Arc::new(FakeUpdate::new("Test Update", "1", "2")),
            Arc::new(FakeUpdate::new("Test Update", "1", "2")),
        ]);
        assert_eq!(ids[0].to_string(), "update.test_update");
        assert_eq!(ids[1].to_string(), "update.test_update_2");
    }

    #[test]
    fn test_remove_entity() {
        let (states, _, component) = setup();
        let ids = component.add_entities(vec![Arc::new(FakeUpdate::new("Test Update", "1", "2"))]);

        assert!(component.remove_entity(&ids[0]));
        assert!(states.get("update.test_update").is_none());
        assert!(component.entity("update.test_update").is_none());
        assert!(!component.remove_entity(&ids[0]));
    }

    #[tokio::test]
    async fn test_install_routes_to_entity() {
        let (_, services, component) = setup();
        let mut entity = FakeUpdate::new("Core Update", "1.0.0dev221", "1.0.0dev222");
        entity.features = UpdateEntityFeature::INSTALL
            | UpdateEntityFeature::SPECIFIC_VERSION
            | UpdateEntityFeature::BACKUP;
        let entity = Arc::new(entity);
        component.add_entities(vec![entity.clone()]);

        call_install(&services, json!({"entity_id": "update.core_update"}))
            .await
            .unwrap();
        call_install(
            &services,
            json!({"entity_id": ["update.core_update"], "version": "1.0.0dev222", "backup": true}),
        )
        .await
        .unwrap();

        assert_eq!(
            *entity.installs.lock().unwrap(),
            vec![(None, false), (Some("1.0.0dev222".to_string()), true)]
        );
    }

    #[tokio::test]
    async fn test_unknown_entity_is_skipped() {
        let (_, services, component) = setup();
        let entity = Arc::new(FakeUpdate::new("Test Update", "1", "2"));
        component.add_entities(vec![entity.clone()]);

        call_install(&services, json!({"entity_id": "update.home_assistant_os_update"}))
            .await
            .unwrap();
        assert!(entity.installs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_all_skips_unavailable() {
        let (_, services, component) = setup();
        let first = Arc::new(FakeUpdate::new("First Update", "1", "2"));
        let second = Arc::new(FakeUpdate::new("Second Update", "1", "2"));
        let mut offline = FakeUpdate::new("Offline Update", "1", "2");
        offline.available = false;
        let offline = Arc::new(offline);
        component.add_entities(vec![first.clone(), second.clone(), offline.clone()]);

        call_install(&services, json!({"entity_id": "all"}))
            .await
            .unwrap();

        assert_eq!(first.installs.lock().unwrap().len(), 1);
        assert_eq!(second.installs.lock().unwrap().len(), 1);
        assert!(offline.installs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_explicit_unavailable_is_skipped() {
        let (_, services, component) = setup();
        let mut offline = FakeUpdate::new("Offline Update", "1", "2");
        offline.available = false;
        let offline = Arc::new(offline);
        component.add_entities(vec![offline.clone()]);

        call_install(&services, json!({"entity_id": "update.offline_update"}))
            .await
            .unwrap();
        assert!(offline.installs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_error_surfaces_as_home_assistant_error() {
        let (states, services, component) = setup();
        let mut entity = FakeUpdate::new("Test Update", "1", "2");
        entity.fail_with = Some("Error updating test: boom".to_string());
        component.add_entities(vec![Arc::new(entity)]);

        let err = call_install(&services, json!({"entity_id": "update.test_update"}))
            .await
            .unwrap_err();
        match err {
            ServiceError::HomeAssistant(e) => assert_eq!(e.message(), "Error updating test: boom"),
            other => panic!("unexpected error: {other:?}"),
        }

        let state = states.get("update.test_update").unwrap();
        assert_eq!(state.attributes["in_progress"], json!(false));
    }

    #[tokio::test]
    async fn test_feature_gating() {
        let (_, services, component) = setup();
        component.add_entities(vec![
            Arc::new(FakeUpdate::new("Test Update", "1", "2")),
            Arc::new(FakeUpdate::new("Current Update", "2", "2")),
        ]);

        let cases = [
            (json!({"entity_id": "update.test_update", "version": "2"}), "specific version"),
            (json!({"entity_id": "update.test_update", "backup": true}), "Backup is not supported"),
            (json!({"entity_id": "update.current_update"}), "No update available"),
        ];
        for (data, expected) in cases {
            match call_install(&services, data).await {
                Err(ServiceError::HomeAssistant(e)) => {
                    assert!(e.message().contains(expected), "{}", e.message())
                }
                other => panic!("expected HomeAssistant error, got {other:?}"),
            }
        }

        // Installing a specific version bypasses the no-update check
        let mut pinned = FakeUpdate::new("Pinned Update", "2", "2");
        pinned.features = UpdateEntityFeature::INSTALL | UpdateEntityFeature::SPECIFIC_VERSION;
        component.add_entities(vec![Arc::new(pinned)]);
        call_install(&services, json!({"entity_id": "update.pinned_update", "version": "1"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_schema_rejects_bad_data() {
        let (_, services, _) = setup();
        let err = call_install(&services, json!({"backup": "yes"})).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_in_progress_during_install() {
        let (states, services, component) = setup();
        let gate = Arc::new(Notify::new());
        let mut entity = FakeUpdate::new("Slow Update", "1", "2");
        entity.gate = Some(gate.clone());
        component.add_entities(vec![Arc::new(entity)]);

        let mut changes = states.subscribe();
        let (done_tx, done_rx) = oneshot::channel();
        let services_task = services.clone();
        tokio::spawn(async move {
            let result =
                call_install(&services_task, json!({"entity_id": "update.slow_update"})).await;
            let _ = done_tx.send(result);
        });

        let change = changes.recv().await.unwrap();
        let new_state = change.new_state.unwrap();
        assert_eq!(new_state.attributes["in_progress"], json!(true));
        assert!(component.is_installing("update.slow_update"));

        // A second install while the first runs is refused
        let err = call_install(&services, json!({"entity_id": "update.slow_update"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already in progress"));

        gate.notify_one();
        done_rx.await.unwrap().unwrap();
        assert!(!component.is_installing("update.slow_update"));
        assert_eq!(
            states.get("update.slow_update").unwrap().attributes["in_progress"],
            json!(false)
        );
    }

    #[tokio::test]
    async fn test_release_notes_requires_feature() {
        let (_, _, component) = setup();
        let mut with_notes = FakeUpdate::new("Notes Update", "1", "2");
        with_notes.features |= UpdateEntityFeature::RELEASE_NOTES;
        component.add_entities(vec![
            Arc::new(with_notes),
            Arc::new(FakeUpdate::new("Plain Update", "1", "2")),
        ]);

        assert_eq!(
            component.release_notes("update.notes_update").await.unwrap().as_deref(),
            Some("## Changelog")
        );
        assert!(component.release_notes("update.plain_update").await.is_err());
        assert!(component.release_notes("update.missing").await.is_err());
    }
}
