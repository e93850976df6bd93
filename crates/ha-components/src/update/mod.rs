//! Update entities
//!
//! An update entity reports an installed and a latest version of some piece
//! of software and can install the latest (or a specific) version through
//! the `update.install` service.

mod component;

pub use component::UpdateComponent;

use async_trait::async_trait;
use bitflags::bitflags;
use ha_core::{HomeAssistantError, STATE_OFF, STATE_ON, STATE_UNKNOWN};

use crate::HomeAssistant;

pub const DOMAIN: &str = "update";
pub const SERVICE_INSTALL: &str = "install";

pub const ATTR_AUTO_UPDATE: &str = "auto_update";
pub const ATTR_BACKUP: &str = "backup";
pub const ATTR_IN_PROGRESS: &str = "in_progress";
pub const ATTR_INSTALLED_VERSION: &str = "installed_version";
pub const ATTR_LATEST_VERSION: &str = "latest_version";
pub const ATTR_RELEASE_SUMMARY: &str = "release_summary";
pub const ATTR_RELEASE_URL: &str = "release_url";
pub const ATTR_TITLE: &str = "title";
pub const ATTR_VERSION: &str = "version";

bitflags! {
    /// What an update entity supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UpdateEntityFeature: u32 {
        const INSTALL = 1;
        const SPECIFIC_VERSION = 2;
        const PROGRESS = 4;
        const BACKUP = 8;
        const RELEASE_NOTES = 16;
    }
}

/// Set up the update component: registers `update.install` once
pub fn setup(hass: &HomeAssistant) {
    if !hass.services.has_service(DOMAIN, SERVICE_INSTALL) {
        hass.update.register_services(&hass.services);
    }
}

/// Whether an update is available
///
/// `None` when either version is unknown. Versions are compared as plain
/// strings: any difference means an update is available.
pub fn resolve_state(installed: Option<&str>, latest: Option<&str>) -> Option<bool> {
    match (installed, latest) {
        (Some(installed), Some(latest)) => Some(installed != latest),
        _ => None,
    }
}

/// State string for [`resolve_state`]
pub fn state_value(installed: Option<&str>, latest: Option<&str>) -> &'static str {
    match resolve_state(installed, latest) {
        Some(true) => STATE_ON,
        Some(false) => STATE_OFF,
        None => STATE_UNKNOWN,
    }
}

/// An entity that can report and install software updates
#[async_trait]
pub trait UpdateEntity: Send + Sync {
    /// Display name; the entity id is derived from it
    fn name(&self) -> String;

    /// Name of the software being updated
    fn title(&self) -> Option<String> {
        None
    }

    fn installed_version(&self) -> Option<String>;

    fn latest_version(&self) -> Option<String>;

    fn supported_features(&self) -> UpdateEntityFeature;

    fn release_url(&self) -> Option<String> {
        None
    }

    /// Short summary of the latest release
    fn release_summary(&self) -> Option<String> {
        None
    }

    fn entity_picture(&self) -> Option<String> {
        None
    }

    /// Whether the software updates itself without `update.install`
    fn auto_update(&self) -> bool {
        false
    }

    fn available(&self) -> bool {
        true
    }

    /// Full release notes, for entities with [`UpdateEntityFeature::RELEASE_NOTES`]
    async fn release_notes(&self) -> Option<String> {
        None
    }

    /// Install `version` (the latest when `None`), backing up first when asked
    async fn install(
        &self,
        version: Option<String>,
        backup: bool,
    ) -> Result<(), HomeAssistantError>;
}
