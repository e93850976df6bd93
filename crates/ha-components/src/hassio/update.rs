//! Update entities for add-ons, the operating system, core and the supervisor

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use ha_core::HomeAssistantError;
use regex::Regex;
use tracing::debug;

use super::coordinator::{HassioData, HassioDataUpdateCoordinator};
use super::handler::HassioResult;
use crate::update::{UpdateEntity, UpdateEntityFeature};

const OS_TITLE: &str = "Home Assistant Operating System";
const CORE_TITLE: &str = "Home Assistant Core";
const SUPERVISOR_TITLE: &str = "Home Assistant Supervisor";

const CORE_PICTURE: &str = "https://brands.home-assistant.io/homeassistant/icon.png";
const SUPERVISOR_PICTURE: &str = "https://brands.home-assistant.io/hassio/icon.png";

/// What an entity updates, and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateTarget {
    Addon { slug: String },
    Os,
    Core,
    Supervisor,
}

impl UpdateTarget {
    pub fn supported_features(&self) -> UpdateEntityFeature {
        match self {
            Self::Addon { .. } => {
                UpdateEntityFeature::INSTALL
                    | UpdateEntityFeature::BACKUP
                    | UpdateEntityFeature::RELEASE_NOTES
            }
            Self::Os => UpdateEntityFeature::INSTALL | UpdateEntityFeature::SPECIFIC_VERSION,
            Self::Core => {
                UpdateEntityFeature::INSTALL
                    | UpdateEntityFeature::SPECIFIC_VERSION
                    | UpdateEntityFeature::BACKUP
            }
            Self::Supervisor => UpdateEntityFeature::INSTALL,
        }
    }

    /// Installed and latest version in `data`
    fn versions(&self, data: &HassioData) -> (Option<String>, Option<String>) {
        match self {
            Self::Addon { slug } => data
                .addon(slug)
                .map(|a| (a.record.version.clone(), a.record.version_latest.clone()))
                .unwrap_or_default(),
            Self::Os => data
                .os
                .as_ref()
                .map(|os| (os.version.clone(), os.version_latest.clone()))
                .unwrap_or_default(),
            Self::Core => data
                .core
                .as_ref()
                .map(|core| (core.version.clone(), core.version_latest.clone()))
                .unwrap_or_default(),
            Self::Supervisor => data
                .supervisor
                .as_ref()
                .map(|s| (s.version.clone(), s.version_latest.clone()))
                .unwrap_or_default(),
        }
    }

    /// Where the release notes of `latest` live
    pub fn release_url(&self, latest: &str) -> Option<String> {
        match self {
            Self::Addon { .. } => None,
            Self::Os if is_dev(latest) || !is_plain_version(latest) => {
                Some("https://github.com/home-assistant/operating-system/commits/dev".to_string())
            }
            Self::Os => Some(format!(
                "https://github.com/home-assistant/operating-system/releases/tag/{}",
                latest
            )),
            Self::Core if is_dev(latest) => {
                Some("https://github.com/home-assistant/core/commits/dev".to_string())
            }
            Self::Core => Some(format!(
                "https://{}.home-assistant.io/latest-release-notes/",
                if is_beta(latest) { "rc" } else { "www" }
            )),
            Self::Supervisor if is_dev(latest) => {
                Some("https://github.com/home-assistant/supervisor/commits/main".to_string())
            }
            Self::Supervisor => Some(format!(
                "https://github.com/home-assistant/supervisor/releases/tag/{}",
                latest
            )),
        }
    }

    /// Whether the coordinator should refresh after a successful install
    ///
    /// Core restarts when it updates, so there is nothing left to refresh.
    pub fn refresh_after_install(&self) -> bool {
        !matches!(self, Self::Core)
    }
}

fn is_dev(version: &str) -> bool {
    version.contains("dev")
}

/// `2022.4.0b3`
fn is_beta(version: &str) -> bool {
    static BETA: OnceLock<Regex> = OnceLock::new();
    BETA.get_or_init(|| Regex::new(r"^\d+(\.\d+)*b\d+$").expect("static regex"))
        .is_match(version)
}

/// Dotted numeric version such as `7.6` or `2022.4.0`
fn is_plain_version(version: &str) -> bool {
    static PLAIN: OnceLock<Regex> = OnceLock::new();
    PLAIN
        .get_or_init(|| Regex::new(r"^\d+(\.\d+)*$").expect("static regex"))
        .is_match(version)
}

/// An update entity backed by the supervisor
pub struct SupervisorUpdateEntity {
    target: UpdateTarget,
    name: String,
    coordinator: Arc<HassioDataUpdateCoordinator>,
}

impl SupervisorUpdateEntity {
    pub fn new(target: UpdateTarget, coordinator: Arc<HassioDataUpdateCoordinator>) -> Self {
        let name = match &target {
            UpdateTarget::Addon { slug } => {
                let addon_name = coordinator
                    .with_data(|d| d.addon(slug).map(|a| a.record.name.clone()))
                    .unwrap_or_else(|| slug.clone());
                format!("{} Update", addon_name)
            }
            UpdateTarget::Os => format!("{} Update", OS_TITLE),
            UpdateTarget::Core => format!("{} Update", CORE_TITLE),
            UpdateTarget::Supervisor => format!("{} Update", SUPERVISOR_TITLE),
        };
        Self {
            target,
            name,
            coordinator,
        }
    }

    pub fn target(&self) -> &UpdateTarget {
        &self.target
    }

    async fn send_install(&self, version: Option<&str>, backup: bool) -> HassioResult<()> {
        let client = self.coordinator.client();
        match &self.target {
            UpdateTarget::Addon { slug } => client.update_addon(slug, backup).await?,
            UpdateTarget::Os => client.update_os(version).await?,
            UpdateTarget::Core => client.update_core(version, backup).await?,
            UpdateTarget::Supervisor => client.update_supervisor().await?,
        };
        Ok(())
    }

    fn changelog(&self) -> Option<String> {
        let UpdateTarget::Addon { slug } = &self.target else {
            return None;
        };
        self.coordinator
            .with_data(|d| d.addon(slug).and_then(|a| a.changelog.clone()))
    }
}

#[async_trait]
impl UpdateEntity for SupervisorUpdateEntity {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn title(&self) -> Option<String> {
        match &self.target {
            UpdateTarget::Addon { slug } => self
                .coordinator
                .with_data(|d| d.addon(slug).map(|a| a.record.name.clone())),
            UpdateTarget::Os => Some(OS_TITLE.to_string()),
            UpdateTarget::Core => Some(CORE_TITLE.to_string()),
            UpdateTarget::Supervisor => Some(SUPERVISOR_TITLE.to_string()),
        }
    }

    fn installed_version(&self) -> Option<String> {
        self.coordinator.with_data(|d| self.target.versions(d).0)
    }

    fn latest_version(&self) -> Option<String> {
        self.coordinator.with_data(|d| self.target.versions(d).1)
    }

    fn supported_features(&self) -> UpdateEntityFeature {
        self.target.supported_features()
    }

    fn release_url(&self) -> Option<String> {
        let latest = self.latest_version()?;
        self.target.release_url(&latest)
    }

    fn release_summary(&self) -> Option<String> {
        self.changelog()
    }

    fn entity_picture(&self) -> Option<String> {
        match &self.target {
            UpdateTarget::Addon { slug } => self
                .coordinator
                .with_data(|d| d.addon(slug).is_some_and(|a| a.record.icon))
                .then(|| format!("/api/hassio/addons/{}/icon", slug)),
            UpdateTarget::Os | UpdateTarget::Core => Some(CORE_PICTURE.to_string()),
            UpdateTarget::Supervisor => Some(SUPERVISOR_PICTURE.to_string()),
        }
    }

    fn auto_update(&self) -> bool {
        match &self.target {
            UpdateTarget::Addon { slug } => self
                .coordinator
                .with_data(|d| d.addon(slug).is_some_and(|a| a.record.auto_update)),
            UpdateTarget::Supervisor => true,
            UpdateTarget::Os | UpdateTarget::Core => false,
        }
    }

    fn available(&self) -> bool {
        if !self.coordinator.last_update_success() {
            return false;
        }
        match &self.target {
            UpdateTarget::Addon { slug } => self.coordinator.with_data(|d| d.addon(slug).is_some()),
            UpdateTarget::Os => self.coordinator.with_data(HassioData::has_os),
            UpdateTarget::Core | UpdateTarget::Supervisor => true,
        }
    }

    async fn release_notes(&self) -> Option<String> {
        self.changelog()
    }

    async fn install(
        &self,
        version: Option<String>,
        backup: bool,
    ) -> Result<(), HomeAssistantError> {
        let title = self.title().unwrap_or_else(|| self.name.clone());

        self.send_install(version.as_deref(), backup)
            .await
            .map_err(|err| HomeAssistantError::new(format!("Error updating {}: {}", title, err)))?;

        if self.target.refresh_after_install() {
            debug!("Refreshing supervisor data after updating {}", title);
            if let Err(e) = self.coordinator.refresh().await {
                debug!("Refresh after update failed: {}", e);
            }
        }
        Ok(())
    }
}
