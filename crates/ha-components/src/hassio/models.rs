//! Supervisor API payloads
//!
//! Only the fields the integration reads are modelled; everything else in
//! a response is ignored.

use serde::{Deserialize, Serialize};

/// `GET /info`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorRootInfo {
    pub supervisor: Option<String>,
    pub homeassistant: Option<String>,
    /// Operating system version when running on Home Assistant OS
    pub hassos: Option<String>,
    pub hostname: Option<String>,
    pub machine: Option<String>,
    pub arch: Option<String>,
    pub channel: Option<String>,
}

/// `GET /host/info`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HostInfo {
    pub chassis: Option<String>,
    pub operating_system: Option<String>,
    pub kernel: Option<String>,
    pub hostname: Option<String>,
}

/// `GET /store`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreInfo {
    pub repositories: Vec<StoreRepository>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreRepository {
    pub slug: String,
    pub name: String,
    pub source: Option<String>,
    pub url: Option<String>,
    pub maintainer: Option<String>,
}

/// `GET /core/info`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoreInfo {
    pub version: Option<String>,
    pub version_latest: Option<String>,
    pub update_available: bool,
    pub machine: Option<String>,
}

/// `GET /os/info`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OsInfo {
    pub version: Option<String>,
    pub version_latest: Option<String>,
    pub update_available: bool,
    pub board: Option<String>,
}

/// `GET /supervisor/info`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorInfo {
    pub version: Option<String>,
    pub version_latest: Option<String>,
    pub update_available: bool,
    pub channel: Option<String>,
    pub addons: Vec<AddonRecord>,
}

/// One installed add-on as listed by `/supervisor/info`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AddonRecord {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// `started` or `stopped`
    pub state: Option<String>,
    pub installed: bool,
    pub update_available: bool,
    /// Whether the add-on ships an icon
    pub icon: bool,
    pub version: Option<String>,
    pub version_latest: Option<String>,
    /// Repository slug, resolved to a display name through `/store`
    pub repository: Option<String>,
    pub url: Option<String>,
    pub auto_update: bool,
}

impl AddonRecord {
    pub fn is_started(&self) -> bool {
        self.state.as_deref() == Some("started")
    }
}

/// `GET /addons/{slug}/stats`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AddonStats {
    pub cpu_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_percent: f64,
    pub network_rx: u64,
    pub network_tx: u64,
    pub blk_read: u64,
    pub blk_write: u64,
}
