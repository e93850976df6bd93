//! Typed sections of configuration.yaml
//!
//! `homeassistant:` becomes [`CoreConfig`], `http:` becomes [`HttpConfig`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// Default port of the HTTP server
pub const SERVER_PORT: u16 = 8123;

/// Core Home Assistant configuration from the `homeassistant:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_name")]
    pub name: String,

    /// Time zone (e.g., "America/Los_Angeles")
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub external_url: Option<String>,

    #[serde(default)]
    pub internal_url: Option<String>,
}

fn default_name() -> String {
    "Home".to_string()
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            time_zone: default_time_zone(),
            language: default_language(),
            external_url: None,
            internal_url: None,
        }
    }
}

impl CoreConfig {
    /// Parse the `homeassistant:` section; absent means defaults
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        section(yaml, "homeassistant")
    }
}

/// HTTP server options from the `http:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub server_host: Option<String>,

    #[serde(default)]
    pub server_port: Option<u16>,

    #[serde(default)]
    pub ssl_certificate: Option<String>,

    #[serde(default)]
    pub ssl_key: Option<String>,
}

impl HttpConfig {
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        section(yaml, "http")
    }

    /// Configured port or [`SERVER_PORT`]
    pub fn port(&self) -> u16 {
        self.server_port.unwrap_or(SERVER_PORT)
    }

    pub fn uses_ssl(&self) -> bool {
        self.ssl_certificate.is_some()
    }
}

/// A loaded configuration.yaml
#[derive(Debug, Clone)]
pub struct Config {
    pub core: CoreConfig,
    pub http: HttpConfig,
    raw: Value,
}

impl Config {
    /// Load `configuration.yaml` from a config directory
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let yaml = load_yaml(config_dir, "configuration.yaml")?;
        Self::from_yaml(yaml)
    }

    pub fn from_yaml(yaml: Value) -> ConfigResult<Self> {
        if !yaml.is_mapping() {
            return Err(ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: "configuration must be a mapping".to_string(),
            });
        }

        Ok(Self {
            core: CoreConfig::from_yaml(&yaml)?,
            http: HttpConfig::from_yaml(&yaml)?,
            raw: yaml,
        })
    }

    /// Whether a top-level key for `domain` is present
    pub fn has_component(&self, domain: &str) -> bool {
        self.raw
            .as_mapping()
            .is_some_and(|m| m.contains_key(domain))
    }

    /// Raw YAML of a component section
    pub fn component(&self, domain: &str) -> Option<&Value> {
        self.raw.get(domain)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            http: HttpConfig::default(),
            raw: Value::Mapping(Mapping::new()),
        }
    }
}

fn section<T: DeserializeOwned + Default>(yaml: &Value, key: &str) -> ConfigResult<T> {
    let mapping = yaml.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
        key: "root".to_string(),
        reason: "configuration must be a mapping".to_string(),
    })?;

    match mapping.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}
