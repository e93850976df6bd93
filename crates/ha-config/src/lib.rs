//! YAML configuration loading for Home Assistant
//!
//! Loads configuration.yaml with support for the custom tags
//! `!include`, `!secret` and `!env_var`, and exposes the typed
//! `homeassistant:` and `http:` sections.
//!
//! # Example
//!
//! ```ignore
//! use ha_config::Config;
//!
//! let config = Config::load("/config")?;
//! println!("serving on port {}", config.http.port());
//! ```

mod core_config;
mod error;
mod loader;
mod secrets;

pub use core_config::{Config, CoreConfig, HttpConfig, SERVER_PORT};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, EnvLookup, YamlLoader};
pub use secrets::Secrets;

pub use serde_yaml::Value;
