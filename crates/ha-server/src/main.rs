//! Home Assistant Rust Server
//!
//! Loads `configuration.yaml`, sets up the update component and, when running
//! under a supervisor, the hassio integration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ha_components::{hassio, update, HomeAssistant};
use ha_config::Config;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the config directory
const ENV_CONFIG_DIR: &str = "HA_CONFIG_DIR";
const DEFAULT_CONFIG_DIR: &str = "/config";

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(ENV_CONFIG_DIR).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string())
        .into()
}

fn load_config(dir: &Path) -> Result<Config> {
    if !dir.join("configuration.yaml").exists() {
        warn!("No configuration.yaml in {}, using defaults", dir.display());
        return Ok(Config::default());
    }
    Config::load(dir).with_context(|| format!("loading configuration from {}", dir.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Home Assistant (Rust)");

    let dir = config_dir();
    let config = load_config(&dir)?;
    let hass = HomeAssistant::new(config);

    update::setup(&hass);

    if hass.config.has_component(hassio::DOMAIN) || hassio::HassioConfig::from_env().is_some() {
        if !hassio::async_setup(&hass).await {
            warn!("Supervisor integration not set up");
        }
    }

    info!("Home Assistant is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    hass.stop().await;

    Ok(())
}
