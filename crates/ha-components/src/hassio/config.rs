//! Supervisor connection settings from the environment

/// Host (and optional port) of the supervisor API
pub const ENV_HASSIO: &str = "HASSIO";
/// Token sent with every supervisor request
pub const ENV_HASSIO_TOKEN: &str = "HASSIO_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HassioConfig {
    /// e.g. `172.30.32.2` or `127.0.0.1:8080`
    pub host: String,
    pub token: String,
}

impl HassioConfig {
    /// Read the settings through `lookup`; `None` when `HASSIO` is unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let host = lookup(ENV_HASSIO).filter(|h| !h.is_empty())?;
        let token = lookup(ENV_HASSIO_TOKEN).unwrap_or_default();
        Some(Self { host, token })
    }

    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.host)
    }
}
