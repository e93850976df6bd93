//! HTTP client for the supervisor API

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error};

use super::config::HassioConfig;
use super::models::{
    AddonStats, CoreInfo, HostInfo, OsInfo, StoreInfo, SupervisorInfo, SupervisorRootInfo,
};

/// Header carrying the supervisor token
pub const X_HASSIO: &str = "X-Hassio-Key";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const PING_TIMEOUT: Duration = Duration::from_secs(15);

/// Failure talking to the supervisor
#[derive(Debug, Clone, Error)]
pub enum HassioApiError {
    #[error("{command} return code {status}")]
    Status { command: String, status: u16 },

    #[error("timeout on {0} request")]
    Timeout(String),

    #[error("client error on {command} request: {message}")]
    Client { command: String, message: String },

    #[error("invalid response from {command}: {message}")]
    InvalidResponse { command: String, message: String },

    /// The supervisor answered with `result != "ok"`
    #[error("{0}")]
    Api(String),
}

pub type HassioResult<T> = Result<T, HassioApiError>;

#[derive(Debug, Deserialize)]
struct Envelope {
    result: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
}

/// Supervisor API client
#[derive(Debug, Clone)]
pub struct HassIO {
    client: Client,
    base_url: String,
    token: String,
}

impl HassIO {
    pub fn new(config: &HassioConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &HassioConfig) -> Self {
        Self {
            client,
            base_url: config.base_url(),
            token: config.token.clone(),
        }
    }

    /// Send a request and return the raw response body
    ///
    /// Any status other than 200 or 400 is an error; a 400 carries the
    /// supervisor's error envelope. `timeout: None` waits indefinitely.
    async fn send(
        &self,
        method: Method,
        command: &str,
        payload: Option<&Value>,
        timeout: Option<Duration>,
    ) -> HassioResult<String> {
        let url = format!("{}{}", self.base_url, command);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url).header(X_HASSIO, &self.token);
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| transport_error(command, e))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::BAD_REQUEST {
            error!("{} return code {}", command, status.as_u16());
            return Err(HassioApiError::Status {
                command: command.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| transport_error(command, e))
    }

    /// Send a command and unwrap the `data` of an `ok` envelope
    async fn api_data<T: DeserializeOwned>(
        &self,
        method: Method,
        command: &str,
        payload: Option<Value>,
        timeout: Option<Duration>,
    ) -> HassioResult<T> {
        let envelope = self.envelope(method, command, payload, timeout).await?;
        if envelope.result != "ok" {
            return Err(HassioApiError::Api(envelope.message.unwrap_or_default()));
        }

        serde_json::from_value(envelope.data).map_err(|e| HassioApiError::InvalidResponse {
            command: command.to_string(),
            message: e.to_string(),
        })
    }

    /// Send a command and report whether the supervisor answered `ok`
    ///
    /// Failures count as `false`.
    async fn api_bool(
        &self,
        method: Method,
        command: &str,
        payload: Option<Value>,
        timeout: Option<Duration>,
    ) -> bool {
        self.envelope(method, command, payload, timeout)
            .await
            .is_ok_and(|envelope| envelope.result == "ok")
    }

    async fn envelope(
        &self,
        method: Method,
        command: &str,
        payload: Option<Value>,
        timeout: Option<Duration>,
    ) -> HassioResult<Envelope> {
        let body = self.send(method, command, payload.as_ref(), timeout).await?;
        serde_json::from_str(&body).map_err(|e| HassioApiError::InvalidResponse {
            command: command.to_string(),
            message: e.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, command: &str) -> HassioResult<T> {
        self.api_data(Method::GET, command, None, Some(DEFAULT_TIMEOUT))
            .await
    }

    /// Whether the supervisor answers its ping
    pub async fn is_connected(&self) -> bool {
        self.api_bool(Method::GET, "/supervisor/ping", None, Some(PING_TIMEOUT))
            .await
    }

    pub async fn get_info(&self) -> HassioResult<SupervisorRootInfo> {
        self.get("/info").await
    }

    pub async fn get_host_info(&self) -> HassioResult<HostInfo> {
        self.get("/host/info").await
    }

    pub async fn get_store(&self) -> HassioResult<StoreInfo> {
        self.get("/store").await
    }

    pub async fn get_core_info(&self) -> HassioResult<CoreInfo> {
        self.get("/core/info").await
    }

    pub async fn get_os_info(&self) -> HassioResult<OsInfo> {
        self.get("/os/info").await
    }

    pub async fn get_supervisor_info(&self) -> HassioResult<SupervisorInfo> {
        self.get("/supervisor/info").await
    }

    pub async fn get_addon_stats(&self, slug: &str) -> HassioResult<AddonStats> {
        self.get(&format!("/addons/{}/stats", slug)).await
    }

    /// Add-on changelog as plain text
    pub async fn get_addon_changelog(&self, slug: &str) -> HassioResult<String> {
        self.send(
            Method::GET,
            &format!("/addons/{}/changelog", slug),
            None,
            Some(DEFAULT_TIMEOUT),
        )
        .await
    }

    /// Tell the supervisor how to reach this instance's HTTP server
    pub async fn update_hass_api(&self, ssl: bool, port: u16, watchdog: bool) -> bool {
        let options = json!({"ssl": ssl, "port": port, "watchdog": watchdog});
        self.api_bool(
            Method::POST,
            "/homeassistant/options",
            Some(options),
            Some(DEFAULT_TIMEOUT),
        )
        .await
    }

    pub async fn update_hass_timezone(&self, timezone: &str) -> bool {
        self.api_bool(
            Method::POST,
            "/supervisor/options",
            Some(json!({"timezone": timezone})),
            Some(DEFAULT_TIMEOUT),
        )
        .await
    }

    pub async fn update_addon(&self, slug: &str, backup: bool) -> HassioResult<Value> {
        self.api_data(
            Method::POST,
            &format!("/addons/{}/update", slug),
            Some(json!({"backup": backup})),
            None,
        )
        .await
    }

    pub async fn update_os(&self, version: Option<&str>) -> HassioResult<Value> {
        let payload = version.map(|v| json!({"version": v}));
        self.api_data(Method::POST, "/os/update", payload, None).await
    }

    pub async fn update_core(&self, version: Option<&str>, backup: bool) -> HassioResult<Value> {
        let mut payload = json!({"backup": backup});
        if let Some(version) = version {
            payload["version"] = json!(version);
        }
        self.api_data(Method::POST, "/core/update", Some(payload), None)
            .await
    }

    pub async fn update_supervisor(&self) -> HassioResult<Value> {
        self.api_data(Method::POST, "/supervisor/update", None, None)
            .await
    }
}

fn transport_error(command: &str, err: reqwest::Error) -> HassioApiError {
    if err.is_timeout() {
        error!("Timeout on {} request", command);
        HassioApiError::Timeout(command.to_string())
    } else {
        error!("Client error on {} request {}", command, err);
        HassioApiError::Client {
            command: command.to_string(),
            message: err.to_string(),
        }
    }
}
