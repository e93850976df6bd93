//! Mock supervisor API on a local wiremock server

use ha_components::hassio::HassioConfig;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use super::fixtures::load_json_fixture;

pub const SUPERVISOR_TOKEN: &str = "abcdefgh";

/// A supervisor answering every request the integration makes during setup
pub struct MockSupervisor {
    pub server: MockServer,
}

impl MockSupervisor {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let supervisor = Self { server };

        supervisor.mock_post("/homeassistant/options", json!({"result": "ok"})).await;
        supervisor.mock_get("/supervisor/ping", json!({"result": "ok"})).await;
        supervisor.mock_post("/supervisor/options", json!({"result": "ok"})).await;
        supervisor.mock_get("/info", load_json_fixture("info.json")).await;
        supervisor.mock_get("/store", load_json_fixture("store.json")).await;
        supervisor.mock_get("/host/info", load_json_fixture("host_info.json")).await;
        supervisor.mock_get("/core/info", load_json_fixture("core_info.json")).await;
        supervisor.mock_get("/os/info", load_json_fixture("os_info.json")).await;
        supervisor
            .mock_get("/supervisor/info", load_json_fixture("supervisor_info.json"))
            .await;
        supervisor
            .mock_get("/addons/test/stats", load_json_fixture("addon_test_stats.json"))
            .await;
        supervisor.mock_text("/addons/test/changelog", "").await;
        supervisor.mock_text("/addons/test2/changelog", "").await;

        supervisor
    }

    /// Connection settings pointing the integration at this server
    pub fn config(&self) -> HassioConfig {
        HassioConfig {
            host: self.server.address().to_string(),
            token: SUPERVISOR_TOKEN.to_string(),
        }
    }

    pub async fn mock_get(&self, route: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("X-Hassio-Key", SUPERVISOR_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_text(&self, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_post(&self, route: &str, body: Value) {
        self.mock_post_response(route, ResponseTemplate::new(200).set_body_json(body))
            .await;
    }

    pub async fn mock_post_response(&self, route: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Requests received for `route` so far
    pub async fn requests_to(&self, route: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == route)
            .collect()
    }

    /// JSON bodies of the POSTs received for `route`
    pub async fn posted_json(&self, route: &str) -> Vec<Value> {
        self.requests_to(route)
            .await
            .into_iter()
            .filter(|r| r.method.as_str() == "POST")
            .map(|r| serde_json::from_slice(&r.body).unwrap_or(Value::Null))
            .collect()
    }
}
