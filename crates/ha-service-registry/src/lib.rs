//! Service registry with async handlers for Home Assistant
//!
//! Services are how callers act on entities: `update.install` is one. The
//! registry routes a call to the handler registered for its domain and
//! service, validates the call's data against the service's JSON schema,
//! and hands back whatever the handler returned or raised.

use dashmap::DashMap;
use ha_core::{Context, HomeAssistantError, ServiceCall, SupportsResponse};
use jsonschema::JSONSchema;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when working with services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    /// The handler ran and the operation failed
    #[error(transparent)]
    HomeAssistant(#[from] HomeAssistantError),

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("service does not support responses")]
    ResponseNotSupported,
}

/// Information about a registered service
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    /// Domain the service belongs to
    pub domain: String,
    /// Service name
    pub service: String,
    /// Human-readable name
    pub name: Option<String>,
    /// Description of what the service does
    pub description: Option<String>,
    /// JSON schema the service data must satisfy
    pub schema: Option<serde_json::Value>,
    /// Entity target selector
    pub target: Option<serde_json::Value>,
    /// Whether this service supports returning a response
    pub supports_response: SupportsResponse,
}

impl ServiceDescription {
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            name: None,
            description: None,
            schema: None,
            target: None,
            supports_response: SupportsResponse::None,
        }
    }
}

struct RegisteredService {
    handler: ServiceHandler,
    description: ServiceDescription,
}

/// The service registry manages all registered services
pub struct ServiceRegistry {
    /// Services indexed by "domain.service" key
    services: DashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a service with a bare description
    pub fn register<F, Fut>(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        handler: F,
        schema: Option<serde_json::Value>,
        supports_response: SupportsResponse,
    ) where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let description = ServiceDescription {
            schema,
            supports_response,
            ..ServiceDescription::new(domain, service)
        };
        self.register_with_description(description, handler);
    }

    /// Register a service with full description
    #[instrument(
        skip(self, description, handler),
        fields(domain = %description.domain, service = %description.service)
    )]
    pub fn register_with_description<F, Fut>(&self, description: ServiceDescription, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let key = format!("{}.{}", description.domain, description.service);
        debug!("Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        self.services.insert(
            key,
            RegisteredService {
                handler,
                description,
            },
        );
    }

    /// Call a service and wait for its handler to finish
    ///
    /// Errors raised by the handler are returned unchanged; integrations
    /// raise [`HomeAssistantError`], which arrives as
    /// [`ServiceError::HomeAssistant`].
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
        return_response: bool,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let registered = self.services.get(&key).ok_or_else(|| {
            warn!("Service not found");
            ServiceError::NotFound {
                domain: domain.to_string(),
                service: service.to_string(),
            }
        })?;

        if return_response && registered.description.supports_response == SupportsResponse::None {
            return Err(ServiceError::ResponseNotSupported);
        }

        if let Some(schema) = &registered.description.schema {
            validate_service_data(schema, &service_data)?;
        }

        let handler = registered.handler.clone();
        // Release the map shard before awaiting the handler
        drop(registered);

        debug!("Calling service");
        let call = ServiceCall::new(domain, service, service_data, context);
        let result = handler(call).await?;

        if return_response {
            Ok(result)
        } else {
            Ok(None)
        }
    }

    /// Check if a service exists
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    /// Get all services for a domain
    pub fn domain_services(&self, domain: &str) -> Vec<ServiceDescription> {
        self.services
            .iter()
            .filter(|s| s.description.domain == domain)
            .map(|s| s.description.clone())
            .collect()
    }

    /// Get all registered services grouped by domain
    pub fn all_services(&self) -> HashMap<String, Vec<ServiceDescription>> {
        let mut result: HashMap<String, Vec<ServiceDescription>> = HashMap::new();

        for entry in self.services.iter() {
            result
                .entry(entry.description.domain.clone())
                .or_default()
                .push(entry.description.clone());
        }

        result
    }

    /// Unregister a service
    #[instrument(skip(self))]
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        let removed = self
            .services
            .remove(&format!("{}.{}", domain, service))
            .is_some();

        if removed {
            debug!("Unregistered service");
        }

        removed
    }

    /// Get total number of registered services
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check service data against a service's JSON schema
fn validate_service_data(
    schema: &serde_json::Value,
    data: &serde_json::Value,
) -> Result<(), ServiceError> {
    let compiled = JSONSchema::compile(schema)
        .map_err(|e| ServiceError::InvalidData(format!("invalid schema: {}", e)))?;

    if let Err(errors) = compiled.validate(data) {
        let message = errors
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ServiceError::InvalidData(message));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = ServiceRegistry::new();

        registry.register(
            "test",
            "echo",
            |call: ServiceCall| async move { Ok(Some(call.service_data)) },
            None,
            SupportsResponse::Optional,
        );

        let result = registry
            .call("test", "echo", json!({"msg": "hello"}), Context::new(), true)
            .await
            .unwrap();

        assert_eq!(result, Some(json!({"msg": "hello"})));
    }

    #[tokio::test]
    async fn test_service_not_found() {
        let registry = ServiceRegistry::new();

        let result = registry
            .call("update", "install", json!({}), Context::new(), false)
            .await;

        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_response_not_supported() {
        let registry = ServiceRegistry::new();

        registry.register(
            "update",
            "install",
            |_call: ServiceCall| async move { Ok(None) },
            None,
            SupportsResponse::None,
        );

        let result = registry
            .call("update", "install", json!({}), Context::new(), false)
            .await;
        assert!(matches!(result, Ok(None)));

        let result = registry
            .call("update", "install", json!({}), Context::new(), true)
            .await;
        assert!(matches!(result, Err(ServiceError::ResponseNotSupported)));
    }

    #[tokio::test]
    async fn test_handler_error_surfaces_as_home_assistant_error() {
        let registry = ServiceRegistry::new();

        registry.register(
            "update",
            "install",
            |_: ServiceCall| async move {
                Err(HomeAssistantError::new("Error updating test: boom").into())
            },
            None,
            SupportsResponse::None,
        );

        let err = registry
            .call("update", "install", json!({}), Context::new(), false)
            .await
            .unwrap_err();

        match err {
            ServiceError::HomeAssistant(inner) => {
                assert_eq!(inner.message(), "Error updating test: boom")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_schema_rejects_invalid_data() {
        let registry = ServiceRegistry::new();

        registry.register(
            "update",
            "install",
            |_: ServiceCall| async { Ok(None) },
            Some(json!({
                "type": "object",
                "properties": {"backup": {"type": "boolean"}}
            })),
            SupportsResponse::None,
        );

        let ok = registry
            .call("update", "install", json!({"backup": true}), Context::new(), false)
            .await;
        assert!(ok.is_ok());

        let bad = registry
            .call("update", "install", json!({"backup": "yes"}), Context::new(), false)
            .await;
        assert!(matches!(bad, Err(ServiceError::InvalidData(_))));
    }

    #[test]
    fn test_has_service_and_unregister() {
        let registry = ServiceRegistry::new();

        registry.register(
            "update",
            "install",
            |_: ServiceCall| async { Ok(None) },
            None,
            SupportsResponse::None,
        );

        assert!(registry.has_service("update", "install"));
        assert!(!registry.has_service("update", "skip"));
        assert_eq!(registry.domain_services("update").len(), 1);
        assert_eq!(registry.all_services().len(), 1);

        assert!(registry.unregister("update", "install"));
        assert!(!registry.has_service("update", "install"));
        assert!(!registry.unregister("update", "install"));
        assert_eq!(registry.service_count(), 0);
    }
}
