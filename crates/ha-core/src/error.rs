//! Generic operational error raised by integrations

use thiserror::Error;

/// The host-level error an integration raises when an operation fails
///
/// Integrations translate their own failure types (an HTTP client error, a
/// rejected API call) into this one at their boundary so that callers of a
/// service see a uniform failure regardless of which integration handled it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HomeAssistantError {
    message: String,
}

impl HomeAssistantError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HomeAssistantError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HomeAssistantError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
