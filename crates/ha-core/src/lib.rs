//! Core types for Home Assistant
//!
//! This crate provides the fundamental types shared by the state machine,
//! the service registry, config entries and the built-in components:
//! EntityId, State, Context, ServiceCall and the generic HomeAssistantError.

mod context;
mod entity_id;
mod error;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use error::HomeAssistantError;
pub use service_call::{ServiceCall, SupportsResponse};
pub use state::State;

/// Maximum length for a state value (matches Python HA)
pub const MAX_STATE_LENGTH: usize = 255;

/// State value used when the real value is missing or too long
pub const STATE_UNKNOWN: &str = "unknown";

pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";

/// State of an entity whose data source cannot be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Standard event types used by Home Assistant
pub mod events {
    use super::*;

    /// Event type for state changes
    pub const STATE_CHANGED: &str = "state_changed";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }
}
