//! Home Assistant Built-in Components
//!
//! - [`update`] - update entities and the `update.install` service
//! - [`hassio`] - the supervisor integration providing update entities
//!   for add-ons, the operating system, core and the supervisor itself

mod hass;
pub mod hassio;
pub mod update;

pub use hass::HomeAssistant;
