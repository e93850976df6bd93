//! Test harness for the built-in components
//!
//! A [`TestHomeAssistant`] built from a configuration fixture, a
//! [`MockConfigEntry`] builder and a [`MockSupervisor`] standing in for the
//! supervisor API.

#![allow(dead_code)]

mod fixtures;
mod mock_config_entry;
mod supervisor;
mod test_hass;

pub use fixtures::*;
pub use mock_config_entry::*;
pub use supervisor::*;
pub use test_hass::*;
