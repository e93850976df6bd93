//! Config Entries
//!
//! Config entries represent individual integration instances and manage
//! their lifecycle (setup, retry, unload). Entries live in memory
//! for the lifetime of the process.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`ConfigEntryHandler`] - Integration setup/unload hooks

pub mod entry;
pub mod lifecycle;
pub mod manager;

pub use entry::{ConfigEntry, ConfigEntryDisabledBy, ConfigEntrySource, ConfigEntryState};
pub use lifecycle::{calculate_retry_delay, InvalidTransition};
pub use manager::{
    ConfigEntries, ConfigEntriesError, ConfigEntriesResult, ConfigEntryHandler, EntrySetupError,
};
