//! Config entries manager
//!
//! Holds the config entries of the running instance and drives their
//! setup and unload through the integration's [`ConfigEntryHandler`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryState};
use crate::lifecycle::{calculate_retry_delay, InvalidTransition};

#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Unload failed: {0}")]
    UnloadFailed(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Outcome of an integration's entry setup that did not succeed
#[derive(Debug, Clone, Error)]
pub enum EntrySetupError {
    /// Transient; the entry goes to `SetupRetry` and is retried with backoff
    #[error("{0}")]
    NotReady(String),

    /// Permanent; the entry goes to `SetupError`
    #[error("{0}")]
    Failed(String),
}

/// Integration hooks for config entries of one domain
#[async_trait]
pub trait ConfigEntryHandler: Send + Sync {
    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<(), EntrySetupError>;

    async fn unload_entry(&self, entry: &ConfigEntry) -> Result<(), String>;
}

/// Config entries manager
pub struct ConfigEntries {
    /// entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// domain -> entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    handlers: DashMap<String, Arc<dyn ConfigEntryHandler>>,

    /// Pending setup retries by entry_id
    retries: DashMap<String, JoinHandle<()>>,

    /// Serializes setup and unload
    setup_lock: Mutex<()>,
}

impl Default for ConfigEntries {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigEntries {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            by_unique_id: DashMap::new(),
            handlers: DashMap::new(),
            retries: DashMap::new(),
            setup_lock: Mutex::new(()),
        }
    }

    fn index_entry(&self, entry: &ConfigEntry) {
        self.entries.insert(entry.entry_id.clone(), entry.clone());
        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry.entry_id.clone());
        if let Some(unique_id) = &entry.unique_id {
            self.by_unique_id.insert(
                (entry.domain.clone(), unique_id.clone()),
                entry.entry_id.clone(),
            );
        }
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }
        if let Some(unique_id) = &entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }
        self.entries.remove(&entry.entry_id);
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        let entry_id = self
            .by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))?
            .clone();
        self.get(&entry_id)
    }

    /// Add a new entry; a duplicate `(domain, unique_id)` is rejected
    pub fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(unique_id) = &entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(&entry);
        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );
        Ok(entry)
    }

    /// Unload (when loaded) and forget an entry
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.state != ConfigEntryState::NotLoaded {
            self.unload(entry_id).await?;
        }

        self.unindex_entry(&entry);
        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );
        Ok(entry)
    }

    pub fn register_handler(&self, domain: &str, handler: Arc<dyn ConfigEntryHandler>) {
        self.handlers.insert(domain.to_string(), handler);
        debug!("Registered config entry handler for domain: {}", domain);
    }

    pub fn has_handler(&self, domain: &str) -> bool {
        self.handlers.contains_key(domain)
    }

    fn set_state(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        entry.modified_at = Utc::now();
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(entry.clone())
    }

    /// Set up an entry, scheduling retries while the integration is not ready
    ///
    /// Returns the state the entry ended up in.
    pub async fn setup(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<ConfigEntryState> {
        let state = self.attempt_setup(entry_id).await?;
        if state == ConfigEntryState::SetupRetry {
            self.schedule_retry(entry_id);
        }
        Ok(state)
    }

    async fn attempt_setup(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntryState> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.is_disabled() {
            debug!("Skipping setup for disabled entry: {}", entry_id);
            return Ok(entry.state);
        }

        let entry = self.set_state(entry_id, ConfigEntryState::SetupInProgress, None)?;
        let handler = self.handlers.get(&entry.domain).map(|h| Arc::clone(h.value()));

        let Some(handler) = handler else {
            debug!("No handler for domain {}, marking as loaded", entry.domain);
            self.set_state(entry_id, ConfigEntryState::Loaded, None)?;
            return Ok(ConfigEntryState::Loaded);
        };

        match handler.setup_entry(&entry).await {
            Ok(()) => {
                self.set_state(entry_id, ConfigEntryState::Loaded, None)?;
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                Ok(ConfigEntryState::Loaded)
            }
            Err(EntrySetupError::NotReady(reason)) => {
                warn!("Config entry '{}' not ready yet: {}", entry.title, reason);
                self.set_state(entry_id, ConfigEntryState::SetupRetry, Some(reason))?;
                Ok(ConfigEntryState::SetupRetry)
            }
            Err(EntrySetupError::Failed(reason)) => {
                warn!("Setup failed for entry {}: {}", entry_id, reason);
                self.set_state(entry_id, ConfigEntryState::SetupError, Some(reason.clone()))?;
                Err(ConfigEntriesError::SetupFailed(reason))
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, entry_id: &str) {
        let manager = Arc::clone(self);
        let id = entry_id.to_string();

        let handle = tokio::spawn(async move {
            loop {
                let tries = match manager.entries.get_mut(&id) {
                    Some(mut entry) => {
                        entry.tries += 1;
                        entry.tries
                    }
                    None => return,
                };
                let delay = calculate_retry_delay(tries - 1);
                debug!("Retrying setup of {} in {:?}", id, delay);
                tokio::time::sleep(delay).await;

                match manager.attempt_setup(&id).await {
                    Ok(ConfigEntryState::SetupRetry) => continue,
                    _ => break,
                }
            }
            manager.retries.remove(&id);
        });

        if let Some(previous) = self.retries.insert(entry_id.to_string(), handle) {
            previous.abort();
        }
    }

    /// Unload an entry through its handler
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        if let Some((_, retry)) = self.retries.remove(entry_id) {
            retry.abort();
        }

        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if !entry.state.is_recoverable() {
            return Err(ConfigEntriesError::CannotUnload(entry.state));
        }
        if entry.state == ConfigEntryState::NotLoaded {
            return Ok(());
        }

        let was_loaded = entry.is_loaded();
        let entry = self.set_state(entry_id, ConfigEntryState::UnloadInProgress, None)?;
        let handler = self.handlers.get(&entry.domain).map(|h| Arc::clone(h.value()));

        if let (true, Some(handler)) = (was_loaded, handler) {
            if let Err(reason) = handler.unload_entry(&entry).await {
                warn!("Unload failed for entry {}: {}", entry_id, reason);
                self.set_state(entry_id, ConfigEntryState::FailedUnload, Some(reason.clone()))?;
                return Err(ConfigEntriesError::UnloadFailed(reason));
            }
        }

        self.set_state(entry_id, ConfigEntryState::NotLoaded, None)?;
        info!("Unloaded entry: {} ({})", entry.title, entry_id);
        Ok(())
    }

    /// Whether a retry is scheduled for the entry
    pub fn retry_pending(&self, entry_id: &str) -> bool {
        self.retries.contains_key(entry_id)
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
