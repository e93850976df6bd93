//! Periodic supervisor data refresh shared by all hassio entities

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::handler::{HassIO, HassioApiError, HassioResult};
use super::models::{
    AddonRecord, AddonStats, CoreInfo, HostInfo, OsInfo, SupervisorInfo, SupervisorRootInfo,
};

/// How often the supervisor is polled
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(55 * 60);

/// An installed add-on with the details fetched for it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddonData {
    pub record: AddonRecord,
    /// Empty when the changelog could not be fetched
    pub changelog: Option<String>,
    /// Only fetched for started add-ons
    pub stats: Option<AddonStats>,
    /// Display name of the add-on's repository
    pub repository: String,
}

/// Snapshot of everything the supervisor reported
#[derive(Debug, Clone, Default)]
pub struct HassioData {
    pub info: Option<SupervisorRootInfo>,
    pub host_info: Option<HostInfo>,
    /// Repository slug -> display name
    pub repositories: HashMap<String, String>,
    pub core: Option<CoreInfo>,
    pub os: Option<OsInfo>,
    pub supervisor: Option<SupervisorInfo>,
    /// Add-on slug -> data
    pub addons: BTreeMap<String, AddonData>,
}

impl HassioData {
    pub fn addon(&self, slug: &str) -> Option<&AddonData> {
        self.addons.get(slug)
    }

    /// Whether the host runs Home Assistant OS
    pub fn has_os(&self) -> bool {
        self.os.as_ref().is_some_and(|os| os.version.is_some())
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;

pub struct HassioDataUpdateCoordinator {
    client: Arc<HassIO>,
    data: RwLock<HassioData>,
    last_update_success: AtomicBool,
    listeners: DashMap<u64, Listener>,
    next_listener_id: AtomicU64,
    poll: Mutex<Option<JoinHandle<()>>>,
    update_interval: Duration,
}

impl HassioDataUpdateCoordinator {
    pub fn new(client: Arc<HassIO>) -> Self {
        Self::with_interval(client, UPDATE_INTERVAL)
    }

    pub fn with_interval(client: Arc<HassIO>, update_interval: Duration) -> Self {
        Self {
            client,
            data: RwLock::new(HassioData::default()),
            last_update_success: AtomicBool::new(false),
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(0),
            poll: Mutex::new(None),
            update_interval,
        }
    }

    pub fn client(&self) -> &Arc<HassIO> {
        &self.client
    }

    /// Clone of the latest snapshot
    pub fn data(&self) -> HassioData {
        self.data.read().map(|d| d.clone()).unwrap_or_default()
    }

    /// Read the latest snapshot without cloning it
    pub fn with_data<R>(&self, f: impl FnOnce(&HassioData) -> R) -> R {
        match self.data.read() {
            Ok(data) => f(&data),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    /// Call `listener` after every refresh; returns an id for [`Self::remove_listener`]
    pub fn add_listener(&self, listener: impl Fn() + Send + Sync + 'static) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(id, Arc::new(listener));
        id
    }

    pub fn remove_listener(&self, id: u64) {
        self.listeners.remove(&id);
    }

    fn notify_listeners(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .iter()
            .map(|l| Arc::clone(l.value()))
            .collect();
        for listener in listeners {
            listener();
        }
    }

    /// Fetch everything from the supervisor and notify listeners
    ///
    /// Each failed fetch keeps its previous value. The refresh only fails
    /// when there has never been any supervisor info.
    pub async fn refresh(&self) -> HassioResult<()> {
        let previous = self.data();
        let client = &self.client;

        let (info, host_info, store, core, os, supervisor) = tokio::join!(
            client.get_info(),
            client.get_host_info(),
            client.get_store(),
            client.get_core_info(),
            client.get_os_info(),
            client.get_supervisor_info(),
        );

        let repositories = match keep_previous("/store", store, None) {
            Some(store) => store
                .repositories
                .into_iter()
                .map(|r| (r.slug, r.name))
                .collect(),
            None => previous.repositories.clone(),
        };

        let supervisor_result = supervisor.map_err(|e| {
            warn!("Could not fetch /supervisor/info: {}", e);
            e
        });
        let supervisor = match (supervisor_result, previous.supervisor.clone()) {
            (Ok(info), _) => info,
            (Err(_), Some(previous)) => previous,
            (Err(e), None) => {
                self.last_update_success.store(false, Ordering::SeqCst);
                self.notify_listeners();
                return Err(e);
            }
        };

        let addons = self.fetch_addons(&supervisor.addons, &repositories).await;

        let data = HassioData {
            info: keep_previous("/info", info, previous.info),
            host_info: keep_previous("/host/info", host_info, previous.host_info),
            repositories,
            core: keep_previous("/core/info", core, previous.core),
            os: keep_previous("/os/info", os, previous.os),
            supervisor: Some(supervisor),
            addons,
        };

        self.set_updated_data(data);
        debug!("Supervisor data refreshed");
        Ok(())
    }

    /// Replace the snapshot without fetching and notify listeners
    pub fn set_updated_data(&self, data: HassioData) {
        match self.data.write() {
            Ok(mut guard) => *guard = data,
            Err(poisoned) => *poisoned.into_inner() = data,
        }
        self.last_update_success.store(true, Ordering::SeqCst);
        self.notify_listeners();
    }

    async fn fetch_addons(
        &self,
        records: &[AddonRecord],
        repositories: &HashMap<String, String>,
    ) -> BTreeMap<String, AddonData> {
        let fetches = records.iter().map(|record| async move {
            let changelog = match self.client.get_addon_changelog(&record.slug).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("Could not fetch changelog for {}: {}", record.slug, e);
                    None
                }
            };

            let stats = if record.is_started() {
                match self.client.get_addon_stats(&record.slug).await {
                    Ok(stats) => Some(stats),
                    Err(e) => {
                        warn!("Could not fetch stats for {}: {}", record.slug, e);
                        None
                    }
                }
            } else {
                None
            };

            let repository = record
                .repository
                .as_ref()
                .map(|slug| repositories.get(slug).cloned().unwrap_or_else(|| slug.clone()))
                .unwrap_or_default();

            (
                record.slug.clone(),
                AddonData {
                    record: record.clone(),
                    changelog,
                    stats,
                    repository,
                },
            )
        });

        join_all(fetches).await.into_iter().collect()
    }

    /// Refresh every `update_interval` until stopped or dropped
    pub fn start_polling(self: &Arc<Self>) {
        let coordinator: Weak<Self> = Arc::downgrade(self);
        let interval = self.update_interval;

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                if let Err(e) = coordinator.refresh().await {
                    warn!("Error fetching supervisor data: {}", e);
                }
            }
        });

        if let Ok(mut poll) = self.poll.lock() {
            if let Some(previous) = poll.replace(handle) {
                previous.abort();
            }
        }
    }

    pub fn stop_polling(&self) {
        if let Ok(mut poll) = self.poll.lock() {
            if let Some(handle) = poll.take() {
                handle.abort();
            }
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll
            .lock()
            .map(|p| p.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Stop polling and drop every listener
    pub fn shutdown(&self) {
        self.stop_polling();
        self.listeners.clear();
    }
}

impl Drop for HassioDataUpdateCoordinator {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

fn keep_previous<T>(
    command: &str,
    fetched: Result<T, HassioApiError>,
    previous: Option<T>,
) -> Option<T> {
    match fetched {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Could not fetch {}: {}", command, e);
            previous
        }
    }
}
