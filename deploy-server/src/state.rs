use crate::config::AppConfig;
use crate::site::{CaddyConfigGenerator, ProxyConfigGenerator};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sites: SiteLocks,
    pub proxy: Arc<dyn ProxyConfigGenerator>,
    pub connections: AtomicUsize,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self::with_generator(config, Arc::new(CaddyConfigGenerator))
    }

    pub fn with_generator(config: AppConfig, proxy: Arc<dyn ProxyConfigGenerator>) -> Self {
        Self {
            config: Arc::new(config),
            sites: SiteLocks::new(),
            proxy,
            connections: AtomicUsize::new(0),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// One async mutex per site.
///
/// Every filesystem mutation for a site runs while holding that site's guard,
/// so at most one mutation per site is in flight across all connections.
/// Waiters are served in FIFO order. Different sites never contend.
pub struct SiteLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SiteLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn lock(&self, site: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(site.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for SiteLocks {
    fn default() -> Self {
        Self::new()
    }
}
