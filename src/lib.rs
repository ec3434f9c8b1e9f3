// Launcher Registry - Library Entry Point
//
// Keeps a persisted, user-ordered catalog of installed apps in sync with the
// host and maintains the drawer, favorites and lock orderings over it.

pub mod constants;
pub mod error;
pub mod db;
pub mod store;
pub mod projection;
pub mod ordering;
pub mod reconcile;
pub mod events;
pub mod backup;
pub mod config;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Serialize;

use crate::backup::{BackupFile, RestoreSummary};
use crate::config::LauncherConfig;
use crate::db::schema::AppRecord;
use crate::error::Result;
use crate::events::{EventOutcome, LauncherEvent};
use crate::ordering::OrderingEngine;
use crate::projection::Query;
use crate::reconcile::{DesktopEntryEnumerator, Enumerator, ProfileFilter, Reconciler};
use crate::store::AppStore;

pub use crate::error::LauncherError;

/// What has to happen before an app may be started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LaunchDecision {
    Allowed,
    /// Locked app: run the authentication flow first
    RequiresAuth,
    /// No such record (uninstalled since the view was drawn)
    Unknown,
}

/// Store, ordering engine and reconciler over one catalog. Share it via `Arc`.
pub struct Launcher {
    store: Arc<AppStore>,
    engine: OrderingEngine,
    reconciler: Reconciler,
}

impl Launcher {
    pub fn new(store: Arc<AppStore>, enumerator: Arc<dyn Enumerator>) -> Self {
        Self {
            engine: OrderingEngine::new(Arc::clone(&store)),
            reconciler: Reconciler::new(Arc::clone(&store), enumerator),
            store,
        }
    }

    pub fn with_filter(mut self, filter: ProfileFilter) -> Self {
        self.reconciler = self.reconciler.with_filter(filter);
        self
    }

    /// Open the configured database and enumerate desktop entries from the
    /// configured application directories.
    pub fn open(config: &LauncherConfig) -> Result<Self> {
        let store = Arc::new(AppStore::open(&config.resolved_db_path()?)?);
        let enumerator = Arc::new(DesktopEntryEnumerator::new(config.application_dirs.clone()));
        Ok(Self::new(store, enumerator).with_filter(config.profile_filter()))
    }

    pub fn store(&self) -> &Arc<AppStore> {
        &self.store
    }

    pub fn engine(&self) -> &OrderingEngine {
        &self.engine
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn handle_event(&self, event: LauncherEvent) -> Result<EventOutcome> {
        events::dispatch(self, event, &AtomicBool::new(false))
    }

    pub fn launch_decision(&self, id: i64) -> Result<LaunchDecision> {
        let decision = match self.store.get(id)? {
            None => LaunchDecision::Unknown,
            Some(app) if app.lock => LaunchDecision::RequiresAuth,
            Some(_) => LaunchDecision::Allowed,
        };
        Ok(decision)
    }

    /// Whether launching `id` needs authentication first. A missing record
    /// is `LauncherError::AppNotFound`.
    pub fn requires_auth(&self, id: i64) -> Result<bool> {
        match self.launch_decision(id)? {
            LaunchDecision::Allowed => Ok(false),
            LaunchDecision::RequiresAuth => Ok(true),
            LaunchDecision::Unknown => Err(LauncherError::AppNotFound(id)),
        }
    }

    /// Drawer view filtered by label or package, from the latest snapshot
    pub fn search_drawer(&self, text: &str) -> Vec<AppRecord> {
        let all = self.store.snapshot(Query::All);
        projection::search_drawer(&all, text)
    }

    pub fn delete_app(&self, id: i64) -> Result<bool> {
        let deleted = self.store.delete(id)?;
        if deleted {
            log::info!("Deleted app {}", id);
        }
        Ok(deleted)
    }

    /// Drop the whole catalog; the next reconciliation rebuilds it with fresh ids.
    pub fn reset(&self) -> Result<usize> {
        self.store.wipe_and_reset()
    }

    pub fn export_backup(&self) -> Result<BackupFile> {
        backup::export_backup(&self.store)
    }

    pub fn restore_backup(&self, backup: &BackupFile) -> Result<RestoreSummary> {
        backup::restore_backup(&self.store, backup)
    }
}
