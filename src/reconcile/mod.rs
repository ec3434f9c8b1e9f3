// Reconciliation of the catalog with the installed apps
//
// The enumerator runs outside any lock. The diff is first computed against a
// read of the store; only a non-empty diff opens a write transaction, where it
// is recomputed against the locked state and applied in one commit.

pub mod desktop;
pub mod enumerator;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constants::{SETTING_LAST_RECONCILED_AT, SETTING_LAST_RECONCILE_SUMMARY};
use crate::db::schema::{self, AppRecord, NewApp};
use crate::error::{LauncherError, Result};
use crate::ordering;
use crate::store::AppStore;

pub use desktop::{ApplicationDir, DesktopEntryEnumerator};
pub use enumerator::{Enumerator, EnumeratorError, InstalledApp, ProfileFilter, StaticEnumerator};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub inserted: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub repaired: usize,
    /// Set when the enumerator failed and the pass was skipped
    pub skipped: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ReconcileReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            inserted: 0,
            deleted: 0,
            unchanged: 0,
            repaired: 0,
            skipped: None,
            started_at,
            finished_at: started_at,
        }
    }

    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.deleted > 0 || self.repaired > 0
    }
}

/// Diff between the catalog and one enumerator snapshot
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub inserts: Vec<NewApp>,
    pub deletes: Vec<i64>,
    pub unchanged: usize,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// Compute inserts and deletes for the profiles selected by `filter`.
/// Records of other profiles are never touched. Duplicate tuples in the
/// snapshot collapse to the first one.
pub fn plan_reconcile(known: &[AppRecord], installed: &[InstalledApp], filter: ProfileFilter) -> ReconcilePlan {
    let mut wanted: HashMap<(&str, i64), &str> = HashMap::new();
    let mut order: Vec<(&str, i64)> = Vec::new();
    for app in installed.iter().filter(|a| filter.matches(a.user_handle)) {
        let key = (app.package_name.as_str(), app.user_handle);
        if !wanted.contains_key(&key) {
            wanted.insert(key, app.label.as_str());
            order.push(key);
        }
    }

    let mut plan = ReconcilePlan::default();
    let mut present: HashSet<(&str, i64)> = HashSet::new();
    for record in known.iter().filter(|r| filter.matches(r.user_handle)) {
        if wanted.contains_key(&record.key()) {
            present.insert(record.key());
            plan.unchanged += 1;
        } else {
            plan.deletes.push(record.id);
        }
    }

    for key in order {
        if present.contains(&key) {
            continue;
        }
        plan.inserts.push(NewApp {
            package_name: key.0.to_string(),
            user_handle: key.1,
            app_name: wanted[&key].to_string(),
        });
    }
    plan
}

pub struct Reconciler {
    store: Arc<AppStore>,
    enumerator: Arc<dyn Enumerator>,
    filter: ProfileFilter,
}

impl Reconciler {
    pub fn new(store: Arc<AppStore>, enumerator: Arc<dyn Enumerator>) -> Self {
        Self { store, enumerator, filter: ProfileFilter::All }
    }

    pub fn with_filter(mut self, filter: ProfileFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconcile_cancellable(&AtomicBool::new(false))
    }

    /// One pass. An enumerator failure skips the pass and is not an error;
    /// cancellation returns `LauncherError::Cancelled` with nothing committed.
    pub fn reconcile_cancellable(&self, cancel: &AtomicBool) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new(Utc::now());

        let installed = match self.enumerator.list_installed_apps(self.filter) {
            Ok(apps) => apps,
            Err(e) => {
                log::warn!("Skipping reconciliation, enumerator unavailable: {}", e);
                report.skipped = Some(e.to_string());
                report.finished_at = Utc::now();
                return Ok(report);
            }
        };

        if cancel.load(Ordering::SeqCst) {
            return Err(LauncherError::Cancelled);
        }

        let preview = self.store.read(|conn| {
            let known = schema::list_all_apps(conn)?;
            Ok(plan_reconcile(&known, &installed, self.filter))
        })?;

        if preview.is_empty() {
            report.unchanged = preview.unchanged;
            report.finished_at = Utc::now();
            log::debug!("Reconciliation found no changes ({} apps)", report.unchanged);
            return Ok(report);
        }

        let report = self.store.write(|tx| {
            let known = schema::list_all_apps(tx)?;
            let plan = plan_reconcile(&known, &installed, self.filter);

            if cancel.load(Ordering::SeqCst) {
                return Err(LauncherError::Cancelled);
            }

            report.inserted = schema::insert_apps(tx, &plan.inserts)?;
            for id in &plan.deletes {
                if schema::delete_app(tx, *id)? {
                    report.deleted += 1;
                }
            }
            report.unchanged = plan.unchanged;
            report.repaired = ordering::repair_ranks(tx)?;
            report.finished_at = Utc::now();

            if report.changed() {
                schema::set_setting(tx, SETTING_LAST_RECONCILED_AT, &report.finished_at.to_rfc3339())?;
                schema::set_setting(tx, SETTING_LAST_RECONCILE_SUMMARY, &serde_json::to_string(&report)?)?;
            }
            Ok(report)
        })?;

        log::info!(
            "Reconciled: {} inserted, {} deleted, {} unchanged",
            report.inserted, report.deleted, report.unchanged
        );
        Ok(report)
    }
}
