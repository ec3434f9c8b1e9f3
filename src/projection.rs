// View projections
//
// Each view is a pure function of the full record set. The hub keeps the
// latest snapshot of every view and pushes a fresh one to subscribers after
// each commit that changes it. Snapshots are immutable and shared.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::schema::AppRecord;

pub type Snapshot = Arc<[AppRecord]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Query {
    All,
    Drawer,
    Favorites,
    Hidden,
    Locked,
}

impl Query {
    pub const ALL: [Query; 5] = [Query::All, Query::Drawer, Query::Favorites, Query::Hidden, Query::Locked];

    pub fn as_str(self) -> &'static str {
        match self {
            Query::All => "all",
            Query::Drawer => "drawer",
            Query::Favorites => "favorites",
            Query::Hidden => "hidden",
            Query::Locked => "locked",
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Query {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Query::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown view '{}' (expected all, drawer, favorites, hidden or locked)", s))
    }
}

// ----- Pure projections -----

/// Sort key matching SQLite's NOCASE collation (ASCII-only folding).
pub fn name_key(app: &AppRecord) -> String {
    app.app_name.to_ascii_lowercase()
}

fn sorted_by<F>(apps: &[AppRecord], keep: impl Fn(&AppRecord) -> bool, cmp: F) -> Vec<AppRecord>
where
    F: Fn(&AppRecord, &AppRecord) -> std::cmp::Ordering,
{
    let mut view: Vec<AppRecord> = apps.iter().filter(|a| keep(a)).cloned().collect();
    view.sort_by(|a, b| cmp(a, b));
    view
}

pub fn all_apps(apps: &[AppRecord]) -> Vec<AppRecord> {
    sorted_by(apps, |_| true, |a, b| name_key(a).cmp(&name_key(b)).then(a.id.cmp(&b.id)))
}

/// Non-hidden apps by drawer rank ascending, then name. Automatic rows (-1)
/// sort ahead of every manual rank; this ordering is part of the contract.
pub fn drawer_apps(apps: &[AppRecord]) -> Vec<AppRecord> {
    sorted_by(
        apps,
        |a| !a.hidden,
        |a, b| {
            a.global_app_order
                .cmp(&b.global_app_order)
                .then_with(|| name_key(a).cmp(&name_key(b)))
                .then(a.id.cmp(&b.id))
        },
    )
}

pub fn favorite_apps(apps: &[AppRecord]) -> Vec<AppRecord> {
    sorted_by(apps, |a| a.favorite, |a, b| a.app_order.cmp(&b.app_order).then(a.id.cmp(&b.id)))
}

pub fn hidden_apps(apps: &[AppRecord]) -> Vec<AppRecord> {
    sorted_by(apps, |a| a.hidden, |a, b| a.id.cmp(&b.id))
}

pub fn locked_apps(apps: &[AppRecord]) -> Vec<AppRecord> {
    sorted_by(apps, |a| a.lock, |a, b| a.lock_order.cmp(&b.lock_order).then(a.id.cmp(&b.id)))
}

pub fn project(query: Query, apps: &[AppRecord]) -> Vec<AppRecord> {
    match query {
        Query::All => all_apps(apps),
        Query::Drawer => drawer_apps(apps),
        Query::Favorites => favorite_apps(apps),
        Query::Hidden => hidden_apps(apps),
        Query::Locked => locked_apps(apps),
    }
}

/// Drawer view filtered by a case-insensitive match on label or package
pub fn search_drawer(apps: &[AppRecord], text: &str) -> Vec<AppRecord> {
    let needle = text.trim().to_lowercase();
    let drawer = drawer_apps(apps);
    if needle.is_empty() {
        return drawer;
    }
    drawer
        .into_iter()
        .filter(|a| {
            a.app_name.to_lowercase().contains(&needle) || a.package_name.to_lowercase().contains(&needle)
        })
        .collect()
}

// ----- Publish hub -----

struct Subscriber {
    query: Query,
    tx: Sender<Snapshot>,
}

pub struct ProjectionHub {
    latest: RwLock<HashMap<Query, Snapshot>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Default for ProjectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectionHub {
    pub fn new() -> Self {
        let empty: Snapshot = Arc::from(Vec::new());
        let latest = Query::ALL.into_iter().map(|q| (q, Arc::clone(&empty))).collect();
        Self {
            latest: RwLock::new(latest),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Latest committed snapshot of a view. Never waits on a writer.
    pub fn snapshot(&self, query: Query) -> Snapshot {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        latest.get(&query).cloned().unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Re-derive every view from `apps` and notify subscribers of the views
    /// that changed. Returns the changed views.
    pub fn publish(&self, apps: &[AppRecord]) -> Vec<Query> {
        // Held across the swap so a concurrent subscribe sees either the old
        // snapshot plus this notification, or the new snapshot.
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);

        let mut changed = Vec::new();
        {
            let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
            for query in Query::ALL {
                let view = project(query, apps);
                let same = latest.get(&query).is_some_and(|current| current[..] == view[..]);
                if !same {
                    latest.insert(query, Arc::from(view));
                    changed.push(query);
                }
            }
        }

        if changed.is_empty() {
            return changed;
        }

        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sub| {
            if !changed.contains(&sub.query) {
                return true;
            }
            match latest.get(&sub.query) {
                Some(snapshot) => sub.tx.send(Arc::clone(snapshot)).is_ok(),
                None => true,
            }
        });

        log::debug!("Published views: {:?}", changed);
        changed
    }

    pub fn subscribe(&self, query: Query) -> Subscription {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let (tx, rx) = mpsc::channel();
        let latest = self.snapshot(query);
        subscribers.push(Subscriber { query, tx });
        Subscription { query, rx, latest }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Receiving side of a live view. Holds the most recent snapshot it has seen.
pub struct Subscription {
    query: Query,
    rx: Receiver<Snapshot>,
    latest: Snapshot,
}

impl Subscription {
    pub fn query(&self) -> Query {
        self.query
    }

    pub fn latest(&self) -> &Snapshot {
        &self.latest
    }

    /// Drain pending snapshots without blocking. Returns true if a newer one arrived.
    pub fn refresh(&mut self) -> bool {
        let mut updated = false;
        loop {
            match self.rx.try_recv() {
                Ok(snapshot) => {
                    self.latest = snapshot;
                    updated = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return updated,
            }
        }
    }

    /// Block until a new snapshot arrives or the timeout elapses.
    pub fn wait(&mut self, timeout: Duration) -> Option<Snapshot> {
        match self.rx.recv_timeout(timeout) {
            Ok(snapshot) => {
                self.latest = snapshot;
                self.refresh();
                Some(Arc::clone(&self.latest))
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::UNORDERED;

    fn app(id: i64, name: &str) -> AppRecord {
        AppRecord {
            id,
            package_name: format!("pkg.{}", id),
            user_handle: 0,
            app_name: name.to_string(),
            favorite: false,
            hidden: false,
            lock: false,
            app_order: UNORDERED,
            global_app_order: UNORDERED,
            lock_order: UNORDERED,
        }
    }

    fn names(apps: &[AppRecord]) -> Vec<&str> {
        apps.iter().map(|a| a.app_name.as_str()).collect()
    }

    #[test]
    fn test_drawer_projection_automatic_first() {
        let mut x = app(1, "X");
        x.global_app_order = 0;
        let mut y = app(2, "Y");
        y.global_app_order = 1;
        let z = app(3, "Z");
        let apps = vec![x, y, z];
        assert_eq!(names(&drawer_apps(&apps)), vec!["Z", "X", "Y"]);
    }

    #[test]
    fn test_favorites_and_locked_ordering() {
        let mut a = app(1, "A");
        a.favorite = true;
        a.app_order = 1;
        a.lock = true;
        a.lock_order = 0;
        let mut b = app(2, "B");
        b.favorite = true;
        b.app_order = 0;
        let mut c = app(3, "C");
        c.favorite = true;
        let mut d = app(4, "D");
        d.lock = true;
        d.lock_order = 1;
        d.hidden = true;
        let apps = vec![a, b, c, d];

        assert_eq!(names(&favorite_apps(&apps)), vec!["C", "B", "A"]);
        assert_eq!(names(&locked_apps(&apps)), vec!["A", "D"]);
        assert_eq!(names(&hidden_apps(&apps)), vec!["D"]);
    }

    #[test]
    fn test_search_matches_label_and_package() {
        let apps = vec![app(1, "Calendar"), app(2, "Camera"), app(3, "Maps")];
        assert_eq!(names(&search_drawer(&apps, "CAL")), vec!["Calendar"]);
        assert_eq!(names(&search_drawer(&apps, "pkg.3")), vec!["Maps"]);
        assert_eq!(search_drawer(&apps, "  ").len(), 3);
    }

    #[test]
    fn test_publish_notifies_only_changed_views() {
        let hub = ProjectionHub::new();
        let mut drawer = hub.subscribe(Query::Drawer);
        let mut hidden = hub.subscribe(Query::Hidden);

        let apps = vec![app(1, "A")];
        let changed = hub.publish(&apps);
        assert!(changed.contains(&Query::Drawer));
        assert!(!changed.contains(&Query::Hidden));

        assert!(drawer.refresh());
        assert_eq!(names(drawer.latest()), vec!["A"]);
        assert!(!hidden.refresh());

        // Same record set again: nothing to push
        assert!(hub.publish(&apps).is_empty());
        assert!(!drawer.refresh());
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let hub = ProjectionHub::new();
        let sub = hub.subscribe(Query::All);
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        hub.publish(&[app(1, "A")]);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_query_parse() {
        assert_eq!("Favorites".parse::<Query>().unwrap(), Query::Favorites);
        assert!("grid".parse::<Query>().is_err());
    }
}
