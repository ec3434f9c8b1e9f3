// App store
//
// Owns the single writable connection and the projection hub. Every write
// runs in one IMMEDIATE transaction; after it commits, the views are
// re-derived from the committed rows and pushed to subscribers before the
// connection lock is released, so publications arrive in commit order.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::db::{self, schema};
use crate::db::schema::{AppRecord, NewApp, ProfileKind};
use crate::error::{LauncherError, Result};
use crate::ordering::{self, Axis, RankChange, ReorderOutcome};
use crate::projection::{ProjectionHub, Query, Snapshot, Subscription};

pub struct AppStore {
    conn: Mutex<Connection>,
    hub: ProjectionHub,
}

impl AppStore {
    /// Open (or create) the database file, repair ranks left behind by an
    /// older build and publish the initial views.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open_db(path)?;
        log::info!("Opened app store at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(db::open_in_memory_db()?)
    }

    /// Wrap an already migrated connection
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            hub: ProjectionHub::new(),
        };
        let repaired = store.write(|tx| ordering::repair_ranks(tx))?;
        if repaired > 0 {
            log::warn!("Repaired {} inconsistent ranks on open", repaired);
        }
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LauncherError::StoreUnavailable("connection lock poisoned".to_string()))
    }

    /// Run a read against the committed state.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` in a single IMMEDIATE transaction. On error nothing is
    /// committed and nothing is published. Once committed the write returns
    /// `Ok` even if re-deriving the views fails.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;

        // The commit stands; a failed refresh leaves the previous views in place
        match schema::list_all_apps(&conn) {
            Ok(apps) => {
                self.hub.publish(&apps);
            }
            Err(e) => log::error!("Write committed but views were not refreshed: {}", e),
        }
        Ok(value)
    }

    // ----- Views -----

    /// Latest published snapshot of a view. Does not touch the connection.
    pub fn snapshot(&self, query: Query) -> Snapshot {
        self.hub.snapshot(query)
    }

    pub fn subscribe(&self, query: Query) -> Subscription {
        self.hub.subscribe(query)
    }

    /// Run a view's SQL query against the committed rows
    pub fn query(&self, query: Query) -> Result<Vec<AppRecord>> {
        self.read(|conn| match query {
            Query::All => schema::list_all_apps(conn),
            Query::Drawer => schema::list_drawer_apps(conn),
            Query::Favorites => schema::list_favorite_apps(conn),
            Query::Hidden => schema::list_hidden_apps(conn),
            Query::Locked => schema::list_locked_apps(conn),
        })
    }

    // ----- Records -----

    pub fn get(&self, id: i64) -> Result<Option<AppRecord>> {
        self.read(|conn| schema::get_app(conn, id))
    }

    pub fn get_by_package(&self, package_name: &str, profile: ProfileKind) -> Result<Option<AppRecord>> {
        self.read(|conn| schema::get_app_by_package(conn, package_name, profile))
    }

    pub fn count(&self) -> Result<i64> {
        self.read(schema::count_apps)
    }

    /// Insert one record with defaults unless its (package, profile) exists
    pub fn insert_if_absent(&self, app: &NewApp) -> Result<Option<i64>> {
        self.write(|tx| schema::insert_app(tx, app))
    }

    pub fn insert_all(&self, apps: &[NewApp]) -> Result<usize> {
        self.write(|tx| schema::insert_apps(tx, apps))
    }

    /// Hard delete; ranks above the removed one shift down.
    pub fn delete(&self, id: i64) -> Result<bool> {
        self.write(|tx| {
            let deleted = schema::delete_app(tx, id)?;
            if deleted {
                ordering::repair_ranks(tx)?;
            }
            Ok(deleted)
        })
    }

    /// Remove every record and restart id assignment.
    pub fn wipe_and_reset(&self) -> Result<usize> {
        let removed = self.write(|tx| {
            let removed = schema::delete_all_apps(tx)?;
            schema::reset_auto_increment(tx)?;
            Ok(removed)
        })?;
        log::info!("Wiped {} apps and reset id sequence", removed);
        Ok(removed)
    }

    /// Replace all mutable fields of a record. Ranks are repaired afterwards,
    /// so a stale rank carried in `app` cannot break density.
    pub fn update_record(&self, app: &AppRecord) -> Result<bool> {
        self.write(|tx| {
            let updated = schema::update_app(tx, app)?;
            if updated {
                ordering::repair_ranks(tx)?;
            }
            Ok(updated)
        })
    }

    /// Apply a batch of ranks on one axis, all or nothing.
    pub fn update_ranks(&self, axis: Axis, changes: &[RankChange]) -> Result<ReorderOutcome> {
        self.write(|tx| {
            let apps = schema::list_all_apps(tx)?;
            ordering::commit_rank_changes(tx, axis, &apps, changes)
        })
    }

    // ----- Settings -----

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.read(|conn| schema::get_setting(conn, key))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.write(|tx| schema::set_setting(tx, key, value))
    }
}
