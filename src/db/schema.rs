// Database schema types and query helpers

use rusqlite::{Connection, params, OptionalExtension};
use serde::{Deserialize, Serialize};
use crate::constants::{PRIMARY_USER_HANDLE, UNORDERED};
use crate::error::Result;
use crate::ordering::{Axis, RankChange};

// ----- App -----

/// One catalog entry per (package, profile) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRecord {
    pub id: i64,
    pub package_name: String,
    pub user_handle: i64,
    pub app_name: String,
    pub favorite: bool,
    pub hidden: bool,
    pub lock: bool,
    pub app_order: i64,
    pub global_app_order: i64,
    #[serde(default = "unordered")]
    pub lock_order: i64,
}

fn unordered() -> i64 { UNORDERED }

impl AppRecord {
    /// Identity the reconciler diffs on
    pub fn key(&self) -> (&str, i64) {
        (self.package_name.as_str(), self.user_handle)
    }

    pub fn is_work_profile(&self) -> bool {
        self.user_handle != PRIMARY_USER_HANDLE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApp {
    pub package_name: String,
    pub user_handle: i64,
    pub app_name: String,
}

/// Which profile a package lookup targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Primary,
    Work,
}

const APP_COLUMNS: &str = "id, package_name, user_handle, app_name, is_favorite, is_hidden, is_lock,
                           app_order, global_app_order, lock_order";

fn map_app(row: &rusqlite::Row) -> rusqlite::Result<AppRecord> {
    Ok(AppRecord {
        id: row.get(0)?,
        package_name: row.get(1)?,
        user_handle: row.get(2)?,
        app_name: row.get(3)?,
        favorite: row.get::<_, i32>(4)? != 0,
        hidden: row.get::<_, i32>(5)? != 0,
        lock: row.get::<_, i32>(6)? != 0,
        app_order: row.get(7)?,
        global_app_order: row.get(8)?,
        lock_order: row.get(9)?,
    })
}

fn query_apps(conn: &Connection, sql: &str) -> Result<Vec<AppRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let apps = stmt.query_map([], map_app)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(apps)
}

/// Insert an app unless (package_name, user_handle) already exists.
/// Returns the new id, or None when the insert was ignored.
pub fn insert_app(conn: &Connection, app: &NewApp) -> Result<Option<i64>> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO app (package_name, user_handle, app_name) VALUES (?1, ?2, ?3)",
        params![app.package_name, app.user_handle, app.app_name],
    )?;
    if inserted == 0 {
        return Ok(None);
    }
    Ok(Some(conn.last_insert_rowid()))
}

/// Insert many apps, ignoring duplicates. Returns the number actually inserted.
pub fn insert_apps(conn: &Connection, apps: &[NewApp]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO app (package_name, user_handle, app_name) VALUES (?1, ?2, ?3)"
    )?;
    let mut inserted = 0;
    for app in apps {
        inserted += stmt.execute(params![app.package_name, app.user_handle, app.app_name])?;
    }
    Ok(inserted)
}

/// Write full records back by id, replacing any conflicting row (backup restore).
pub fn restore_apps(conn: &Connection, apps: &[AppRecord]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR REPLACE INTO app (id, package_name, user_handle, app_name, is_favorite, is_hidden,
                                     is_lock, app_order, global_app_order, lock_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
    )?;
    for app in apps {
        stmt.execute(params![
            app.id,
            app.package_name,
            app.user_handle,
            app.app_name,
            app.favorite as i32,
            app.hidden as i32,
            app.lock as i32,
            app.app_order,
            app.global_app_order,
            app.lock_order,
        ])?;
    }
    Ok(apps.len())
}

/// Hard delete. Returns false when the id did not exist.
pub fn delete_app(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM app WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn delete_all_apps(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM app", [])?)
}

/// Restart id assignment at 1. Only valid once the table is empty.
pub fn reset_auto_increment(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM sqlite_sequence WHERE name = 'app'", [])?;
    Ok(())
}

pub fn get_app(conn: &Connection, id: i64) -> Result<Option<AppRecord>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM app WHERE id = ?1", APP_COLUMNS),
        params![id],
        map_app,
    ).optional()?;
    Ok(result)
}

pub fn get_app_by_package(conn: &Connection, package_name: &str, profile: ProfileKind) -> Result<Option<AppRecord>> {
    let filter = match profile {
        ProfileKind::Primary => "user_handle = ?2",
        ProfileKind::Work => "user_handle != ?2",
    };
    let result = conn.query_row(
        &format!(
            "SELECT {} FROM app WHERE package_name = ?1 AND {} ORDER BY user_handle LIMIT 1",
            APP_COLUMNS, filter
        ),
        params![package_name, PRIMARY_USER_HANDLE],
        map_app,
    ).optional()?;
    Ok(result)
}

/// Update every mutable column of a record. Returns false when the id is gone.
pub fn update_app(conn: &Connection, app: &AppRecord) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE app SET app_name = ?1, is_favorite = ?2, is_hidden = ?3, is_lock = ?4,
                        app_order = ?5, global_app_order = ?6, lock_order = ?7
         WHERE id = ?8",
        params![
            app.app_name,
            app.favorite as i32,
            app.hidden as i32,
            app.lock as i32,
            app.app_order,
            app.global_app_order,
            app.lock_order,
            app.id,
        ],
    )?;
    Ok(updated > 0)
}

/// Write a batch of ranks on one axis. Callers run this inside a transaction.
pub fn update_ranks(conn: &Connection, axis: Axis, changes: &[RankChange]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        &format!("UPDATE app SET {} = ?1 WHERE id = ?2", axis.column())
    )?;
    let mut updated = 0;
    for change in changes {
        updated += stmt.execute(params![change.rank, change.id])?;
    }
    Ok(updated)
}

pub fn count_apps(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM app", [], |row| row.get(0))?;
    Ok(count)
}

// ----- Live queries -----
// Orderings here are mirrored by the pure functions in crate::projection.

pub fn list_all_apps(conn: &Connection) -> Result<Vec<AppRecord>> {
    query_apps(conn, &format!(
        "SELECT {} FROM app ORDER BY app_name COLLATE NOCASE ASC, id ASC",
        APP_COLUMNS
    ))
}

/// Drawer order: automatic (-1) rows first alphabetically, then manual rows by rank.
pub fn list_drawer_apps(conn: &Connection) -> Result<Vec<AppRecord>> {
    query_apps(conn, &format!(
        "SELECT {} FROM app WHERE is_hidden = 0
         ORDER BY global_app_order ASC, app_name COLLATE NOCASE ASC, id ASC",
        APP_COLUMNS
    ))
}

pub fn list_favorite_apps(conn: &Connection) -> Result<Vec<AppRecord>> {
    query_apps(conn, &format!(
        "SELECT {} FROM app WHERE is_favorite = 1 ORDER BY app_order ASC, id ASC",
        APP_COLUMNS
    ))
}

pub fn list_hidden_apps(conn: &Connection) -> Result<Vec<AppRecord>> {
    query_apps(conn, &format!(
        "SELECT {} FROM app WHERE is_hidden = 1 ORDER BY id ASC",
        APP_COLUMNS
    ))
}

pub fn list_locked_apps(conn: &Connection) -> Result<Vec<AppRecord>> {
    query_apps(conn, &format!(
        "SELECT {} FROM app WHERE is_lock = 1 ORDER BY lock_order ASC, id ASC",
        APP_COLUMNS
    ))
}

// ----- Settings -----

/// Get a setting value by key. Returns None if not set.
pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn.query_row(
        "SELECT value FROM app_settings WHERE key = ?1",
        [key],
        |row| row.get(0),
    ).optional()?;
    Ok(value)
}

/// Set a setting value (upsert).
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO app_settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_setting(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM app_settings WHERE key = ?1", [key])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_db;

    fn new_app(package: &str, handle: i64, name: &str) -> NewApp {
        NewApp {
            package_name: package.to_string(),
            user_handle: handle,
            app_name: name.to_string(),
        }
    }

    fn names(apps: &[AppRecord]) -> Vec<&str> {
        apps.iter().map(|a| a.app_name.as_str()).collect()
    }

    #[test]
    fn test_insert_defaults_and_duplicate_ignored() {
        let conn = open_in_memory_db().unwrap();

        let id = insert_app(&conn, &new_app("com.mail", 0, "Mail")).unwrap();
        assert!(id.is_some());
        let dup = insert_app(&conn, &new_app("com.mail", 0, "Other label")).unwrap();
        assert_eq!(dup, None);

        let app = get_app(&conn, id.unwrap()).unwrap().unwrap();
        assert_eq!(app.app_name, "Mail");
        assert!(!app.favorite && !app.hidden && !app.lock);
        assert_eq!((app.app_order, app.global_app_order, app.lock_order), (-1, -1, -1));
        assert_eq!(count_apps(&conn).unwrap(), 1);
    }

    #[test]
    fn test_same_package_in_two_profiles() {
        let conn = open_in_memory_db().unwrap();
        let inserted = insert_apps(&conn, &[
            new_app("com.mail", 0, "Mail"),
            new_app("com.mail", 10, "Mail (Work)"),
            new_app("com.mail", 0, "Mail again"),
        ]).unwrap();
        assert_eq!(inserted, 2);

        let primary = get_app_by_package(&conn, "com.mail", ProfileKind::Primary).unwrap().unwrap();
        let work = get_app_by_package(&conn, "com.mail", ProfileKind::Work).unwrap().unwrap();
        assert_eq!(primary.user_handle, 0);
        assert_eq!(work.user_handle, 10);
        assert!(work.is_work_profile());
        assert!(get_app_by_package(&conn, "com.none", ProfileKind::Primary).unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let conn = open_in_memory_db().unwrap();
        assert!(!delete_app(&conn, 42).unwrap());
    }

    #[test]
    fn test_wipe_resets_ids() {
        let conn = open_in_memory_db().unwrap();
        insert_apps(&conn, &[new_app("a", 0, "A"), new_app("b", 0, "B")]).unwrap();
        assert_eq!(delete_all_apps(&conn).unwrap(), 2);
        reset_auto_increment(&conn).unwrap();

        let id = insert_app(&conn, &new_app("c", 0, "C")).unwrap();
        assert_eq!(id, Some(1));
    }

    #[test]
    fn test_drawer_query_puts_automatic_rows_first() {
        let conn = open_in_memory_db().unwrap();
        insert_apps(&conn, &[
            new_app("x", 0, "Xylophone"),
            new_app("y", 0, "yak"),
            new_app("z", 0, "Zebra"),
            new_app("h", 0, "Hidden"),
            new_app("a", 0, "alpha"),
        ]).unwrap();
        conn.execute_batch(
            "UPDATE app SET global_app_order = 0 WHERE package_name = 'y';
             UPDATE app SET global_app_order = 1 WHERE package_name = 'x';
             UPDATE app SET is_hidden = 1 WHERE package_name = 'h';"
        ).unwrap();

        let drawer = list_drawer_apps(&conn).unwrap();
        assert_eq!(names(&drawer), vec!["alpha", "Zebra", "yak", "Xylophone"]);

        let hidden = list_hidden_apps(&conn).unwrap();
        assert_eq!(names(&hidden), vec!["Hidden"]);

        let all = list_all_apps(&conn).unwrap();
        assert_eq!(names(&all), vec!["alpha", "Hidden", "Xylophone", "yak", "Zebra"]);
    }

    #[test]
    fn test_update_ranks_batch_touches_one_axis() {
        let conn = open_in_memory_db().unwrap();
        insert_apps(&conn, &[new_app("a", 0, "A"), new_app("b", 0, "B")]).unwrap();

        let updated = update_ranks(&conn, Axis::Favorites, &[
            RankChange { id: 1, rank: 1 },
            RankChange { id: 2, rank: 0 },
        ]).unwrap();
        assert_eq!(updated, 2);
        let a = get_app(&conn, 1).unwrap().unwrap();
        let b = get_app(&conn, 2).unwrap().unwrap();
        assert_eq!((a.app_order, b.app_order), (1, 0));
        assert_eq!((a.global_app_order, b.global_app_order), (-1, -1));
        assert_eq!((a.lock_order, b.lock_order), (-1, -1));
    }

    #[test]
    fn test_update_app_round_trips_fields() {
        let conn = open_in_memory_db().unwrap();
        let id = insert_app(&conn, &new_app("a", 0, "A")).unwrap().unwrap();
        let mut app = get_app(&conn, id).unwrap().unwrap();
        app.app_name = "Renamed".to_string();
        app.lock = true;
        app.lock_order = 0;
        assert!(update_app(&conn, &app).unwrap());
        assert_eq!(get_app(&conn, id).unwrap().unwrap(), app);

        app.id = 999;
        assert!(!update_app(&conn, &app).unwrap());
    }

    #[test]
    fn test_settings_kv() {
        let conn = open_in_memory_db().unwrap();
        assert_eq!(get_setting(&conn, "k").unwrap(), None);
        set_setting(&conn, "k", "v1").unwrap();
        set_setting(&conn, "k", "v2").unwrap();
        assert_eq!(get_setting(&conn, "k").unwrap(), Some("v2".to_string()));
        delete_setting(&conn, "k").unwrap();
        assert_eq!(get_setting(&conn, "k").unwrap(), None);
    }
}
