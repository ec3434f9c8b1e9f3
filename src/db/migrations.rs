// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;
use anyhow::Result;

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema (no drawer ordering yet)
    r#"
    CREATE TABLE app (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        package_name TEXT NOT NULL,
        user_handle INTEGER NOT NULL DEFAULT 0,
        app_name TEXT NOT NULL,
        is_favorite INTEGER NOT NULL DEFAULT 0,
        is_hidden INTEGER NOT NULL DEFAULT 0,
        is_lock INTEGER NOT NULL DEFAULT 0,
        app_order INTEGER NOT NULL DEFAULT -1,
        UNIQUE(package_name, user_handle)
    );

    CREATE INDEX idx_app_favorite ON app(is_favorite, app_order);
    CREATE INDEX idx_app_hidden ON app(is_hidden);
    "#,

    // Migration 2: Manual drawer ordering. Existing rows stay alphabetical.
    r#"
    ALTER TABLE app ADD COLUMN global_app_order INTEGER NOT NULL DEFAULT -1;
    CREATE INDEX idx_app_global_order ON app(global_app_order);
    "#,

    // Migration 3: Independent lock rank + settings KV
    r#"
    ALTER TABLE app ADD COLUMN lock_order INTEGER NOT NULL DEFAULT -1;

    -- Locked rows that had a shared rank keep their relative order
    UPDATE app SET lock_order = (
        SELECT COUNT(*) FROM app AS other
        WHERE other.is_lock = 1
          AND other.app_order >= 0
          AND (other.app_order < app.app_order
               OR (other.app_order = app.app_order AND other.id < app.id))
    )
    WHERE is_lock = 1 AND app_order >= 0;

    CREATE INDEX idx_app_lock ON app(is_lock, lock_order);

    CREATE TABLE IF NOT EXISTS app_settings (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    );
    "#,
];

/// Latest schema version this build knows about
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Get current schema version from database
pub fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row(
        "PRAGMA user_version",
        [],
        |row| row.get(0)
    )?;
    Ok(version)
}

/// Run all pending migrations (crash-safe)
pub fn run_migrations(conn: &Connection) -> Result<()> {
    run_migrations_to(conn, latest_version())
}

/// Run pending migrations up to and including `target_version`.
/// Each migration and its version bump commit together.
pub fn run_migrations_to(conn: &Connection, target_version: u32) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    // Refuse to open a DB created by a newer build
    if current_version > latest_version() {
        anyhow::bail!(
            "Database schema version {} is newer than this build supports (max {}). Please upgrade the launcher.",
            current_version,
            latest_version()
        );
    }

    if target_version > latest_version() {
        anyhow::bail!("Unknown schema version {}", target_version);
    }

    if current_version >= target_version {
        return Ok(());
    }

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version || migration_version > target_version {
            continue;
        }

        let batch = format!(
            "BEGIN IMMEDIATE;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
            migration, migration_version
        );
        if let Err(e) = conn.execute_batch(&batch) {
            let _ = conn.execute_batch("ROLLBACK;");
            anyhow::bail!("Migration {} failed: {}", migration_version, e);
        }

        log::info!("Applied migration {}", migration_version);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn.prepare("PRAGMA table_info(app)").unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_fresh_db_reaches_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), latest_version());
        let columns = column_names(&conn);
        assert!(columns.contains(&"global_app_order".to_string()));
        assert!(columns.contains(&"lock_order".to_string()));
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 3);
    }

    #[test]
    fn test_v1_rows_default_to_automatic_drawer_order() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations_to(&conn, 1).unwrap();
        assert!(!column_names(&conn).contains(&"global_app_order".to_string()));

        conn.execute_batch(
            "INSERT INTO app (package_name, user_handle, app_name, is_favorite, app_order)
             VALUES ('com.mail', 0, 'Mail', 1, 0);
             INSERT INTO app (package_name, user_handle, app_name) VALUES ('com.maps', 0, 'Maps');"
        ).unwrap();

        run_migrations(&conn).unwrap();

        let orders: Vec<i64> = conn
            .prepare("SELECT global_app_order FROM app ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(orders, vec![-1, -1]);

        // Existing favorites keep their rank
        let app_order: i64 = conn
            .query_row("SELECT app_order FROM app WHERE package_name = 'com.mail'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(app_order, 0);
    }

    #[test]
    fn test_lock_order_backfilled_from_shared_rank() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations_to(&conn, 2).unwrap();

        conn.execute_batch(
            "INSERT INTO app (package_name, app_name, is_lock, app_order) VALUES ('com.bank', 'Bank', 1, 4);
             INSERT INTO app (package_name, app_name, is_lock, app_order) VALUES ('com.chat', 'Chat', 1, 1);
             INSERT INTO app (package_name, app_name, is_lock, app_order) VALUES ('com.notes', 'Notes', 1, -1);
             INSERT INTO app (package_name, app_name, is_lock, app_order) VALUES ('com.game', 'Game', 0, 2);"
        ).unwrap();

        run_migrations(&conn).unwrap();

        let ranks: Vec<(String, i64)> = conn
            .prepare("SELECT package_name, lock_order FROM app ORDER BY id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(ranks, vec![
            ("com.bank".to_string(), 1),
            ("com.chat".to_string(), 0),
            ("com.notes".to_string(), -1),
            ("com.game".to_string(), -1),
        ]);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 99").unwrap();
        assert!(run_migrations(&conn).is_err());
    }
}
