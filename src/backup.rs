// Catalog backup and restore
// A backup is the full record set as JSON. Restoring writes the records back
// by id in one transaction and repairs ranks so density holds afterwards.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::BACKUP_FORMAT_VERSION;
use crate::db::schema::{self, AppRecord};
use crate::error::{LauncherError, Result};
use crate::ordering;
use crate::store::AppStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFile {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub apps: Vec<AppRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub restored: usize,
    pub repaired: usize,
}

pub fn export_backup(store: &AppStore) -> Result<BackupFile> {
    let apps = store.read(|conn| {
        let mut apps = schema::list_all_apps(conn)?;
        apps.sort_by_key(|a| a.id);
        Ok(apps)
    })?;
    Ok(BackupFile {
        version: BACKUP_FORMAT_VERSION,
        exported_at: Utc::now(),
        apps,
    })
}

pub fn write_backup(backup: &BackupFile, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(backup)?;
    std::fs::write(path, json)?;
    log::info!("Wrote backup of {} apps to {}", backup.apps.len(), path.display());
    Ok(())
}

pub fn read_backup(path: &Path) -> Result<BackupFile> {
    let content = std::fs::read_to_string(path)?;
    let backup: BackupFile = serde_json::from_str(&content)?;
    validate(&backup)?;
    Ok(backup)
}

fn validate(backup: &BackupFile) -> Result<()> {
    if backup.version > BACKUP_FORMAT_VERSION {
        return Err(LauncherError::InvalidInput(format!(
            "backup format {} is newer than supported {}",
            backup.version, BACKUP_FORMAT_VERSION
        )));
    }

    let mut ids = HashSet::new();
    let mut keys = HashSet::new();
    for app in &backup.apps {
        if app.id <= 0 {
            return Err(LauncherError::InvalidInput(format!("invalid id {} in backup", app.id)));
        }
        if app.package_name.is_empty() {
            return Err(LauncherError::InvalidInput(format!("app {} has no package name", app.id)));
        }
        if !ids.insert(app.id) {
            return Err(LauncherError::InvalidInput(format!("duplicate id {} in backup", app.id)));
        }
        if !keys.insert(app.key()) {
            return Err(LauncherError::InvalidInput(format!(
                "duplicate package {} for profile {} in backup",
                app.package_name, app.user_handle
            )));
        }
    }
    Ok(())
}

/// Write every backed-up record over the live table. Rows sharing an id or a
/// (package, profile) pair with a backed-up record are replaced; other rows stay.
pub fn restore_backup(store: &AppStore, backup: &BackupFile) -> Result<RestoreSummary> {
    validate(backup)?;
    let summary = store.write(|tx| {
        let restored = schema::restore_apps(tx, &backup.apps)?;
        let repaired = ordering::repair_ranks(tx)?;
        Ok(RestoreSummary { restored, repaired })
    })?;
    log::info!("Restored {} apps ({} ranks repaired)", summary.restored, summary.repaired);
    Ok(summary)
}
