// Launcher Registry Constants
// Values shared by the store, the reconciler and the ordering engine.

// Ranks
/// Rank value meaning "automatic placement" on any ordering axis.
pub const UNORDERED: i64 = -1;

// Profiles
pub const PRIMARY_USER_HANDLE: i64 = 0;

// Paths
pub const APP_QUALIFIER: &str = "org";
pub const APP_ORGANIZATION: &str = "launcher";
pub const APP_NAME: &str = "launcher-registry";
pub const DB_FILENAME: &str = "launcher.db";
pub const CONFIG_FILENAME: &str = "config.json";

// Desktop entries
pub const DESKTOP_ENTRY_EXTENSION: &str = "desktop";
pub const DESKTOP_ENTRY_GROUP: &str = "[Desktop Entry]";
pub const DEFAULT_APPLICATION_DIRS: [&str; 3] = [
    "/usr/share/applications",
    "/usr/local/share/applications",
    "/var/lib/flatpak/exports/share/applications",
];

// Reconciliation
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

// Backup
pub const BACKUP_FORMAT_VERSION: u32 = 1;

// Settings keys
pub const SETTING_LAST_RECONCILED_AT: &str = "last_reconciled_at";
pub const SETTING_LAST_RECONCILE_SUMMARY: &str = "last_reconcile_summary";
