// Launcher configuration
// Stored as JSON at <config dir>/config.json. Every field is optional in the
// file; missing fields take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    APP_NAME, APP_ORGANIZATION, APP_QUALIFIER, CONFIG_FILENAME, DEFAULT_APPLICATION_DIRS,
    DEFAULT_RECONCILE_INTERVAL_SECS,
};
use crate::error::Result;
use crate::reconcile::{ApplicationDir, ProfileFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LauncherConfig {
    /// Database file; the platform data directory when unset
    pub db_path: Option<PathBuf>,
    /// Scanned in order; earlier directories shadow later ones
    pub application_dirs: Vec<ApplicationDir>,
    /// Idle time before the event worker reconciles; 0 disables it
    pub reconcile_interval_secs: u64,
    /// Restrict reconciliation to one profile handle
    pub profile: Option<i64>,
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
}

impl Default for LauncherConfig {
    fn default() -> Self {
        let mut application_dirs = Vec::new();
        if let Some(base) = directories::BaseDirs::new() {
            application_dirs.push(ApplicationDir::primary(base.data_dir().join("applications")));
        }
        application_dirs.extend(DEFAULT_APPLICATION_DIRS.iter().map(|p| ApplicationDir::primary(*p)));

        Self {
            db_path: None,
            application_dirs,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            profile: None,
        }
    }
}

impl LauncherConfig {
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LauncherConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` (or the default location) if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let config = Self::load(&path)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }
        Ok(crate::db::default_db_path()?)
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }

    pub fn profile_filter(&self) -> ProfileFilter {
        match self.profile {
            Some(handle) => ProfileFilter::Only(handle),
            None => ProfileFilter::All,
        }
    }
}
