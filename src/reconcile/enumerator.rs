// Installed-app enumeration
// The reconciler only sees the host through this trait.

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One launchable entry reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledApp {
    pub package_name: String,
    #[serde(default)]
    pub user_handle: i64,
    pub label: String,
}

impl InstalledApp {
    pub fn new(package_name: &str, user_handle: i64, label: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            user_handle,
            label: label.to_string(),
        }
    }
}

/// Which profiles a reconciliation pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileFilter {
    #[default]
    All,
    Only(i64),
}

impl ProfileFilter {
    pub fn matches(self, user_handle: i64) -> bool {
        match self {
            ProfileFilter::All => true,
            ProfileFilter::Only(handle) => handle == user_handle,
        }
    }
}

#[derive(Error, Debug)]
pub enum EnumeratorError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Profile {0} is unavailable")]
    ProfileUnavailable(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub trait Enumerator: Send + Sync {
    /// Every launchable entry for the profiles selected by `filter`.
    fn list_installed_apps(&self, filter: ProfileFilter) -> Result<Vec<InstalledApp>, EnumeratorError>;
}

/// Fixed list of installed apps, replaceable at runtime. Used for JSON
/// snapshots handed to the CLI and for tests.
#[derive(Default)]
pub struct StaticEnumerator {
    apps: RwLock<Vec<InstalledApp>>,
}

impl StaticEnumerator {
    pub fn new(apps: Vec<InstalledApp>) -> Self {
        Self { apps: RwLock::new(apps) }
    }

    /// Load a JSON array of `{ packageName, userHandle, label }` objects
    pub fn from_json_file(path: &Path) -> Result<Self, EnumeratorError> {
        let content = std::fs::read_to_string(path)?;
        let apps: Vec<InstalledApp> = serde_json::from_str(&content)
            .map_err(|e| EnumeratorError::Parse(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(apps))
    }

    pub fn replace(&self, apps: Vec<InstalledApp>) {
        *self.apps.write().unwrap_or_else(PoisonError::into_inner) = apps;
    }
}

impl Enumerator for StaticEnumerator {
    fn list_installed_apps(&self, filter: ProfileFilter) -> Result<Vec<InstalledApp>, EnumeratorError> {
        let apps = self.apps.read().unwrap_or_else(PoisonError::into_inner);
        if let ProfileFilter::Only(handle) = filter {
            // A profile the snapshot knows nothing about is treated as locked or removed
            if !apps.iter().any(|a| a.user_handle == handle) {
                return Err(EnumeratorError::ProfileUnavailable(handle));
            }
        }
        Ok(apps.iter().filter(|a| filter.matches(a.user_handle)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_enumerator_filters_profiles() {
        let enumerator = StaticEnumerator::new(vec![
            InstalledApp::new("com.a", 0, "A"),
            InstalledApp::new("com.a", 10, "A (Work)"),
        ]);
        assert_eq!(enumerator.list_installed_apps(ProfileFilter::All).unwrap().len(), 2);

        let work = enumerator.list_installed_apps(ProfileFilter::Only(10)).unwrap();
        assert_eq!(work, vec![InstalledApp::new("com.a", 10, "A (Work)")]);

        assert!(matches!(
            enumerator.list_installed_apps(ProfileFilter::Only(11)),
            Err(EnumeratorError::ProfileUnavailable(11))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, r#"[{"packageName": "com.mail", "label": "Mail"}]"#).unwrap();

        let enumerator = StaticEnumerator::from_json_file(&path).unwrap();
        let apps = enumerator.list_installed_apps(ProfileFilter::All).unwrap();
        assert_eq!(apps, vec![InstalledApp::new("com.mail", 0, "Mail")]);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(StaticEnumerator::from_json_file(&path), Err(EnumeratorError::Parse(_))));
    }
}
