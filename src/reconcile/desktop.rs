// XDG desktop-entry enumerator
//
// Scans application directories for *.desktop files. Each directory is bound
// to a profile handle; the desktop file id (path relative to the directory,
// '/' replaced by '-', extension dropped) is the package name. When two
// directories of the same profile provide the same id, the earlier one wins.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::constants::{DESKTOP_ENTRY_EXTENSION, DESKTOP_ENTRY_GROUP, PRIMARY_USER_HANDLE};
use super::enumerator::{Enumerator, EnumeratorError, InstalledApp, ProfileFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDir {
    pub path: PathBuf,
    #[serde(default)]
    pub user_handle: i64,
}

impl ApplicationDir {
    pub fn primary(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), user_handle: PRIMARY_USER_HANDLE }
    }
}

/// Fields of a desktop entry that matter for the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub name: String,
    pub entry_type: String,
    pub no_display: bool,
    pub hidden: bool,
}

impl DesktopEntry {
    pub fn is_launchable(&self) -> bool {
        self.entry_type == "Application" && !self.no_display && !self.hidden
    }
}

/// Parse the main group of a desktop file. Returns None when the group or
/// its Name/Type keys are missing.
pub fn parse_desktop_entry(content: &str) -> Option<DesktopEntry> {
    let mut in_group = false;
    let mut name = None;
    let mut entry_type = None;
    let mut no_display = false;
    let mut hidden = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            if in_group {
                break;
            }
            in_group = line == DESKTOP_ENTRY_GROUP;
            continue;
        }
        if !in_group {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        // Localized keys (Name[de]=...) are ignored
        match key.trim() {
            "Name" => name = Some(value.to_string()),
            "Type" => entry_type = Some(value.to_string()),
            "NoDisplay" => no_display = value.eq_ignore_ascii_case("true"),
            "Hidden" => hidden = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }

    Some(DesktopEntry {
        name: name.filter(|n| !n.is_empty())?,
        entry_type: entry_type?,
        no_display,
        hidden,
    })
}

/// Desktop file id for a file found under `root`
pub fn desktop_file_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let stem = relative.with_extension("");
    let parts: Vec<&str> = stem.iter().map(|c| c.to_str()).collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("-"))
}

fn is_desktop_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(DESKTOP_ENTRY_EXTENSION))
        .unwrap_or(false)
}

pub struct DesktopEntryEnumerator {
    dirs: Vec<ApplicationDir>,
}

impl DesktopEntryEnumerator {
    pub fn new(dirs: Vec<ApplicationDir>) -> Self {
        Self { dirs }
    }

    fn scan_dir(&self, dir: &ApplicationDir, seen: &mut HashSet<(String, i64)>, apps: &mut Vec<InstalledApp>) -> Result<(), EnumeratorError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir.path).follow_links(true) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    if e.depth() == 0 && e.io_error().map(|io| io.kind()) == Some(ErrorKind::PermissionDenied) {
                        return Err(EnumeratorError::PermissionDenied(dir.path.display().to_string()));
                    }
                    log::debug!("Skipping unreadable entry under {}: {}", dir.path.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_file() && is_desktop_file(path) {
                files.push(path.to_path_buf());
            }
        }

        // Sort by path for consistent ordering
        files.sort();

        for path in files {
            let Some(id) = desktop_file_id(&dir.path, &path) else {
                continue;
            };
            if seen.contains(&(id.clone(), dir.user_handle)) {
                continue;
            }

            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    log::debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            // An entry shadows later directories even when it is not launchable
            seen.insert((id.clone(), dir.user_handle));
            match parse_desktop_entry(&content) {
                Some(entry) if entry.is_launchable() => {
                    apps.push(InstalledApp {
                        package_name: id,
                        user_handle: dir.user_handle,
                        label: entry.name,
                    });
                }
                Some(_) => {}
                None => log::debug!("Ignoring malformed desktop entry {}", path.display()),
            }
        }
        Ok(())
    }
}

impl Enumerator for DesktopEntryEnumerator {
    fn list_installed_apps(&self, filter: ProfileFilter) -> Result<Vec<InstalledApp>, EnumeratorError> {
        let selected: Vec<&ApplicationDir> = self
            .dirs
            .iter()
            .filter(|d| filter.matches(d.user_handle))
            .collect();

        // A profile with no readable directory is unavailable, not empty
        let mut handles: Vec<i64> = selected.iter().map(|d| d.user_handle).collect();
        handles.sort_unstable();
        handles.dedup();
        if handles.is_empty() {
            let handle = match filter {
                ProfileFilter::Only(handle) => handle,
                ProfileFilter::All => PRIMARY_USER_HANDLE,
            };
            return Err(EnumeratorError::ProfileUnavailable(handle));
        }
        for handle in handles {
            let available = selected
                .iter()
                .any(|d| d.user_handle == handle && d.path.is_dir());
            if !available {
                return Err(EnumeratorError::ProfileUnavailable(handle));
            }
        }

        let mut seen = HashSet::new();
        let mut apps = Vec::new();
        for dir in selected {
            if !dir.path.is_dir() {
                continue;
            }
            self.scan_dir(dir, &mut seen, &mut apps)?;
        }

        log::debug!("Found {} desktop entries", apps.len());
        Ok(apps)
    }
}
