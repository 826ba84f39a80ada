//! Persistent record of everything under management.
//!
//! The registry is a single JSON document. Writes go through a temp file in
//! the same directory followed by a rename, so a crash mid-save never leaves
//! a truncated registry behind. A registry that fails to parse is moved
//! aside with a timestamped name and replaced with a fresh one; the backup
//! survives for manual inspection.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AimError, Result};
use crate::resolve::InstallMode;

/// How an app came under management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ManagementType {
    /// Extracted into an install directory.
    #[default]
    Installed,
    /// Archive kept whole in the library, launched directly.
    Registered,
}

/// One managed application. Immutable once stored; mutations go through
/// [`AppRegistry::update`], which replaces the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: String,
    pub name: String,
    pub sanitized_name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub management_type: ManagementType,
    pub install_mode: InstallMode,
    /// Install directory for installed apps; the library copy for registered.
    pub install_path: PathBuf,
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
    #[serde(default)]
    pub executable_symlink: Option<PathBuf>,
    #[serde(default)]
    pub desktop_file_path: Option<PathBuf>,
    #[serde(default)]
    pub icon_name: Option<String>,
    #[serde(default)]
    pub icon_path: Option<PathBuf>,
    /// Original archive the app came from.
    #[serde(default)]
    pub source_path: Option<PathBuf>,
    #[serde(default)]
    pub requires_root: bool,
    pub install_date: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryData {
    #[serde(default)]
    installed_apps: Vec<AppRecord>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

pub struct AppRegistry {
    path: PathBuf,
    data: RegistryData,
}

impl AppRegistry {
    /// Load the registry at `path`, creating an empty one when absent.
    pub fn open(path: &Path) -> Result<AppRegistry> {
        let data = match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<RegistryData>(&text) {
                Ok(data) => data,
                Err(e) => {
                    let backup = backup_name(path);
                    warn!(
                        "registry at {} is corrupt ({e}); moving to {}",
                        path.display(),
                        backup.display(),
                    );
                    fs::rename(path, &backup)?;
                    RegistryData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryData::default(),
            Err(e) => return Err(e.into()),
        };
        debug!("registry loaded: {} app(s)", data.installed_apps.len());
        Ok(AppRegistry { path: path.to_path_buf(), data })
    }

    /// Add a record, deduplicating on location. A repeat install at the same
    /// install path (or a re-registration of the same archive) updates the
    /// existing record in place, keeping its id and original install date.
    pub fn add(&mut self, mut record: AppRecord) -> Result<String> {
        let existing = self.data.installed_apps.iter_mut().find(|r| {
            match record.management_type {
                ManagementType::Installed => r.install_path == record.install_path,
                ManagementType::Registered => {
                    r.management_type == ManagementType::Registered
                        && r.source_path.is_some()
                        && r.source_path == record.source_path
                }
            }
        });
        let id = match existing {
            Some(slot) => {
                record.id = slot.id.clone();
                record.install_date = slot.install_date;
                info!("updating existing record for {}", record.name);
                *slot = record;
                slot.id.clone()
            }
            None => {
                self.data.installed_apps.push(record);
                self.data.installed_apps.last().map(|r| r.id.clone()).unwrap_or_default()
            }
        };
        self.save()?;
        Ok(id)
    }

    /// Look up by id first, then by exact name, then sanitized name.
    pub fn find(&self, key: &str) -> Option<&AppRecord> {
        self.data
            .installed_apps
            .iter()
            .find(|r| r.id == key)
            .or_else(|| self.data.installed_apps.iter().find(|r| r.name == key))
            .or_else(|| {
                self.data
                    .installed_apps
                    .iter()
                    .find(|r| r.sanitized_name == key)
            })
    }

    pub fn remove(&mut self, id: &str) -> Result<AppRecord> {
        let index = self
            .data
            .installed_apps
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| AimError::AppNotFound(id.to_string()))?;
        let record = self.data.installed_apps.remove(index);
        self.save()?;
        Ok(record)
    }

    pub fn update(&mut self, record: AppRecord) -> Result<()> {
        let slot = self
            .data
            .installed_apps
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| AimError::AppNotFound(record.id.clone()))?;
        *slot = record;
        self.save()
    }

    pub fn list(&self) -> &[AppRecord] {
        &self.data.installed_apps
    }

    /// Every known install path, for leftover matching.
    pub fn install_paths(&self) -> HashSet<PathBuf> {
        self.data
            .installed_apps
            .iter()
            .map(|r| r.install_path.clone())
            .collect()
    }

    fn save(&mut self) -> Result<()> {
        self.data.last_updated = Some(Utc::now());
        let parent = self
            .path
            .parent()
            .ok_or_else(|| AimError::RegistryError("registry path has no parent".into()))?;
        fs::create_dir_all(parent)?;
        let json = serde_json::to_string_pretty(&self.data)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| AimError::RegistryError(format!("cannot persist registry: {e}")))?;
        Ok(())
    }
}

pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn backup_name(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    path.with_extension(format!("corrupt.{stamp}"))
}
