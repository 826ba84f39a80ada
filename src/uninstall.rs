//! Record-driven removal of managed applications.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::elevate::{self, ElevationRunner, PrivilegedOp};
use crate::error::Result;
use crate::integrate::{self, icons};
use crate::registry::{AppRecord, AppRegistry};
use crate::resolve::InstallMode;

/// Path prefixes an elevated uninstall is allowed to delete under. Anything
/// outside these comes from a tampered or corrupt record and is skipped.
const ROOT_INSTALL_PREFIXES: &[&str] = &["/opt", "/usr/local", "/etc"];
const ROOT_SYMLINK_PREFIXES: &[&str] = &["/usr/local/bin", "/usr/bin", "/bin", "/opt/bin"];
const ROOT_DESKTOP_PREFIXES: &[&str] =
    &["/usr/local/share/applications", "/usr/share/applications"];

pub struct UninstallReport {
    pub record: AppRecord,
    /// Steps that failed but did not stop the removal.
    pub warnings: Vec<String>,
}

/// Remove everything a record points at, then drop the record. Individual
/// missing pieces are tolerated so a half-removed app can be cleaned up by
/// running uninstall again.
pub fn uninstall_app(
    config: &crate::config::Config,
    registry: &mut AppRegistry,
    key: &str,
    runner: &dyn ElevationRunner,
) -> Result<UninstallReport> {
    let record = registry
        .find(key)
        .cloned()
        .ok_or_else(|| crate::error::AimError::AppNotFound(key.to_string()))?;
    info!("uninstalling {} ({})", record.name, record.id);

    let report = if needs_elevation(&record) {
        uninstall_elevated(&record, runner)?
    } else {
        uninstall_unprivileged(config, &record)
    };

    registry.remove(&record.id)?;
    Ok(report)
}

/// The stored flag decides, backed by path heuristics for records written
/// before the flag existed.
fn needs_elevation(record: &AppRecord) -> bool {
    if record.requires_root || record.install_mode == InstallMode::System {
        return true;
    }
    ROOT_INSTALL_PREFIXES
        .iter()
        .any(|p| record.install_path.starts_with(p))
}

fn uninstall_unprivileged(config: &crate::config::Config, record: &AppRecord) -> UninstallReport {
    let mut warnings = Vec::new();
    let mut note = |what: &str, err: crate::error::AimError| {
        warn!("{what}: {err}");
        warnings.push(format!("{what}: {err}"));
    };

    if let Some(desktop) = &record.desktop_file_path {
        if let Err(e) = integrate::desktop::remove_desktop_entry(desktop) {
            note("desktop entry removal failed", e);
        }
    }

    let icon_name = record
        .icon_name
        .clone()
        .unwrap_or_else(|| record.sanitized_name.clone());
    icons::remove_installed_icons(&config.general.user_icon_dir, &icon_name);
    if icon_name != record.sanitized_name {
        icons::remove_installed_icons(&config.general.user_icon_dir, &record.sanitized_name);
    }
    if record.management_type == crate::registry::ManagementType::Registered {
        icons::remove_icon_with_xdg(&icon_name);
    }

    if let Some(link) = &record.executable_symlink {
        if let Err(e) = crate::util::remove_path(link) {
            note("launcher symlink removal failed", e);
        }
    }

    // Installed apps own a directory; registered apps own a single archive
    // file in the library. remove_path handles both.
    match crate::util::remove_path(&record.install_path) {
        Ok(true) => {}
        Ok(false) => info!("payload already gone: {}", record.install_path.display()),
        Err(e) => note("payload removal failed", e),
    }

    integrate::refresh_desktop_database(&config.general.user_desktop_dir);
    integrate::refresh_icon_cache(&config.general.user_icon_dir.join("hicolor"));

    UninstallReport { record: record.clone(), warnings }
}

fn uninstall_elevated(
    record: &AppRecord,
    runner: &dyn ElevationRunner,
) -> Result<UninstallReport> {
    let mut warnings = Vec::new();
    let mut ops: Vec<PrivilegedOp> = Vec::new();

    if let Some(desktop) = &record.desktop_file_path {
        if under_any(desktop, ROOT_DESKTOP_PREFIXES) {
            ops.push(PrivilegedOp::RemoveFile { path: desktop.clone() });
        } else {
            warnings.push(skipped(desktop, "desktop entry"));
        }
    }

    let icon_name = record
        .icon_name
        .clone()
        .unwrap_or_else(|| record.sanitized_name.clone());
    for size in ["16x16", "22x22", "24x24", "32x32", "48x48", "64x64", "128x128", "256x256", "512x512", "scalable"] {
        for ext in ["png", "svg", "svgz"] {
            ops.push(PrivilegedOp::RemoveFile {
                path: PathBuf::from(format!(
                    "/usr/local/share/icons/hicolor/{size}/apps/{icon_name}.{ext}"
                )),
            });
        }
    }

    if let Some(link) = &record.executable_symlink {
        if under_any(link, ROOT_SYMLINK_PREFIXES) {
            ops.push(PrivilegedOp::RemoveFile { path: link.clone() });
        } else {
            warnings.push(skipped(link, "symlink"));
        }
    }

    if under_any(&record.install_path, ROOT_INSTALL_PREFIXES) {
        ops.push(PrivilegedOp::RemovePath { path: record.install_path.clone() });
    } else {
        warnings.push(skipped(&record.install_path, "install directory"));
    }

    ops.push(PrivilegedOp::RefreshDesktopDatabase {
        dir: "/usr/local/share/applications".into(),
    });
    ops.push(PrivilegedOp::RefreshIconCache {
        dir: "/usr/local/share/icons/hicolor".into(),
    });

    runner.run_batch(&elevate::render_script(&ops))?;
    for w in &warnings {
        warn!("{w}");
    }
    Ok(UninstallReport { record: record.clone(), warnings })
}

fn under_any(path: &Path, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| path.starts_with(p))
}

fn skipped(path: &Path, what: &str) -> String {
    format!(
        "refusing to remove {what} outside managed locations: {}",
        path.display()
    )
}
