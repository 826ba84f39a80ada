//! Desktop integration: launcher symlinks, menu entries, icons, caches.

pub mod desktop;
pub mod icons;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{AimError, Result};
use crate::resolve::InstallPlan;

/// What integration produced, recorded alongside the install.
#[derive(Debug, Default)]
pub struct IntegrationOutcome {
    pub symlink: Option<PathBuf>,
    pub desktop_file: Option<PathBuf>,
    pub icon_path: Option<PathBuf>,
}

/// Performs the user-writable integration steps for an install plan.
pub struct DesktopIntegrator<'a> {
    plan: &'a InstallPlan,
}

impl<'a> DesktopIntegrator<'a> {
    pub fn new(plan: &'a InstallPlan) -> Self {
        DesktopIntegrator { plan }
    }

    /// Link, icons, menu entry, caches. The symlink is the one mandatory
    /// step: without it the desktop entry would point at nothing, so a
    /// symlink failure aborts. Icon, menu-entry and cache problems degrade
    /// to warnings; the outcome reports what actually landed.
    pub fn integrate(
        &self,
        executable: &Path,
        desktop_source: Option<&Path>,
        icon_source: Option<&Path>,
        extract_root: &Path,
    ) -> Result<IntegrationOutcome> {
        let mut outcome = IntegrationOutcome::default();
        let icon_name = &self.plan.sanitized_name;

        outcome.symlink = Some(self.create_symlink(executable)?);

        if let Some(icon) = icon_source {
            match icons::install_primary_icon(icon, &self.plan.icon_base_dir, icon_name) {
                Ok(path) => outcome.icon_path = Some(path),
                Err(e) => warn!("icon install failed: {e}"),
            }
        }
        let swept = icons::sweep_embedded_hicolor(extract_root, &self.plan.icon_base_dir, icon_name);
        if swept > 0 {
            debug!("copied {swept} themed icon(s)");
        }

        if let Some(source) = desktop_source {
            let exec = outcome
                .symlink
                .as_deref()
                .unwrap_or(executable)
                .to_string_lossy()
                .into_owned();
            let exec_cmd = self.desktop_exec_command(extract_root, &exec);
            match desktop::create_desktop_entry(source, &self.plan.desktop_dir, &exec_cmd, icon_name)
            {
                Ok(path) => outcome.desktop_file = Some(path),
                Err(e) => warn!("desktop entry failed: {e}"),
            }
        }

        refresh_desktop_database(&self.plan.desktop_dir);
        refresh_icon_cache(&self.plan.icon_base_dir.join("hicolor"));
        info!("desktop integration complete for {}", self.plan.name);
        Ok(outcome)
    }

    fn create_symlink(&self, executable: &Path) -> Result<PathBuf> {
        let link = &self.plan.bin_symlink;
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)?;
        }
        if link.symlink_metadata().is_ok() {
            fs::remove_file(link)?;
        }
        std::os::unix::fs::symlink(executable, link).map_err(|e| {
            AimError::IntegrationError(format!(
                "cannot link {} -> {}: {e}",
                link.display(),
                executable.display(),
            ))
        })?;
        Ok(link.clone())
    }

    fn desktop_exec_command(&self, extract_root: &Path, exec: &str) -> String {
        if needs_xcb_override(extract_root) {
            wrap_exec_for_wayland(exec)
        } else {
            exec.to_string()
        }
    }
}

/// Qt5 builds without a Wayland platform plugin crash on Wayland sessions;
/// forcing the xcb backend routes them through XWayland instead.
pub fn needs_xcb_override(extract_root: &Path) -> bool {
    let mut has_qt5 = false;
    let mut has_wayland_plugin = false;
    for entry in walkdir::WalkDir::new(extract_root)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let name = entry.file_name().to_string_lossy();
        if name.starts_with("libQt5") && name.contains(".so") {
            has_qt5 = true;
            if name.starts_with("libQt5WaylandClient") {
                has_wayland_plugin = true;
            }
        }
        if name == "libqwayland-generic.so" || name == "libqwayland-egl.so" {
            has_wayland_plugin = true;
        }
    }
    has_qt5 && !has_wayland_plugin
}

const XCB_PREFIX: &str = "env QT_QPA_PLATFORM=xcb ";

pub fn wrap_exec_for_wayland(exec: &str) -> String {
    if exec.starts_with(XCB_PREFIX) {
        exec.to_string()
    } else {
        format!("{XCB_PREFIX}{exec}")
    }
}

/// Refresh the desktop database for user-writable dirs. Missing tools are
/// normal on minimal systems and only logged.
pub fn refresh_desktop_database(desktop_dir: &Path) {
    run_cache_tool("update-desktop-database", &[desktop_dir.as_os_str()]);
}

pub fn refresh_icon_cache(theme_dir: &Path) {
    if !theme_dir.is_dir() {
        return;
    }
    run_cache_tool(
        "gtk-update-icon-cache",
        &["-f".as_ref(), "-t".as_ref(), theme_dir.as_os_str()],
    );
}

fn run_cache_tool(tool: &str, args: &[&std::ffi::OsStr]) {
    match std::process::Command::new(tool).args(args).status() {
        Ok(status) if status.success() => debug!("{tool} refreshed"),
        Ok(status) => warn!("{tool} exited with {status}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => debug!("{tool} not available"),
        Err(e) => warn!("{tool} failed: {e}"),
    }
}
