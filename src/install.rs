//! Install and register operations.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::archive::{self, ArchiveIntrospector, ExtractTier, Introspection};
use crate::config::{Config, SENTINEL_FILE};
use crate::elevate::{self, ElevationRunner, PrivilegedOp};
use crate::error::{AimError, Result};
use crate::integrate::{self, DesktopIntegrator};
use crate::registry::{AppRecord, AppRegistry, ManagementType};
use crate::resolve::{self, ExecContext, InstallMode, InstallPlan};

/// What an install request should do with the plan once built.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub archive: PathBuf,
    pub mode: InstallMode,
    pub custom_prefix: Option<PathBuf>,
    /// Plan and report without touching the system. For root installs the
    /// report is the exact script that would run.
    pub dry_run: bool,
}

#[derive(Debug)]
pub enum InstallOutcome {
    Installed(AppRecord),
    /// The plan rendered for review.
    DryRun(String),
}

/// Extract an archive into its install directory, integrate it with the
/// desktop, and record it. System-mode work is batched into one elevated
/// script; nothing is recorded unless that script succeeds.
pub fn install_archive(
    config: &Config,
    registry: &mut AppRegistry,
    request: &InstallRequest,
    runner: &dyn ElevationRunner,
) -> Result<InstallOutcome> {
    if !request.archive.is_file() {
        return Err(AimError::ArchiveNotFound(request.archive.clone()));
    }

    let scratch = tempfile::Builder::new().prefix("aim-install-").tempdir()?;
    let introspector = ArchiveIntrospector::new(&config.extraction);
    let intro = introspector.read_metadata(&request.archive, scratch.path())?;
    if intro.manifest.fallback {
        warn!(
            "no usable desktop manifest in {}; integration will be partial",
            request.archive.display()
        );
    }

    let payload_root = archive::run_extraction(
        &request.archive,
        &scratch.path().join("payload"),
        ExtractTier::Full,
        &config.extraction,
    )?;

    let plan = InstallPlan::resolve(
        &intro.manifest,
        request.mode,
        request.custom_prefix.as_deref(),
        config,
    )?;
    info!(
        "installing {} ({} mode) into {}",
        plan.name,
        plan.mode,
        plan.install_dir.display()
    );

    if plan.requires_root {
        install_elevated(registry, request, runner, &plan, &intro, &payload_root)
    } else {
        install_unprivileged(registry, request, &plan, &intro, &payload_root)
    }
}

fn install_unprivileged(
    registry: &mut AppRegistry,
    request: &InstallRequest,
    plan: &InstallPlan,
    intro: &Introspection,
    payload_root: &Path,
) -> Result<InstallOutcome> {
    if request.dry_run {
        return Ok(InstallOutcome::DryRun(describe_plan(plan)));
    }

    crate::util::remove_path(&plan.install_dir)?;
    if let Some(parent) = plan.install_dir.parent() {
        fs::create_dir_all(parent)?;
    }
    crate::util::copy_tree(payload_root, &plan.install_dir)?;
    write_sentinel(&plan.install_dir)?;

    let executable = resolve::resolve_executable(
        &ExecContext {
            root: &plan.install_dir,
            exec_relative: intro.manifest.exec_relative.as_deref(),
            sanitized_name: &plan.sanitized_name,
        },
        Some(payload_root),
    )
    .ok_or_else(|| {
        AimError::InstallError(format!("no executable found in {}", plan.install_dir.display()))
    })?;

    let desktop_source = installed_desktop_source(&plan.install_dir, intro);
    let icon_source = archive::find_icon(&plan.install_dir, &intro.manifest.icon)
        .or_else(|| intro.preview_icon.clone());

    // Icon and menu-entry problems degrade inside the integrator; only a
    // failed launcher symlink aborts the install.
    let outcome = DesktopIntegrator::new(plan).integrate(
        &executable,
        desktop_source.as_deref(),
        icon_source.as_deref(),
        &plan.install_dir,
    )?;

    let record = build_record(request, plan, intro, ManagementType::Installed, |r| {
        r.executable_path = Some(executable.clone());
        r.executable_symlink = outcome.symlink.clone();
        r.desktop_file_path = outcome.desktop_file.clone();
        r.icon_path = outcome.icon_path.clone();
    });
    let id = registry.add(record)?;
    let record = registry
        .find(&id)
        .cloned()
        .ok_or_else(|| AimError::RegistryError("record vanished after add".into()))?;
    Ok(InstallOutcome::Installed(record))
}

fn install_elevated(
    registry: &mut AppRegistry,
    request: &InstallRequest,
    runner: &dyn ElevationRunner,
    plan: &InstallPlan,
    intro: &Introspection,
    payload_root: &Path,
) -> Result<InstallOutcome> {
    // The executable is resolved against the extracted copy and mapped into
    // the final tree; the tree only exists once the batch has run.
    let executable = resolve::resolve_executable(
        &ExecContext {
            root: &plan.install_dir,
            exec_relative: intro.manifest.exec_relative.as_deref(),
            sanitized_name: &plan.sanitized_name,
        },
        Some(payload_root),
    )
    .ok_or_else(|| {
        AimError::InstallError(format!("no executable found in {}", payload_root.display()))
    })?;

    let mut ops: Vec<PrivilegedOp> = Vec::new();
    if let Some(base) = plan.install_dir.parent() {
        ops.push(PrivilegedOp::MakeDir { path: base.to_path_buf() });
    }
    ops.push(PrivilegedOp::SyncTree {
        source: payload_root.to_path_buf(),
        dest: plan.install_dir.clone(),
    });
    ops.push(PrivilegedOp::WriteSentinel {
        dir: plan.install_dir.clone(),
        stamp: sentinel_stamp(),
    });

    ops.push(PrivilegedOp::MakeDir {
        path: plan.bin_symlink.parent().unwrap_or(Path::new("/")).to_path_buf(),
    });
    ops.push(PrivilegedOp::Symlink {
        target: executable.clone(),
        link: plan.bin_symlink.clone(),
    });

    let mut icon_dest = None;
    if let Some(icon) = archive::find_icon(payload_root, &intro.manifest.icon)
        .or_else(|| intro.preview_icon.clone())
    {
        let ext = icon
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_ascii_lowercase();
        let size = if ext == "svg" || ext == "svgz" { "scalable" } else { "128x128" };
        let dest = plan
            .icon_base_dir
            .join("hicolor")
            .join(size)
            .join("apps")
            .join(format!("{}.{ext}", plan.sanitized_name));
        if let Some(parent) = dest.parent() {
            ops.push(PrivilegedOp::MakeDir { path: parent.to_path_buf() });
        }
        ops.push(PrivilegedOp::CopyFile { source: icon, dest: dest.clone() });
        icon_dest = Some(dest);
    }

    let mut desktop_dest = None;
    if let Some(source) = payload_desktop_source(payload_root, intro) {
        if let Some(file_name) = source.file_name() {
            let dest = plan.desktop_dir.join(file_name);
            let exec_value = if integrate::needs_xcb_override(payload_root) {
                integrate::wrap_exec_for_wayland(&plan.bin_symlink.to_string_lossy())
            } else {
                plan.bin_symlink.to_string_lossy().into_owned()
            };
            ops.push(PrivilegedOp::MakeDir { path: plan.desktop_dir.clone() });
            ops.push(PrivilegedOp::CopyFile { source, dest: dest.clone() });
            ops.push(PrivilegedOp::TextPatch {
                path: dest.clone(),
                key: "Exec".into(),
                value: exec_value,
            });
            ops.push(PrivilegedOp::TextPatch {
                path: dest.clone(),
                key: "Icon".into(),
                value: plan.sanitized_name.clone(),
            });
            ops.push(elevate::managed_comment_patch(dest.clone()));
            desktop_dest = Some(dest);
        }
    }

    ops.push(PrivilegedOp::RefreshDesktopDatabase { dir: plan.desktop_dir.clone() });
    ops.push(PrivilegedOp::RefreshIconCache { dir: plan.icon_base_dir.join("hicolor") });

    let script = elevate::render_script(&ops);
    if request.dry_run {
        return Ok(InstallOutcome::DryRun(script));
    }

    runner.run_batch(&script)?;

    let record = build_record(request, plan, intro, ManagementType::Installed, |r| {
        r.executable_path = Some(executable.clone());
        r.executable_symlink = Some(plan.bin_symlink.clone());
        r.desktop_file_path = desktop_dest.clone();
        r.icon_path = icon_dest.clone();
        r.requires_root = true;
    });
    let id = registry.add(record)?;
    let record = registry
        .find(&id)
        .cloned()
        .ok_or_else(|| AimError::RegistryError("record vanished after add".into()))?;
    Ok(InstallOutcome::Installed(record))
}

/// Keep an archive whole in the library and wire a launcher around it.
pub fn register_archive(
    config: &Config,
    registry: &mut AppRegistry,
    archive_path: &Path,
) -> Result<AppRecord> {
    if !archive_path.is_file() {
        return Err(AimError::ArchiveNotFound(archive_path.to_path_buf()));
    }

    let scratch = tempfile::Builder::new().prefix("aim-register-").tempdir()?;
    let introspector = ArchiveIntrospector::new(&config.extraction);
    let intro = introspector.read_metadata(archive_path, scratch.path())?;
    let sanitized = resolve::sanitize_name(&intro.manifest.name);

    let library_dir = &config.general.library_dir;
    fs::create_dir_all(library_dir)?;
    let file_name = archive_path
        .file_name()
        .ok_or_else(|| AimError::InstallError("archive has no file name".into()))?;
    let library_copy = library_dir.join(file_name);
    fs::copy(archive_path, &library_copy)?;
    crate::util::ensure_executable(&library_copy)?;

    let link = config.general.user_bin_dir.join(&sanitized);
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    if link.symlink_metadata().is_ok() {
        fs::remove_file(&link)?;
    }
    std::os::unix::fs::symlink(&library_copy, &link)?;

    let desktop_file = integrate::desktop::synthesize_desktop_entry(
        &config.general.user_desktop_dir,
        &sanitized,
        &intro.manifest.name,
        &link,
        &sanitized,
    )?;

    if let Some(icon) = intro.preview_icon.as_deref() {
        integrate::icons::install_icon_with_xdg(icon, &sanitized);
    }
    integrate::refresh_desktop_database(&config.general.user_desktop_dir);

    let record = AppRecord {
        id: crate::registry::new_record_id(),
        name: intro.manifest.name.clone(),
        sanitized_name: sanitized.clone(),
        version: resolve::clean_version(intro.manifest.version.as_deref()),
        management_type: ManagementType::Registered,
        install_mode: InstallMode::User,
        install_path: library_copy.clone(),
        executable_path: Some(library_copy),
        executable_symlink: Some(link),
        desktop_file_path: Some(desktop_file),
        icon_name: Some(sanitized),
        icon_path: None,
        source_path: Some(archive_path.to_path_buf()),
        requires_root: false,
        install_date: Utc::now(),
    };
    let id = registry.add(record)?;
    registry
        .find(&id)
        .cloned()
        .ok_or_else(|| AimError::RegistryError("record vanished after add".into()))
}

fn build_record(
    request: &InstallRequest,
    plan: &InstallPlan,
    intro: &Introspection,
    management_type: ManagementType,
    fill: impl FnOnce(&mut AppRecord),
) -> AppRecord {
    let mut record = AppRecord {
        id: crate::registry::new_record_id(),
        name: plan.name.clone(),
        sanitized_name: plan.sanitized_name.clone(),
        version: plan.version.clone(),
        management_type,
        install_mode: plan.mode,
        install_path: plan.install_dir.clone(),
        executable_path: None,
        executable_symlink: None,
        desktop_file_path: None,
        icon_name: Some(intro.manifest.icon.clone()),
        icon_path: None,
        source_path: Some(request.archive.clone()),
        requires_root: plan.requires_root,
        install_date: Utc::now(),
    };
    fill(&mut record);
    record
}

fn write_sentinel(install_dir: &Path) -> Result<()> {
    fs::write(install_dir.join(SENTINEL_FILE), sentinel_stamp() + "\n")?;
    Ok(())
}

fn sentinel_stamp() -> String {
    format!("installed {}", Utc::now().to_rfc3339())
}

/// Prefer the manifest location the introspection found, mapped into the
/// installed tree; otherwise search the tree.
fn installed_desktop_source(install_dir: &Path, intro: &Introspection) -> Option<PathBuf> {
    if let Some(rel) = &intro.desktop_rel_path {
        let candidate = install_dir.join(rel);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    archive::find_desktop_file(install_dir)
}

fn payload_desktop_source(payload_root: &Path, intro: &Introspection) -> Option<PathBuf> {
    if let Some(rel) = &intro.desktop_rel_path {
        let candidate = payload_root.join(rel);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    archive::find_desktop_file(payload_root)
}

fn describe_plan(plan: &InstallPlan) -> String {
    format!(
        "would install '{}' into {}\nwould link {}\nwould place desktop entry under {}\nwould place icons under {}\n",
        plan.name,
        plan.install_dir.display(),
        plan.bin_symlink.display(),
        plan.desktop_dir.display(),
        plan.icon_base_dir.display(),
    )
}
