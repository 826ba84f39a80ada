//! Icon placement into hicolor theme directories, and removal.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;

/// Theme size directories probed on removal. Matches what installs and the
/// embedded-theme sweep can produce.
const REMOVAL_SIZES: &[&str] = &[
    "16x16", "22x22", "24x24", "32x32", "48x48", "64x64", "128x128", "256x256", "512x512",
    "scalable",
];

const REMOVAL_EXTENSIONS: &[&str] = &["png", "svg", "svgz"];

/// Install the app's primary icon under `icon_base` (an `icons/` root).
/// Vector formats land in `hicolor/scalable/apps`, rasters in
/// `hicolor/128x128/apps`, renamed to `<icon_name>.<ext>`.
pub fn install_primary_icon(source: &Path, icon_base: &Path, icon_name: &str) -> Result<PathBuf> {
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_ascii_lowercase();
    let size_dir = if ext == "svg" || ext == "svgz" {
        "scalable"
    } else {
        "128x128"
    };
    let dest_dir = icon_base.join("hicolor").join(size_dir).join("apps");
    fs::create_dir_all(&dest_dir)?;
    let dest = dest_dir.join(format!("{icon_name}.{ext}"));
    fs::copy(source, &dest)?;
    debug!("icon installed at {}", dest.display());
    Ok(dest)
}

/// Copy every `hicolor` asset the extracted tree ships for `icon_name` into
/// the target theme, preserving size buckets. Archives that bundle a full
/// icon set this way render crisply at every size the desktop asks for.
pub fn sweep_embedded_hicolor(extract_root: &Path, icon_base: &Path, icon_name: &str) -> usize {
    let mut copied = 0;
    for theme_rel in ["share/icons/hicolor", "usr/share/icons/hicolor"] {
        let theme_root = extract_root.join(theme_rel);
        if !theme_root.is_dir() {
            continue;
        }
        let size_dirs = match fs::read_dir(&theme_root) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for size_entry in size_dirs.flatten() {
            let size_name = size_entry.file_name();
            let size_name = size_name.to_string_lossy();
            if !size_name.contains('x') && size_name != "scalable" {
                continue;
            }
            let apps_dir = size_entry.path().join("apps");
            if !apps_dir.is_dir() {
                continue;
            }
            let prefix = format!("{icon_name}.");
            for file in WalkDir::new(&apps_dir).max_depth(1).into_iter().flatten() {
                if !file.file_type().is_file() {
                    continue;
                }
                let name = file.file_name().to_string_lossy();
                if !name.starts_with(&prefix) {
                    continue;
                }
                let dest_dir = icon_base
                    .join("hicolor")
                    .join(size_name.as_ref())
                    .join("apps");
                if let Err(e) = fs::create_dir_all(&dest_dir)
                    .and_then(|_| fs::copy(file.path(), dest_dir.join(file.file_name())).map(|_| ()))
                {
                    warn!("skipping icon {}: {e}", file.path().display());
                    continue;
                }
                copied += 1;
            }
        }
    }
    copied
}

/// Remove every icon installed (or swept) for `icon_name` under `icon_base`.
/// Returns the paths removed.
pub fn remove_installed_icons(icon_base: &Path, icon_name: &str) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for size in REMOVAL_SIZES {
        for ext in REMOVAL_EXTENSIONS {
            let candidate = icon_base
                .join("hicolor")
                .join(size)
                .join("apps")
                .join(format!("{icon_name}.{ext}"));
            match crate::util::remove_path(&candidate) {
                Ok(true) => removed.push(candidate),
                Ok(false) => {}
                Err(e) => warn!("cannot remove {}: {e}", candidate.display()),
            }
        }
    }
    removed
}

/// Register an icon through `xdg-icon-resource` for launchers we synthesize.
/// Best-effort: a missing tool is logged, never an error.
pub fn install_icon_with_xdg(source: &Path, icon_name: &str) {
    let status = std::process::Command::new("xdg-icon-resource")
        .args(["install", "--novendor", "--size", "128"])
        .arg(source)
        .arg(icon_name)
        .status();
    report_xdg("install", icon_name, status);
}

/// Undo of [`install_icon_with_xdg`], equally best-effort.
pub fn remove_icon_with_xdg(icon_name: &str) {
    let status = std::process::Command::new("xdg-icon-resource")
        .args(["uninstall", "--novendor", "--size", "128", icon_name])
        .status();
    report_xdg("uninstall", icon_name, status);
}

fn report_xdg(verb: &str, icon_name: &str, status: std::io::Result<std::process::ExitStatus>) {
    match status {
        Ok(code) if code.success() => debug!("xdg-icon-resource {verb} ok for {icon_name}"),
        Ok(code) => warn!("xdg-icon-resource {verb} exited with {code}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("xdg-icon-resource not available");
        }
        Err(e) => warn!("xdg-icon-resource {verb} failed: {e}"),
    }
}
