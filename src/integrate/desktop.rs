//! Desktop entry placement and rewriting.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::MANAGED_MARKER;
use crate::error::{AimError, Result};

/// Rewrite a desktop file in place for its installed location: point `Exec=`
/// at the launcher symlink, `Icon=` at the installed icon name, and stamp the
/// ownership marker into `Comment=`. Only those three keys are touched, and
/// only inside the `[Desktop Entry]` group; translations, actions and vendor
/// keys pass through untouched.
pub fn patch_desktop_file(path: &Path, exec: &str, icon: &str) -> Result<()> {
    let original = fs::read_to_string(path).map_err(|e| {
        AimError::IntegrationError(format!("cannot read {}: {e}", path.display()))
    })?;

    let mut lines: Vec<String> = Vec::new();
    let mut in_main_group = false;
    let mut seen_main_group = false;
    let mut comment_written = false;

    for line in original.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            // Leaving the main group without having seen Comment=.
            if in_main_group && !comment_written {
                lines.push(format!("Comment={MANAGED_MARKER}"));
                comment_written = true;
            }
            in_main_group = trimmed == "[Desktop Entry]";
            seen_main_group |= in_main_group;
            lines.push(line.to_string());
            continue;
        }
        if in_main_group {
            if trimmed.starts_with("Exec=") {
                lines.push(format!("Exec={exec}"));
                continue;
            }
            if trimmed.starts_with("Icon=") {
                lines.push(format!("Icon={icon}"));
                continue;
            }
            if trimmed.starts_with("Comment=") && !comment_written {
                lines.push(format!("Comment={MANAGED_MARKER}"));
                comment_written = true;
                continue;
            }
        }
        lines.push(line.to_string());
    }
    if seen_main_group && !comment_written {
        lines.push(format!("Comment={MANAGED_MARKER}"));
    }

    let mut patched = lines.join("\n");
    patched.push('\n');
    fs::write(path, patched)?;
    Ok(())
}

/// Copy a desktop file from the install tree into `desktop_dir` and patch it.
/// Returns the installed path.
pub fn create_desktop_entry(
    source: &Path,
    desktop_dir: &Path,
    exec: &str,
    icon: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(desktop_dir)?;
    let file_name = source.file_name().ok_or_else(|| {
        AimError::IntegrationError(format!("no file name in {}", source.display()))
    })?;
    let dest = desktop_dir.join(file_name);
    if dest.exists() {
        fs::remove_file(&dest)?;
    }
    fs::copy(source, &dest)?;
    patch_desktop_file(&dest, exec, icon)?;
    debug!("desktop entry installed at {}", dest.display());
    Ok(dest)
}

/// Generate a desktop entry for a registered archive that ships none we can
/// use directly. The file name carries the `appimagekit_` prefix so desktop
/// environments group it with other AppImage launchers.
pub fn synthesize_desktop_entry(
    desktop_dir: &Path,
    sanitized_name: &str,
    display_name: &str,
    exec: &Path,
    icon: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(desktop_dir)?;
    let dest = desktop_dir.join(format!("appimagekit_{sanitized_name}.desktop"));
    let content = format!(
        "[Desktop Entry]\n\
         Version=1.1\n\
         Type=Application\n\
         Name={display_name}\n\
         Comment={MANAGED_MARKER}\n\
         Exec={} %U\n\
         Icon={icon}\n\
         Terminal=false\n\
         StartupNotify=true\n\
         Categories=Utility;\n",
        exec.display(),
    );
    fs::write(&dest, content)?;
    Ok(dest)
}

pub fn remove_desktop_entry(path: &Path) -> Result<bool> {
    crate::util::remove_path(path)
}

/// Whether a desktop file carries our ownership marker.
pub fn has_managed_marker(path: &Path) -> bool {
    fs::read_to_string(path)
        .map(|text| text.contains(MANAGED_MARKER))
        .unwrap_or(false)
}
