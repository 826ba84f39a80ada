//! Icon discovery inside an extracted tree.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

pub const ICON_EXTENSIONS: [&str; 5] = ["png", "svg", "svgz", "xpm", "ico"];

/// Conventional icon directories inside an archive, highest priority first.
const ICON_SEARCH_DIRS: [&str; 9] = [
    "",
    "share/icons/hicolor/scalable/apps",
    "usr/share/icons/hicolor/scalable/apps",
    "share/icons/hicolor/128x128/apps",
    "usr/share/icons/hicolor/128x128/apps",
    "share/icons/hicolor/64x64/apps",
    "usr/share/icons/hicolor/64x64/apps",
    "share/pixmaps",
    "usr/share/pixmaps",
];

fn has_icon_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ICON_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Locate the best icon source for `icon_name` under `root`.
///
/// Priority: the archive-root `.DirIcon` link resolved to its target, then
/// the fixed directory list, then a best-effort recursive scan. First match
/// wins; there is no scoring beyond directory order.
pub fn find_icon(root: &Path, icon_name: &str) -> Option<PathBuf> {
    let dir_icon = root.join(".DirIcon");
    if dir_icon.symlink_metadata().is_ok() {
        let resolved = std::fs::canonicalize(&dir_icon).unwrap_or(dir_icon);
        if resolved.is_file() {
            debug!("icon: using .DirIcon -> {}", resolved.display());
            return Some(resolved);
        }
    }

    if icon_name.is_empty() {
        return None;
    }

    // An icon identifier carrying a slash is a path relative to the root.
    if icon_name.contains('/') {
        let direct = root.join(icon_name);
        if direct.is_file() {
            return Some(direct);
        }
    }

    for dir in ICON_SEARCH_DIRS {
        let base = root.join(dir);
        let bare = base.join(icon_name);
        if bare.is_file() {
            return Some(bare);
        }
        for ext in ICON_EXTENSIONS {
            let candidate = base.join(format!("{}.{}", icon_name, ext));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    // Last resort: recursive scan for any matching stem.
    for entry in WalkDir::new(root).follow_links(false).into_iter().flatten() {
        if !entry.file_type().is_file() || !has_icon_extension(entry.path()) {
            continue;
        }
        if entry
            .path()
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s == icon_name)
            .unwrap_or(false)
        {
            debug!("icon: recursive match {}", entry.path().display());
            return Some(entry.path().to_path_buf());
        }
    }
    None
}
