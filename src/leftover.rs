//! Detection of on-disk remains that the registry no longer accounts for.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{Config, MANAGED_MARKER, SENTINEL_FILE};
use crate::registry::AppRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeftoverKind {
    /// Untracked install directory carrying our ownership sentinel.
    MarkedLeftover,
    /// Untracked directory in an install root without a sentinel; possibly
    /// placed there by something else.
    UnmarkedLeftover,
    /// A desktop entry we wrote whose app is no longer registered.
    OrphanedIntegration,
    /// Per-app configuration or cache directories left behind.
    UserDataLeftover,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeftoverCandidate {
    pub path: PathBuf,
    pub display_name: String,
    pub kind: LeftoverKind,
}

/// Directories in the install roots that no registry record claims.
pub fn scan_untracked_installs(config: &Config, registry: &AppRegistry) -> Vec<LeftoverCandidate> {
    let known = registry.install_paths();
    let mut found = Vec::new();
    for root in [
        &config.general.user_install_dir,
        &config.general.system_install_dir,
    ] {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() || known.contains(&path) {
                continue;
            }
            let kind = if path.join(SENTINEL_FILE).is_file() {
                LeftoverKind::MarkedLeftover
            } else {
                LeftoverKind::UnmarkedLeftover
            };
            found.push(LeftoverCandidate {
                display_name: guess_display_name(&path),
                path,
                kind,
            });
        }
    }
    debug!("untracked install scan found {} candidate(s)", found.len());
    found
}

/// Managed desktop entries whose app the registry no longer knows. A file
/// counts as orphaned only after it fails to match EVERY record, on both the
/// recorded desktop path and the Exec target.
pub fn scan_orphaned_desktop_files(
    config: &Config,
    registry: &AppRegistry,
) -> Vec<LeftoverCandidate> {
    let mut known_desktop_paths: HashSet<PathBuf> = HashSet::new();
    let mut known_exec_targets: HashSet<PathBuf> = HashSet::new();
    for record in registry.list() {
        if let Some(p) = &record.desktop_file_path {
            known_desktop_paths.insert(p.clone());
        }
        if let Some(p) = &record.executable_symlink {
            known_exec_targets.insert(p.clone());
        }
        if let Some(p) = &record.executable_path {
            known_exec_targets.insert(p.clone());
        }
    }

    let mut found = Vec::new();
    for dir in [
        &config.general.user_desktop_dir,
        &config.general.system_desktop_dir,
    ] {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("desktop") {
                continue;
            }
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!("cannot read {}: {e}", path.display());
                    continue;
                }
            };
            if !text.contains(MANAGED_MARKER) {
                continue;
            }
            if known_desktop_paths.contains(&path) {
                continue;
            }
            if let Some(target) = exec_target(&text) {
                if known_exec_targets.contains(&target) {
                    continue;
                }
            }
            found.push(LeftoverCandidate {
                display_name: desktop_name(&text)
                    .unwrap_or_else(|| guess_display_name(&path)),
                path,
                kind: LeftoverKind::OrphanedIntegration,
            });
        }
    }
    found
}

/// Configuration, cache and state directories under `home` plausibly
/// belonging to an app by name. Name matching is case-insensitive across the
/// common spelling variants apps use for their dotdirs.
pub fn scan_user_data(home: &Path, display_name: &str) -> Vec<LeftoverCandidate> {
    let roots = [
        home.join(".config"),
        home.join(".cache"),
        home.join(".local/share"),
        home.join(".local/state"),
    ];

    let mut variants: Vec<String> = vec![
        display_name.to_lowercase(),
        display_name.replace(' ', "").to_lowercase(),
        display_name.replace(' ', "-").to_lowercase(),
        crate::resolve::sanitize_name(display_name),
    ];
    variants.sort();
    variants.dedup();

    let mut found = Vec::new();
    // Dot-hidden forms directly under the home root as well (.appname).
    if let Ok(entries) = fs::read_dir(home) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            let stripped = name.strip_prefix('.').unwrap_or(&name);
            if variants.iter().any(|v| v == stripped) && entry.path().is_dir() {
                found.push(data_candidate(entry.path(), display_name));
            }
        }
    }
    for root in roots {
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            // Some apps hide their data dir even inside the XDG roots.
            let stripped = name.strip_prefix('.').unwrap_or(&name);
            if variants.iter().any(|v| v == stripped) {
                found.push(data_candidate(entry.path(), display_name));
            }
        }
    }
    found
}

/// Delete candidates, each independently. Returns (removed, failed).
pub fn remove_candidates(candidates: &[LeftoverCandidate]) -> (usize, usize) {
    let mut removed = 0;
    let mut failed = 0;
    for candidate in candidates {
        match crate::util::remove_path(&candidate.path) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("cannot remove {}: {e}", candidate.path.display());
                failed += 1;
            }
        }
    }
    (removed, failed)
}

fn data_candidate(path: PathBuf, display_name: &str) -> LeftoverCandidate {
    LeftoverCandidate {
        path,
        display_name: display_name.to_string(),
        kind: LeftoverKind::UserDataLeftover,
    }
}

/// Prefer the Name= of a desktop entry inside the directory, else its name.
fn guess_display_name(path: &Path) -> String {
    for entry in WalkDir::new(path).max_depth(2).into_iter().flatten() {
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("desktop")
        {
            if let Ok(text) = fs::read_to_string(entry.path()) {
                if let Some(name) = desktop_name(&text) {
                    return name;
                }
            }
        }
    }
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn desktop_name(text: &str) -> Option<String> {
    text.lines()
        .find_map(|l| l.strip_prefix("Name="))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The Exec target as a path: first word, the wayland `env` wrapper peeled.
fn exec_target(text: &str) -> Option<PathBuf> {
    let exec = text.lines().find_map(|l| l.strip_prefix("Exec="))?;
    let mut words = exec.split_whitespace().peekable();
    if words.peek() == Some(&"env") {
        words.next();
        while words.peek().map(|w| w.contains('=')).unwrap_or(false) {
            words.next();
        }
    }
    words.next().map(PathBuf::from)
}
