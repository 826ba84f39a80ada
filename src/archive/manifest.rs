//! Parsing of the embedded application descriptor (`.desktop` manifest) and
//! the filename-derived fallback used when no manifest can be recovered.

use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::resolve::sanitize_name;

/// Metadata recovered from an archive. Immutable once produced; downstream
/// stages derive an `InstallPlan` from it instead of mutating it.
#[derive(Debug, Clone)]
pub struct ArchiveManifest {
    pub name: String,
    pub version: Option<String>,
    pub icon: String,
    /// Raw launch command from `Exec=` with field codes (` %U` etc.) stripped.
    pub exec: Option<String>,
    /// Launch command normalized relative to the archive root.
    pub exec_relative: Option<String>,
    /// True when derived from the filename because no manifest was found.
    pub fallback: bool,
}

/// Parse a desktop-entry manifest. Only the `[Desktop Entry]` section is
/// consulted; the vendor version key wins over the standard `Version`.
pub fn parse_manifest(path: &Path, extract_root: Option<&Path>) -> Result<ArchiveManifest> {
    let content = std::fs::read_to_string(path)?;

    let mut name = None;
    let mut version = None;
    let mut vendor_version = None;
    let mut icon = None;
    let mut exec = None;

    let mut in_entry = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed == "[Desktop Entry]" {
            in_entry = true;
            continue;
        }
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            in_entry = false;
            continue;
        }
        if !in_entry {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            let value = value.trim();
            match key.trim() {
                "Name" if name.is_none() => name = Some(value.to_string()),
                "Version" => version = Some(value.to_string()),
                "X-AppImage-Version" => vendor_version = Some(value.to_string()),
                "Icon" => icon = Some(value.to_string()),
                "Exec" => {
                    // Strip field codes: "app %U" -> "app"
                    let cmd = value.split(" %").next().unwrap_or(value).trim();
                    if !cmd.is_empty() {
                        exec = Some(cmd.to_string());
                    }
                }
                _ => {}
            }
        }
    }

    if name.is_none() {
        warn!("manifest has no Name key: {}", path.display());
    }

    let name = name.unwrap_or_default();
    let exec_relative = exec
        .as_deref()
        .and_then(|cmd| normalize_exec(cmd, extract_root));
    debug!(
        "parsed manifest: name={:?} version={:?} icon={:?} exec={:?} rel={:?}",
        name, vendor_version, icon, exec, exec_relative
    );

    Ok(ArchiveManifest {
        icon: icon.unwrap_or_else(|| sanitize_name(&name)),
        name,
        version: vendor_version.or(version),
        exec,
        exec_relative,
        fallback: false,
    })
}

/// Normalize a launch command to an archive-relative path. Leading `./` is
/// dropped, absolute paths under the extraction root are relativized, and a
/// bare command name passes through unchanged.
fn normalize_exec(cmd: &str, extract_root: Option<&Path>) -> Option<String> {
    if cmd.is_empty() {
        return None;
    }
    if let Some(stripped) = cmd.strip_prefix("./") {
        return Some(stripped.to_string());
    }
    if !cmd.starts_with('/') {
        return Some(cmd.to_string());
    }
    if let Some(root) = extract_root {
        let cmd_path = Path::new(cmd);
        if let Ok(rel) = cmd_path.strip_prefix(root) {
            let rel = rel.to_string_lossy();
            if !rel.is_empty() {
                return Some(rel.into_owned());
            }
        }
    }
    // Absolute path outside any known root: keep it, the executable chain may
    // still locate a same-named candidate.
    Some(cmd.to_string())
}

/// Build fallback metadata from the archive filename. This never fails:
/// archives without a manifest are common and must remain installable.
pub fn fallback_manifest(archive_path: &Path) -> ArchiveManifest {
    let mut base = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown_app".to_string());

    if base.to_lowercase().ends_with(".appimage") {
        base.truncate(base.len() - ".appimage".len());
    }

    // Strip trailing version/arch decorations: "Foo-v1.2.3-x86_64" -> "Foo".
    let re = Regex::new(r"(?i)[-_]v?[\d][\d.]*(-x86_64|-amd64)?$").unwrap();
    let name = re.replace(&base, "").into_owned();
    let name = if name.is_empty() { base } else { name };

    warn!("no manifest found, using fallback metadata for '{}'", name);
    ArchiveManifest {
        icon: sanitize_name(&name),
        name,
        version: Some("Unknown".to_string()),
        exec: None,
        exec_relative: None,
        fallback: true,
    }
}
