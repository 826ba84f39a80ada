//! Pure path resolution: from (manifest, install mode, custom prefix) to the
//! concrete filesystem targets of an installation. No I/O beyond the
//! directory-existence checks the executable chain needs.

pub mod exec;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveManifest;
use crate::config::{Config, APP_DIR_NAME};
use crate::error::{AimError, Result};

pub use exec::{resolve_executable, ExecContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    User,
    System,
    Custom,
}

impl std::fmt::Display for InstallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallMode::User => write!(f, "user"),
            InstallMode::System => write!(f, "system"),
            InstallMode::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for InstallMode {
    type Err = AimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(InstallMode::User),
            "system" => Ok(InstallMode::System),
            "custom" => Ok(InstallMode::Custom),
            other => Err(AimError::ConfigError(format!(
                "unknown install mode '{other}' (expected user, system or custom)"
            ))),
        }
    }
}

/// Reduce a display name to a filesystem-and-identifier-safe token.
///
/// Lowercased; spaces become `_`; everything outside `[a-z0-9_.-]` is
/// dropped; dot runs collapse and leading/trailing dots are trimmed so no
/// traversal sequence or separator can survive. Idempotent.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        match ch {
            ' ' => out.push('_'),
            'a'..='z' | '0'..='9' | '_' | '-' => out.push(ch),
            '.' => {
                if !out.ends_with('.') {
                    out.push('.');
                }
            }
            _ => {}
        }
    }
    let out = out.trim_matches('.').to_string();
    if out.is_empty() {
        "unknown_app".to_string()
    } else {
        out
    }
}

/// Clean a version token for use in a directory name: characters outside
/// `[A-Za-z0-9_.-]` become `_`, then leading/trailing separators are
/// trimmed. Returns None for unknown/empty versions.
pub fn clean_version(version: Option<&str>) -> Option<String> {
    let raw = version?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("unknown") {
        return None;
    }
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| matches!(c, '_' | '.' | '-')).to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Concrete filesystem targets for one installation. Produced once from a
/// manifest; later stages only read it.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallPlan {
    pub name: String,
    pub sanitized_name: String,
    /// Cleaned version token, None when unknown.
    pub version: Option<String>,
    pub mode: InstallMode,
    pub install_dir: PathBuf,
    pub bin_symlink: PathBuf,
    pub desktop_dir: PathBuf,
    pub icon_base_dir: PathBuf,
    pub requires_root: bool,
}

impl InstallPlan {
    /// Resolve install targets. Fatal only when no identifying name remains
    /// after every fallback; that must abort before any filesystem mutation.
    pub fn resolve(
        manifest: &ArchiveManifest,
        mode: InstallMode,
        custom_prefix: Option<&Path>,
        config: &Config,
    ) -> Result<InstallPlan> {
        if manifest.name.trim().is_empty() {
            return Err(AimError::PathResolutionError(
                "application name is empty after all fallbacks".to_string(),
            ));
        }
        let sanitized_name = sanitize_name(&manifest.name);
        let version = clean_version(manifest.version.as_deref());

        let base_prefix = match mode {
            InstallMode::System => config.general.system_install_dir.clone(),
            InstallMode::User => config.general.user_install_dir.clone(),
            InstallMode::Custom => {
                let prefix = custom_prefix.ok_or_else(|| {
                    AimError::PathResolutionError(
                        "custom install mode requires a target prefix".to_string(),
                    )
                })?;
                prefix.join(APP_DIR_NAME)
            }
        };

        let dir_name = match &version {
            Some(v) => format!("{}_{}", sanitized_name, v),
            None => sanitized_name.clone(),
        };

        // Integration links for custom installs go to the user's standard
        // directories; only system mode touches system link dirs.
        let (bin_dir, desktop_dir, icon_base_dir) = match mode {
            InstallMode::System => (
                config.general.system_bin_dir.clone(),
                config.general.system_desktop_dir.clone(),
                config.general.system_icon_dir.clone(),
            ),
            _ => (
                config.general.user_bin_dir.clone(),
                config.general.user_desktop_dir.clone(),
                config.general.user_icon_dir.clone(),
            ),
        };

        Ok(InstallPlan {
            name: manifest.name.clone(),
            install_dir: base_prefix.join(dir_name),
            bin_symlink: bin_dir.join(&sanitized_name),
            desktop_dir,
            icon_base_dir,
            requires_root: mode == InstallMode::System,
            sanitized_name,
            version,
            mode,
        })
    }
}
