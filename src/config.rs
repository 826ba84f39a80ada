use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{AimError, Result};

/// Directory created under each install prefix for extracted apps.
pub const APP_DIR_NAME: &str = "appimage-manager-apps";
/// Directory holding copied archives for registered (non-extracted) apps.
pub const LIBRARY_DIR_NAME: &str = "appimage-manager-library";
/// Comment value written into every desktop file this tool manages.
pub const MANAGED_MARKER: &str = "Managed by AppImage Manager";
/// Sentinel file written at the root of every extracted install directory.
pub const SENTINEL_FILE: &str = ".aim_managed";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_general")]
    pub general: GeneralConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Prefix for user-mode extracted installs.
    #[serde(default = "default_user_install_dir")]
    pub user_install_dir: PathBuf,
    /// Prefix for system-mode extracted installs.
    #[serde(default = "default_system_install_dir")]
    pub system_install_dir: PathBuf,
    /// Where registered archives are copied to.
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,
    #[serde(default = "default_user_bin_dir")]
    pub user_bin_dir: PathBuf,
    #[serde(default = "default_user_desktop_dir")]
    pub user_desktop_dir: PathBuf,
    #[serde(default = "default_user_icon_dir")]
    pub user_icon_dir: PathBuf,
    #[serde(default = "default_system_bin_dir")]
    pub system_bin_dir: PathBuf,
    #[serde(default = "default_system_desktop_dir")]
    pub system_desktop_dir: PathBuf,
    #[serde(default = "default_system_icon_dir")]
    pub system_icon_dir: PathBuf,
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Deadline for the selective (manifest-only) extraction tier.
    #[serde(default = "default_selective_timeout")]
    pub selective_timeout_secs: u64,
    /// Deadline for the full extraction tier.
    #[serde(default = "default_full_timeout")]
    pub full_timeout_secs: u64,
    /// How often the child process is polled for completion.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/root"))
}

fn xdg_config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("appimage-manager")
}

fn default_general() -> GeneralConfig {
    GeneralConfig {
        user_install_dir: default_user_install_dir(),
        system_install_dir: default_system_install_dir(),
        library_dir: default_library_dir(),
        user_bin_dir: default_user_bin_dir(),
        user_desktop_dir: default_user_desktop_dir(),
        user_icon_dir: default_user_icon_dir(),
        system_bin_dir: default_system_bin_dir(),
        system_desktop_dir: default_system_desktop_dir(),
        system_icon_dir: default_system_icon_dir(),
        registry_path: default_registry_path(),
    }
}

fn default_user_install_dir() -> PathBuf {
    home_dir().join(".local/share").join(APP_DIR_NAME)
}
fn default_system_install_dir() -> PathBuf {
    PathBuf::from("/opt").join(APP_DIR_NAME)
}
fn default_library_dir() -> PathBuf {
    home_dir().join(".local/share").join(LIBRARY_DIR_NAME)
}
fn default_user_bin_dir() -> PathBuf {
    home_dir().join(".local/bin")
}
fn default_user_desktop_dir() -> PathBuf {
    home_dir().join(".local/share/applications")
}
fn default_user_icon_dir() -> PathBuf {
    home_dir().join(".local/share/icons")
}
fn default_system_bin_dir() -> PathBuf {
    PathBuf::from("/usr/local/bin")
}
fn default_system_desktop_dir() -> PathBuf {
    PathBuf::from("/usr/local/share/applications")
}
fn default_system_icon_dir() -> PathBuf {
    PathBuf::from("/usr/local/share/icons")
}
fn default_registry_path() -> PathBuf {
    xdg_config_dir().join("installed.json")
}
fn default_selective_timeout() -> u64 {
    20
}
fn default_full_timeout() -> u64 {
    120
}
fn default_poll_interval() -> u64 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: default_general(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            selective_timeout_secs: default_selective_timeout(),
            full_timeout_secs: default_full_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, falling back to
    /// `$XDG_CONFIG_HOME/appimage-manager/aim.toml`, then built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .unwrap_or_else(|| xdg_config_dir().join("aim.toml"));

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            AimError::ConfigError(format!("failed to read {}: {}", config_path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }
}

/// True when the effective uid can write system prefixes directly.
pub fn running_as_root() -> bool {
    let uid = unsafe { libc::geteuid() };
    uid == 0
}
