use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AimError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("archive error: {0}")]
    ArchiveError(String),

    #[error("path resolution error: {0}")]
    PathResolutionError(String),

    #[error("install error: {0}")]
    InstallError(String),

    #[error("uninstall error: {0}")]
    UninstallError(String),

    #[error("integration error: {0}")]
    IntegrationError(String),

    #[error("elevation failed at step '{step}': {output}")]
    ElevationError { step: String, output: String },

    #[error("registry error: {0}")]
    RegistryError(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("app not found in registry: {0}")]
    AppNotFound(String),

    #[error("archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, AimError>;
