//! Child-process driving for archive self-extraction.
//!
//! Extraction runs the archive itself with its embedded runtime flags. The
//! child is polled against a deadline and killed on overrun so a hung or
//! malicious archive cannot stall the operation. Display-server variables
//! are removed from the environment so extraction can never pop up a GUI.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::error::{AimError, Result};
use crate::util;

/// The two extraction tiers: a cheap manifest-only pass first, then a full
/// unpack only when the manifest was not recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractTier {
    /// `--appimage-extract=*.desktop`
    Selective,
    /// `--appimage-extract`
    Full,
}

impl ExtractTier {
    fn arg(&self) -> &'static str {
        match self {
            ExtractTier::Selective => "--appimage-extract=*.desktop",
            ExtractTier::Full => "--appimage-extract",
        }
    }

    fn timeout(&self, config: &ExtractionConfig) -> Duration {
        match self {
            ExtractTier::Selective => Duration::from_secs(config.selective_timeout_secs),
            ExtractTier::Full => Duration::from_secs(config.full_timeout_secs),
        }
    }
}

/// Run one extraction tier inside `scratch_dir` and return the root of the
/// extracted tree. Stale output from a previous tier is cleared first.
pub fn run_extraction(
    archive: &Path,
    scratch_dir: &Path,
    tier: ExtractTier,
    config: &ExtractionConfig,
) -> Result<PathBuf> {
    if !archive.is_file() {
        return Err(AimError::ArchiveNotFound(archive.to_path_buf()));
    }
    util::ensure_executable(archive)?;
    std::fs::create_dir_all(scratch_dir)?;

    // Each tier starts from a clean slate so a partial selective extract
    // cannot shadow the full tree.
    let expected_root = scratch_dir.join("squashfs-root");
    util::remove_path(&expected_root)?;

    info!(
        "extracting {} ({:?} tier) into {}",
        archive.display(),
        tier,
        scratch_dir.display()
    );

    let mut child = Command::new(archive)
        .arg(tier.arg())
        .current_dir(scratch_dir)
        // No window may appear during probing, and no embedded auto-run
        // logic may fire.
        .env_remove("DISPLAY")
        .env_remove("WAYLAND_DISPLAY")
        .env("APPIMAGELAUNCHER_DISABLE", "TRUE")
        .env("HOME", scratch_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            AimError::ArchiveError(format!("failed to run {}: {}", archive.display(), e))
        })?;

    let deadline = Instant::now() + tier.timeout(config);
    let poll = Duration::from_millis(config.poll_interval_ms.max(10));
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if Instant::now() >= deadline {
                    warn!("extraction deadline exceeded, killing child");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(AimError::ArchiveError(format!(
                        "extraction of {} timed out after {:?}",
                        archive.display(),
                        tier.timeout(config)
                    )));
                }
                std::thread::sleep(poll);
            }
        }
    };

    if !status.success() {
        return Err(AimError::ArchiveError(format!(
            "extraction of {} failed with status {}",
            archive.display(),
            status
        )));
    }

    locate_extract_root(scratch_dir, &expected_root)
}

/// The runtime is expected to produce `squashfs-root`; tolerate archives
/// that unpack into a single differently-named directory instead.
fn locate_extract_root(scratch_dir: &Path, expected: &Path) -> Result<PathBuf> {
    if expected.is_dir() {
        return Ok(expected.to_path_buf());
    }
    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(scratch_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    if subdirs.len() == 1 {
        let alt = subdirs.remove(0);
        debug!("using alternative extraction root: {}", alt.display());
        return Ok(alt);
    }
    Err(AimError::ArchiveError(format!(
        "extraction produced no recognizable root under {}",
        scratch_dir.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn fake_archive(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("fake.AppImage");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn fast_config() -> ExtractionConfig {
        ExtractionConfig {
            selective_timeout_secs: 2,
            full_timeout_secs: 2,
            poll_interval_ms: 20,
        }
    }

    #[test]
    fn successful_extraction_finds_squashfs_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fake_archive(
            dir.path(),
            "#!/bin/sh\nmkdir -p squashfs-root\ntouch squashfs-root/AppRun\n",
        );
        let scratch = dir.path().join("scratch");
        let root =
            run_extraction(&archive, &scratch, ExtractTier::Full, &fast_config()).unwrap();
        assert!(root.join("AppRun").exists());
    }

    #[test]
    fn nonzero_exit_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fake_archive(dir.path(), "#!/bin/sh\nexit 3\n");
        let scratch = dir.path().join("scratch");
        let err =
            run_extraction(&archive, &scratch, ExtractTier::Selective, &fast_config()).unwrap_err();
        assert!(matches!(err, AimError::ArchiveError(_)));
    }

    #[test]
    fn hung_child_is_killed_on_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fake_archive(dir.path(), "#!/bin/sh\nsleep 60\n");
        let scratch = dir.path().join("scratch");
        let config = ExtractionConfig {
            selective_timeout_secs: 1,
            full_timeout_secs: 1,
            poll_interval_ms: 20,
        };
        let started = Instant::now();
        let err = run_extraction(&archive, &scratch, ExtractTier::Full, &config).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn single_alternative_root_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let archive = fake_archive(dir.path(), "#!/bin/sh\nmkdir -p AppDir\ntouch AppDir/AppRun\n");
        let scratch = dir.path().join("scratch");
        let root = run_extraction(&archive, &scratch, ExtractTier::Full, &fast_config()).unwrap();
        assert!(root.ends_with("AppDir"));
    }
}
