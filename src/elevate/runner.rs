use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{AimError, Result};

/// Executes a rendered batch script with elevated privileges.
///
/// A trait seam so installs and uninstalls can be exercised in tests with a
/// recording double instead of a real authentication prompt.
pub trait ElevationRunner {
    /// Run the whole batch under one authentication, returning combined
    /// stdout/stderr on success.
    fn run_batch(&self, script: &str) -> Result<String>;
}

/// Production runner: writes the script to a private temp file and hands it
/// to `pkexec` in a single invocation.
pub struct PkexecRunner;

impl ElevationRunner for PkexecRunner {
    fn run_batch(&self, script: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("aim-elevate-")
            .suffix(".sh")
            .tempfile()?;
        file.write_all(script.as_bytes())?;
        file.flush()?;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o700))?;
        debug!("elevation script at {}", file.path().display());

        let output = Command::new("pkexec").arg(file.path()).output()?;
        let combined = combine_output(&output.stdout, &output.stderr);
        if output.status.success() {
            info!("elevated batch completed");
            Ok(combined)
        } else {
            Err(AimError::ElevationError {
                step: last_announced_step(&combined),
                output: combined,
            })
        }
    }
}

/// Runner for processes that already hold the needed privileges: the batch
/// runs through `sh` directly, no authentication prompt.
pub struct DirectRunner;

impl ElevationRunner for DirectRunner {
    fn run_batch(&self, script: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("aim-batch-")
            .suffix(".sh")
            .tempfile()?;
        file.write_all(script.as_bytes())?;
        file.flush()?;

        let output = Command::new("sh").arg(file.path()).output()?;
        let combined = combine_output(&output.stdout, &output.stderr);
        if output.status.success() {
            Ok(combined)
        } else {
            Err(AimError::ElevationError {
                step: last_announced_step(&combined),
                output: combined,
            })
        }
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    let err = String::from_utf8_lossy(stderr);
    if !err.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&err);
    }
    text
}

/// The script echoes `==> <step>` before each command, so under `set -e` the
/// last such line names the step that failed. Cancellation at the prompt
/// produces no echo lines at all.
fn last_announced_step(output: &str) -> String {
    output
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix("==> "))
        .unwrap_or("authorization")
        .to_string()
}
