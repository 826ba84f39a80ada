//! Privileged filesystem work as data.
//!
//! Root-mode installs and uninstalls never run ad-hoc shell: every step is a
//! [`PrivilegedOp`] value, the batch is rendered to a single script, and the
//! script goes through one authentication prompt. The same rendering path
//! backs `--dry-run`, so what the user reviews is byte-for-byte what runs.

mod runner;

pub use runner::{DirectRunner, ElevationRunner, PkexecRunner};

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::config::MANAGED_MARKER;

/// One privileged step. Paths are absolute by the time an op is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegedOp {
    MakeDir { path: PathBuf },
    /// Recursive, tolerant of the path already being gone.
    RemovePath { path: PathBuf },
    RemoveFile { path: PathBuf },
    /// Replace `dest` with the contents of `source` (both directories).
    SyncTree { source: PathBuf, dest: PathBuf },
    CopyFile { source: PathBuf, dest: PathBuf },
    /// Force-replace `link` pointing at `target`.
    Symlink { target: PathBuf, link: PathBuf },
    Chmod { mode: u32, path: PathBuf },
    /// Set `Key=value` in a desktop file, replacing an existing line for the
    /// key or appending one when absent.
    TextPatch { path: PathBuf, key: String, value: String },
    /// Drop the ownership sentinel into an install directory.
    WriteSentinel { dir: PathBuf, stamp: String },
    RefreshDesktopDatabase { dir: PathBuf },
    RefreshIconCache { dir: PathBuf },
}

impl PrivilegedOp {
    /// Human-readable step label, echoed before the step runs so a failing
    /// batch can be attributed.
    pub fn describe(&self) -> String {
        match self {
            PrivilegedOp::MakeDir { path } => format!("create directory {}", path.display()),
            PrivilegedOp::RemovePath { path } => format!("remove {}", path.display()),
            PrivilegedOp::RemoveFile { path } => format!("remove file {}", path.display()),
            PrivilegedOp::SyncTree { dest, .. } => {
                format!("copy application files to {}", dest.display())
            }
            PrivilegedOp::CopyFile { dest, .. } => format!("install {}", dest.display()),
            PrivilegedOp::Symlink { link, .. } => format!("link {}", link.display()),
            PrivilegedOp::Chmod { mode, path } => {
                format!("chmod {:o} {}", mode, path.display())
            }
            PrivilegedOp::TextPatch { path, key, .. } => {
                format!("set {} in {}", key, path.display())
            }
            PrivilegedOp::WriteSentinel { dir, .. } => {
                format!("mark {} as managed", dir.display())
            }
            PrivilegedOp::RefreshDesktopDatabase { .. } => "refresh desktop database".into(),
            PrivilegedOp::RefreshIconCache { .. } => "refresh icon cache".into(),
        }
    }

    /// The shell command(s) implementing this op.
    pub fn render(&self) -> String {
        match self {
            PrivilegedOp::MakeDir { path } => format!("mkdir -p {}", sh_quote(path)),
            PrivilegedOp::RemovePath { path } => format!("rm -rf {}", sh_quote(path)),
            PrivilegedOp::RemoveFile { path } => format!("rm -f {}", sh_quote(path)),
            PrivilegedOp::SyncTree { source, dest } => format!(
                "rm -rf {dest} && mkdir -p {dest} && cp -a {source}/. {dest}/",
                source = sh_quote(source),
                dest = sh_quote(dest),
            ),
            PrivilegedOp::CopyFile { source, dest } => {
                format!("cp {} {}", sh_quote(source), sh_quote(dest))
            }
            PrivilegedOp::Symlink { target, link } => format!(
                "rm -f {link} && ln -sf {target} {link}",
                target = sh_quote(target),
                link = sh_quote(link),
            ),
            PrivilegedOp::Chmod { mode, path } => {
                format!("chmod {:o} {}", mode, sh_quote(path))
            }
            // Confined to the [Desktop Entry] group: the replace runs inside
            // the header-to-next-header range, the append inserts right after
            // the header. Keys in action groups never match.
            PrivilegedOp::TextPatch { path, key, value } => {
                let group_print = sh_quote_str("/^\\[Desktop Entry\\]$/,/^\\[.*\\]$/p");
                let grep_pattern = sh_quote_str(&format!("^{key}="));
                let sed_expr = sh_quote_str(&format!(
                    "/^\\[Desktop Entry\\]$/,/^\\[.*\\]$/ s|^{key}=.*|{key}={}|",
                    sed_escape(value),
                ));
                let insert_expr = sh_quote_str(&format!(
                    "/^\\[Desktop Entry\\]$/a {key}={}",
                    sed_escape(value),
                ));
                format!(
                    "if sed -n {group} {path} | grep -q {grep}; then sed -i {sed} {path}; else sed -i {ins} {path}; fi",
                    group = group_print,
                    grep = grep_pattern,
                    sed = sed_expr,
                    ins = insert_expr,
                    path = sh_quote(path),
                )
            }
            PrivilegedOp::WriteSentinel { dir, stamp } => format!(
                "printf '%s\\n' {} > {}",
                sh_quote_str(stamp),
                sh_quote(&dir.join(crate::config::SENTINEL_FILE)),
            ),
            PrivilegedOp::RefreshDesktopDatabase { dir } => format!(
                "command -v update-desktop-database >/dev/null 2>&1 && update-desktop-database {} || true",
                sh_quote(dir),
            ),
            PrivilegedOp::RefreshIconCache { dir } => format!(
                "command -v gtk-update-icon-cache >/dev/null 2>&1 && gtk-update-icon-cache -f -t {} || true",
                sh_quote(dir),
            ),
        }
    }
}

/// Render a batch to a standalone script. Each step announces itself with an
/// `==> ` echo line so a failure under `set -e` identifies the step.
pub fn render_script(ops: &[PrivilegedOp]) -> String {
    let mut script = String::from("#!/bin/sh\nset -e\n");
    for op in ops {
        let _ = writeln!(script, "echo {}", sh_quote_str(&format!("==> {}", op.describe())));
        let _ = writeln!(script, "{}", op.render());
    }
    script
}

/// Convenience for building the `Comment=` managed-marker patch.
pub fn managed_comment_patch(path: PathBuf) -> PrivilegedOp {
    PrivilegedOp::TextPatch {
        path,
        key: "Comment".into(),
        value: MANAGED_MARKER.into(),
    }
}

fn sh_quote(path: &std::path::Path) -> String {
    sh_quote_str(&path.to_string_lossy())
}

/// POSIX single-quote escaping.
fn sh_quote_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn sed_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace('&', "\\&")
}
