//! Executable location inside an installed (or freshly extracted) tree.
//!
//! The chain is an ordered list of named rules; the first rule producing a
//! verified candidate wins. Keeping the rules as data makes each one
//! unit-testable on its own.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::util;

/// Inputs the rules operate on.
pub struct ExecContext<'a> {
    /// Root of the tree being inspected (install dir or scratch extract).
    pub root: &'a Path,
    /// Launch command relative to the archive root, when the manifest had one.
    pub exec_relative: Option<&'a str>,
    pub sanitized_name: &'a str,
}

struct ExecRule {
    name: &'static str,
    resolve: fn(&ExecContext) -> Option<PathBuf>,
}

const RULES: &[ExecRule] = &[
    ExecRule { name: "usr-bin", resolve: rule_usr_bin },
    ExecRule { name: "entry-point", resolve: rule_entry_point },
    ExecRule { name: "root-indirection", resolve: rule_root_indirection },
    ExecRule { name: "app-subdir-named", resolve: rule_app_subdir_named },
    ExecRule { name: "app-subdir-scan", resolve: rule_app_subdir_scan },
];

/// Walk the rule chain against `root`. When nothing matches there and a
/// scratch extraction copy is available (pre-install), retry the chain
/// against it; finally default to the unverified `usr/bin` candidate path.
pub fn resolve_executable(ctx: &ExecContext, scratch_root: Option<&Path>) -> Option<PathBuf> {
    if let Some(found) = run_chain(ctx) {
        return Some(found);
    }
    if !ctx.root.is_dir() {
        if let Some(scratch) = scratch_root {
            let scratch_ctx = ExecContext {
                root: scratch,
                exec_relative: ctx.exec_relative,
                sanitized_name: ctx.sanitized_name,
            };
            if let Some(found) = run_chain(&scratch_ctx) {
                // Map the scratch hit back into the install tree.
                if let Ok(rel) = found.strip_prefix(scratch) {
                    return Some(ctx.root.join(rel));
                }
                return Some(found);
            }
        }
        // Last resort: the conventional candidate, not yet verified to exist.
        if let Some(rel) = ctx.exec_relative {
            return Some(ctx.root.join("usr/bin").join(rel));
        }
    }
    None
}

fn run_chain(ctx: &ExecContext) -> Option<PathBuf> {
    for rule in RULES {
        if let Some(found) = (rule.resolve)(ctx) {
            debug!("executable resolved by rule '{}': {}", rule.name, found.display());
            return Some(found);
        }
    }
    None
}

/// `usr/bin/<relative-exec>` when it passes the real-executable predicate.
fn rule_usr_bin(ctx: &ExecContext) -> Option<PathBuf> {
    let rel = ctx.exec_relative?;
    let rel = rel.strip_prefix("usr/bin/").unwrap_or(rel);
    let candidate = ctx.root.join("usr/bin").join(rel);
    if is_real_executable(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// The archive's literal entry point (`AppRun`) at the tree root.
fn rule_entry_point(ctx: &ExecContext) -> Option<PathBuf> {
    let candidate = ctx.root.join("AppRun");
    if candidate.symlink_metadata().is_ok() && util::is_executable(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// A root-level symlink named after the app, resolved recursively.
fn rule_root_indirection(ctx: &ExecContext) -> Option<PathBuf> {
    for name in [ctx.sanitized_name, ctx.exec_relative.unwrap_or_default()] {
        if name.is_empty() || name.contains('/') {
            continue;
        }
        let link = ctx.root.join(name);
        if link.symlink_metadata().map(|m| m.is_symlink()).unwrap_or(false) {
            if let Ok(resolved) = std::fs::canonicalize(&link) {
                if util::is_executable(&resolved) {
                    return Some(resolved);
                }
            }
        }
    }
    None
}

/// `app/<sanitized-name>` covers the common Electron-style layout.
fn rule_app_subdir_named(ctx: &ExecContext) -> Option<PathBuf> {
    let candidate = ctx.root.join("app").join(ctx.sanitized_name);
    if util::is_executable(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// Any non-shared-library file under `app/` matching the sanitized name or
/// carrying the ELF magic.
fn rule_app_subdir_scan(ctx: &ExecContext) -> Option<PathBuf> {
    let app_dir = ctx.root.join("app");
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&app_dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();
    entries.into_iter().find(|path| {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if file_name.contains(".so") {
            return false;
        }
        let stem_matches = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case(ctx.sanitized_name))
            .unwrap_or(false);
        stem_matches || util::has_elf_magic(path)
    })
}

/// A real executable is a regular file with an execute bit that is not a
/// desktop-integration wrapper script. Archives commonly ship
/// `usr/bin/<name>` as a shell wrapper whose job is icon/menu registration;
/// symlinking the launcher to that would run integration instead of the app.
fn is_real_executable(path: &Path) -> bool {
    if !util::is_executable(path) {
        return false;
    }
    let head = util::head_text(path);
    if head.starts_with("#!") {
        let head = head.to_ascii_lowercase();
        if head.contains("desktopintegration") || head.contains("xdg-icon-resource") {
            return false;
        }
    }
    true
}
