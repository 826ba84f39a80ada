//! Filesystem helpers shared across install, integration and leftover code.

use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{AimError, Result};

/// Recursive, permission-preserving copy of a directory tree. Symlinks are
/// re-created as symlinks rather than followed, matching what the bundled
/// runtime dependencies of an archive expect.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<u64> {
    if !source.is_dir() {
        return Err(AimError::InstallError(format!(
            "copy source is not a directory: {}",
            source.display()
        )));
    }
    fs::create_dir_all(dest)?;

    let mut copied = 0u64;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            AimError::InstallError(format!("walk failed under {}: {}", source.display(), e))
        })?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| AimError::InstallError(format!("bad walk prefix: {}", e)))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(&link_target, &target)?;
            copied += 1;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            let perms = entry.metadata().map(|m| m.permissions());
            if let Ok(perms) = perms {
                let _ = fs::set_permissions(&target, perms);
            }
            copied += 1;
        }
    }
    Ok(copied)
}

/// True for a regular file with any execute bit set.
pub fn is_executable(path: &Path) -> bool {
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Sniff the first four bytes for the ELF magic.
pub fn has_elf_magic(path: &Path) -> bool {
    let mut buf = [0u8; 4];
    match fs::File::open(path) {
        Ok(mut f) => f.read_exact(&mut buf).is_ok() && buf == [0x7f, b'E', b'L', b'F'],
        Err(_) => false,
    }
}

/// Read up to the first 512 bytes of a file as lossy UTF-8.
pub fn head_text(path: &Path) -> String {
    let mut buf = [0u8; 512];
    match fs::File::open(path) {
        Ok(mut f) => {
            let n = f.read(&mut buf).unwrap_or(0);
            String::from_utf8_lossy(&buf[..n]).into_owned()
        }
        Err(_) => String::new(),
    }
}

/// Add execute bits for owner/group/other, keeping existing mode bits.
pub fn ensure_executable(path: &Path) -> Result<()> {
    let meta = fs::metadata(path)?;
    let mode = meta.permissions().mode();
    if mode & 0o111 == 0 {
        fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o111))?;
    }
    Ok(())
}

/// Remove a path whatever it is: directory tree, file or dangling symlink.
/// Returns false when nothing existed at the path.
pub fn remove_path(path: &Path) -> Result<bool> {
    let meta = match path.symlink_metadata() {
        Ok(m) => m,
        Err(_) => return Ok(false),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(true)
}
