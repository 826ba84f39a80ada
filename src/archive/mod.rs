//! Archive introspection: recover a manifest, binary layout facts and a
//! preview icon from an opaque self-extracting archive.

pub mod extract;
pub mod icon;
pub mod manifest;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ExtractionConfig;
use crate::error::Result;

pub use extract::{run_extraction, ExtractTier};
pub use icon::find_icon;
pub use manifest::{fallback_manifest, parse_manifest, ArchiveManifest};

/// Everything metadata probing can learn about an archive.
#[derive(Debug)]
pub struct Introspection {
    pub manifest: ArchiveManifest,
    /// Manifest location relative to the archive root, when one was found.
    pub desktop_rel_path: Option<PathBuf>,
    /// Copy of the archive's icon in the caller's scratch directory.
    pub preview_icon: Option<PathBuf>,
}

pub struct ArchiveIntrospector<'a> {
    extraction: &'a ExtractionConfig,
}

impl<'a> ArchiveIntrospector<'a> {
    pub fn new(extraction: &'a ExtractionConfig) -> Self {
        Self { extraction }
    }

    /// Read metadata from `archive`, extracting into `scratch`.
    ///
    /// Extraction is tiered: a selective manifest-only pass with a short
    /// deadline first, then a full unpack with a longer one. Failure of both
    /// tiers is not an error; the result carries filename-derived fallback
    /// metadata so the archive stays installable.
    pub fn read_metadata(&self, archive: &Path, scratch: &Path) -> Result<Introspection> {
        let meta_dir = scratch.join("meta");
        std::fs::create_dir_all(&meta_dir)?;

        let mut root = None;
        for tier in [ExtractTier::Selective, ExtractTier::Full] {
            match run_extraction(archive, &meta_dir, tier, self.extraction) {
                Ok(extracted) => {
                    if find_desktop_file(&extracted).is_some() {
                        root = Some(extracted);
                        break;
                    }
                    debug!("{:?} tier produced no manifest", tier);
                    // Keep a full tree around even without a manifest; the
                    // icon probe below may still find something.
                    if tier == ExtractTier::Full {
                        root = Some(extracted);
                    }
                }
                Err(e) => warn!("{:?} extraction tier failed: {}", tier, e),
            }
        }

        let (manifest, desktop_rel_path) = match root
            .as_deref()
            .and_then(|r| find_desktop_file(r).map(|d| (r.to_path_buf(), d)))
        {
            Some((root, desktop)) => {
                let manifest = parse_manifest(&desktop, Some(root.as_path()))?;
                let rel = desktop.strip_prefix(&root).ok().map(PathBuf::from);
                (manifest, rel)
            }
            None => (fallback_manifest(archive), None),
        };

        let preview_icon = root
            .as_deref()
            .and_then(|r| icon::find_icon(r, &manifest.icon))
            .and_then(|src| copy_preview_icon(&src, scratch));

        info!(
            "introspected '{}' (version {:?}, fallback={})",
            manifest.name, manifest.version, manifest.fallback
        );
        Ok(Introspection {
            manifest,
            desktop_rel_path,
            preview_icon,
        })
    }
}

/// Find the first desktop-entry file under `root`, preferring the
/// conventional `usr/share/applications` location and the root itself over
/// a recursive scan.
pub fn find_desktop_file(root: &Path) -> Option<PathBuf> {
    for base in [root.join("usr/share/applications"), root.to_path_buf()] {
        if let Ok(entries) = std::fs::read_dir(&base) {
            let mut names: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| is_desktop_file(p))
                .collect();
            names.sort();
            if let Some(found) = names.into_iter().next() {
                return Some(found);
            }
        }
    }
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .map(|e| e.path().to_path_buf())
        .find(|p| is_desktop_file(p))
}

fn is_desktop_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_ascii_lowercase().ends_with(".desktop"))
            .unwrap_or(false)
}

fn copy_preview_icon(source: &Path, scratch: &Path) -> Option<PathBuf> {
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| icon::ICON_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        // .DirIcon and extensionless sources are almost always PNG.
        .unwrap_or("png");
    let target = scratch.join(format!("preview_{}.{}", uuid::Uuid::new_v4().simple(), ext));
    match std::fs::copy(source, &target) {
        Ok(_) => Some(target),
        Err(e) => {
            warn!("failed to copy preview icon {}: {}", source.display(), e);
            None
        }
    }
}
