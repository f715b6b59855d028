//! Archive codec for install directories
//!
//! An install tree is stored as a gzip-compressed tar with a single
//! top-level directory `<tool>-<version>/`. Unpacking strips that directory
//! and builds the tree in a staging directory next to the destination, so
//! the destination only ever holds a complete tree.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, EntryType};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors from packing or unpacking archives
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Source directory not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Archive entry escapes the destination: {0}")]
    UnsafePath(String),

    #[error("Archive entry '{path}' has unsupported type {kind}")]
    UnsupportedEntry { path: String, kind: String },

    #[error("Archive has no single top-level directory")]
    BadLayout,

    #[error("Archive IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// A packed install tree ready for upload
#[derive(Debug, Clone)]
pub struct PackedArchive {
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`
    pub checksum: String,
    pub size_bytes: u64,
}

/// Lowercase hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Pack `source_dir` under a top-level directory named `root_name`
///
/// Symlinks are archived as links, not followed.
pub fn pack(source_dir: &Path, root_name: &str) -> Result<PackedArchive, ArchiveError> {
    if !source_dir.is_dir() {
        return Err(ArchiveError::SourceMissing(source_dir.to_path_buf()));
    }

    debug!(source = %source_dir.display(), root_name, "Packing archive");

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(root_name, source_dir)
        .map_err(|e| ArchiveError::io(format!("archiving {}", source_dir.display()), e))?;

    let bytes = builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| ArchiveError::io("finishing archive", e))?;

    let checksum = sha256_hex(&bytes);
    let size_bytes = bytes.len() as u64;
    debug!(size_bytes, %checksum, "Packed archive");

    Ok(PackedArchive {
        bytes,
        checksum,
        size_bytes,
    })
}

/// Unpack an archive produced by [`pack`] into `dest`
///
/// The wrapping directory is stripped. Any existing `dest` is replaced only
/// after the new tree is complete, and is restored if the swap fails.
/// Returns the number of entries written.
pub fn unpack(bytes: &[u8], dest: &Path) -> Result<usize, ArchiveError> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .map_err(|e| ArchiveError::io(format!("creating {}", parent.display()), e))?;

    // Dropping the staging dir removes anything not promoted
    let staging = tempfile::Builder::new()
        .prefix(".mise-s3-stage-")
        .tempdir_in(&parent)
        .map_err(|e| ArchiveError::io(format!("creating staging dir in {}", parent.display()), e))?;
    let tree = staging.path().join("tree");
    fs::create_dir(&tree).map_err(|e| ArchiveError::io("creating staging tree", e))?;

    let written = extract_stripped(bytes, &tree)?;
    promote(&tree, dest, &staging.path().join("previous"))?;

    debug!(dest = %dest.display(), entries = written, "Unpacked archive");
    Ok(written)
}

fn extract_stripped(bytes: &[u8], tree: &Path) -> Result<usize, ArchiveError> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    archive.set_preserve_mtime(true);

    let mut root: Option<PathBuf> = None;
    let mut written = 0;
    // Symlinks extracted so far, relative to the tree root
    let mut links: HashSet<PathBuf> = HashSet::new();

    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::io("reading archive", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiveError::io("reading archive entry", e))?;
        let raw_path = entry
            .path()
            .map_err(|e| ArchiveError::io("reading entry path", e))?
            .into_owned();
        let entry_name = raw_path.to_string_lossy().into_owned();

        let mut parts = safe_components(&raw_path).ok_or_else(|| ArchiveError::UnsafePath(entry_name.clone()))?;
        if parts.is_empty() {
            continue;
        }

        let top = PathBuf::from(parts.remove(0));
        match root {
            None => root = Some(top),
            Some(ref r) if *r == top => {}
            Some(_) => return Err(ArchiveError::BadLayout),
        }

        let kind = entry.header().entry_type();
        let relative: PathBuf = parts.iter().collect();

        // Writing beneath an extracted symlink would follow it out of the tree
        if relative.ancestors().skip(1).any(|a| links.contains(a)) {
            return Err(ArchiveError::UnsafePath(entry_name));
        }

        match kind {
            EntryType::Directory if parts.is_empty() => continue,
            EntryType::Regular | EntryType::Continuous | EntryType::Directory => {}
            EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .map_err(|e| ArchiveError::io("reading link target", e))?
                    .ok_or_else(|| ArchiveError::UnsafePath(entry_name.clone()))?
                    .into_owned();
                if !link_stays_inside(&relative, &target, &links) {
                    return Err(ArchiveError::UnsafePath(format!(
                        "{} -> {}",
                        entry_name,
                        target.display()
                    )));
                }
            }
            other => {
                return Err(ArchiveError::UnsupportedEntry {
                    path: entry_name,
                    kind: format!("{other:?}"),
                })
            }
        }

        if parts.is_empty() {
            return Err(ArchiveError::BadLayout);
        }

        let target = tree.join(&relative);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| ArchiveError::io(format!("creating {}", dir.display()), e))?;
        }
        trace!(entry = %entry_name, "Extracting");
        entry
            .unpack(&target)
            .map_err(|e| ArchiveError::io(format!("extracting {entry_name}"), e))?;
        if kind == EntryType::Symlink {
            links.insert(relative);
        }
        written += 1;
    }

    if root.is_none() {
        return Err(ArchiveError::BadLayout);
    }
    Ok(written)
}

/// Normal components of an entry path, or `None` if it is absolute or climbs
fn safe_components(path: &Path) -> Option<Vec<std::ffi::OsString>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_os_string()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts)
}

/// Whether a symlink at `link` (relative to the tree root) resolves inside it
///
/// Targets that pass through an already extracted symlink are refused, since
/// their lexical position says nothing about where they land.
fn link_stays_inside(link: &Path, target: &Path, links: &HashSet<PathBuf>) -> bool {
    if target.is_absolute() {
        return false;
    }
    let mut resolved: PathBuf = link.parent().map(Path::to_path_buf).unwrap_or_default();
    for component in target.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                if links.contains(&resolved) {
                    return false;
                }
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return false;
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Swap the staged tree into place, keeping the old tree until it succeeds
fn promote(tree: &Path, dest: &Path, backup: &Path) -> Result<(), ArchiveError> {
    let had_previous = fs::symlink_metadata(dest).is_ok();
    if had_previous {
        fs::rename(dest, backup)
            .map_err(|e| ArchiveError::io(format!("moving aside {}", dest.display()), e))?;
    }

    if let Err(e) = fs::rename(tree, dest) {
        if had_previous {
            let _ = fs::rename(backup, dest);
        }
        return Err(ArchiveError::io(format!("promoting to {}", dest.display()), e));
    }
    Ok(())
}
